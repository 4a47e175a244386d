//! The `pay_invoice` permission an app may hold, and the calendar-aligned
//! budget window it renews on.

use crate::amount::Sats;
use crate::app::AppId;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetRenewal {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl BudgetRenewal {
    /// Start of the current renewal window, anchored to UTC midnight. `None`
    /// for [`BudgetRenewal::Never`], meaning usage is summed over all time.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today_midnight = now.date_naive().and_hms_opt(0, 0, 0).unwrap();
        let today_midnight = Utc.from_utc_datetime(&today_midnight);
        match self {
            BudgetRenewal::Daily => Some(today_midnight),
            BudgetRenewal::Weekly => {
                let days_since_monday = today_midnight.weekday().num_days_from_monday() as i64;
                Some(today_midnight - Duration::days(days_since_monday))
            }
            BudgetRenewal::Monthly => {
                let first_of_month = today_midnight
                    .date_naive()
                    .with_day(1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                Some(Utc.from_utc_datetime(&first_of_month))
            }
            BudgetRenewal::Yearly => {
                let jan_first = chrono::NaiveDate::from_ymd_opt(today_midnight.year(), 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                Some(Utc.from_utc_datetime(&jan_first))
            }
            BudgetRenewal::Never => None,
        }
    }
}

/// The `pay_invoice` permission granted to an app, carrying its budget ceiling
/// and renewal cadence. `max_amount_sat == 0` disables the budget check
/// entirely.
#[derive(Debug, Clone, Copy)]
pub struct Permission {
    pub app_id: AppId,
    pub max_amount_sat: Sats,
    pub budget_renewal: BudgetRenewal,
}

impl Permission {
    pub fn budget_enabled(&self) -> bool {
        self.max_amount_sat.0 > 0
    }
}

/// Read access to granted `pay_invoice` permissions.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_pay_invoice(&self, app_id: AppId) -> Option<Permission>;
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Weekday};

    #[test]
    fn daily_window_is_todays_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 13, 45, 0).unwrap();
        let start = BudgetRenewal::Daily.window_start(now).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 7, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn weekly_window_is_most_recent_monday() {
        // 2026-07-29 is a Wednesday.
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 13, 45, 0).unwrap();
        let start = BudgetRenewal::Weekly.window_start(now).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap());
        assert_eq!(start.weekday(), Weekday::Mon);
    }

    #[test]
    fn monthly_and_yearly_windows() {
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 13, 45, 0).unwrap();
        assert_eq!(
            BudgetRenewal::Monthly.window_start(now).unwrap(),
            Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            BudgetRenewal::Yearly.window_start(now).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn never_has_no_window() {
        let now = Utc::now();
        assert_eq!(BudgetRenewal::Never.window_start(now), None);
    }
}
