//! The Quota/Balance Validator (spec component 4). Runs immediately before a
//! `pending outgoing` row is inserted, under the same per-app latch as the
//! insert itself (see [`crate::service`]), so the read this validator does is
//! consistent with the write that follows it — the concurrency property the
//! teacher achieves with `concurrency::retry_loop` plus an optimistic balance
//! version check, made explicit here as a single critical section.

use crate::amount::MilliSats;
use crate::app::{AppId, AppStore};
use crate::event_publisher::{EventPublisher, EVENT_PERMISSION_DENIED};
use crate::fee;
use crate::ledger::LedgerStore;
use crate::permission::PermissionStore;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("app {0:?} not found")]
    AppNotFound(AppId),
    #[error("app {0:?} does not have the pay_invoice scope")]
    NoPayInvoiceScope(AppId),
    #[error("insufficient isolated balance")]
    InsufficientBalance,
    #[error("budget quota exceeded")]
    QuotaExceeded,
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
}

/// Validates that `app_id` may spend `amount_msat`, returning the amount
/// including its fee reserve on success. On any failure, also publishes the
/// `permission_denied` event named in the taxonomy.
pub async fn validate(
    app_id: AppId,
    amount_msat: MilliSats,
    apps: &dyn AppStore,
    permissions: &dyn PermissionStore,
    ledger: &dyn LedgerStore,
    events: &dyn EventPublisher,
    now: DateTime<Utc>,
) -> Result<MilliSats, ValidatorError> {
    let app = apps
        .get(app_id)
        .await
        .ok_or(ValidatorError::AppNotFound(app_id))?;

    let permission = permissions
        .get_pay_invoice(app_id)
        .await
        .ok_or(ValidatorError::NoPayInvoiceScope(app_id))?;

    let amount_with_reserve = amount_msat + fee::reserve_msat(amount_msat);

    if app.isolated {
        let aggregates = ledger.balance_aggregates(app_id).await?;
        if amount_with_reserve > aggregates.available() {
            events
                .publish(
                    EVENT_PERMISSION_DENIED,
                    json!({ "app_id": app_id.0, "code": "INSUFFICIENT_BALANCE" }),
                )
                .await;
            return Err(ValidatorError::InsufficientBalance);
        }
    }

    if permission.budget_enabled() {
        let window_start = permission.budget_renewal.window_start(now);
        let usage_sat = ledger.budget_usage_sat(app_id, window_start).await?;
        let requested_sat = amount_with_reserve.sats_floor();
        if requested_sat.0 + usage_sat.0 > permission.max_amount_sat.0 {
            events
                .publish(
                    EVENT_PERMISSION_DENIED,
                    json!({ "app_id": app_id.0, "code": "QUOTA_EXCEEDED" }),
                )
                .await;
            return Err(ValidatorError::QuotaExceeded);
        }
    }

    Ok(amount_with_reserve)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::app::App;
    use crate::event_publisher::NullEventPublisher;
    use crate::ledger::InMemoryLedger;
    use crate::permission::{BudgetRenewal, Permission};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FakeApps(HashMap<AppId, App>);
    #[async_trait]
    impl AppStore for FakeApps {
        async fn get(&self, id: AppId) -> Option<App> {
            self.0.get(&id).copied()
        }
    }

    struct FakePermissions(HashMap<AppId, Permission>);
    #[async_trait]
    impl PermissionStore for FakePermissions {
        async fn get_pay_invoice(&self, app_id: AppId) -> Option<Permission> {
            self.0.get(&app_id).copied()
        }
    }

    #[tokio::test]
    async fn isolated_app_overdraw_is_rejected() {
        let app_id = AppId(Uuid::new_v4());
        let apps = FakeApps(HashMap::from([(
            app_id,
            App {
                id: app_id,
                isolated: true,
            },
        )]));
        let permissions = FakePermissions(HashMap::from([(
            app_id,
            Permission {
                app_id,
                max_amount_sat: crate::amount::Sats(0),
                budget_renewal: BudgetRenewal::Never,
            },
        )]));
        let ledger = InMemoryLedger::new();
        let mut incoming = crate::transaction::Transaction::new_pending(
            crate::transaction::TransactionType::Incoming,
            Some(app_id),
            None,
            MilliSats(100_000),
            MilliSats(0),
            None,
            crate::transaction::PaymentHash(format!("{:064x}", 1)),
            None,
            None,
            None,
            None,
            None,
            Utc::now(),
        );
        incoming
            .mark_settled(
                crate::transaction::Preimage::from_bytes(&[1u8; 32]),
                MilliSats(0),
                false,
                Utc::now(),
            )
            .unwrap();
        ledger.insert_pending(incoming).await.unwrap();

        let result = validate(
            app_id,
            MilliSats(95_000),
            &apps,
            &permissions,
            &ledger,
            &NullEventPublisher,
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(ValidatorError::InsufficientBalance)));
    }

    #[tokio::test]
    async fn non_isolated_app_with_no_budget_always_passes() {
        let app_id = AppId(Uuid::new_v4());
        let apps = FakeApps(HashMap::from([(
            app_id,
            App {
                id: app_id,
                isolated: false,
            },
        )]));
        let permissions = FakePermissions(HashMap::from([(
            app_id,
            Permission {
                app_id,
                max_amount_sat: crate::amount::Sats(0),
                budget_renewal: BudgetRenewal::Never,
            },
        )]));
        let ledger = InMemoryLedger::new();

        let result = validate(
            app_id,
            MilliSats(21_000),
            &apps,
            &permissions,
            &ledger,
            &NullEventPublisher,
            Utc::now(),
        )
        .await;
        assert!(result.is_ok());
    }
}
