//! Implements the fee-reserve policy applied to every outgoing payment.

use crate::amount::MilliSats;

/// Reserve held against a pending outgoing payment: 1% of the amount, or
/// 10 sats, whichever is greater. Mirrors the teacher's `cash_limits::check`
/// in spirit — a small pure function with no side effects — but computes a
/// reserve rather than validating a limit.
pub fn reserve_msat(amount: MilliSats) -> MilliSats {
    let one_percent = (amount.0 + 99) / 100; // ceil(amount / 100)
    MilliSats(one_percent.max(10_000))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn floor_applies_below_one_million_msat() {
        assert_eq!(reserve_msat(MilliSats(0)), MilliSats(10_000));
        assert_eq!(reserve_msat(MilliSats(500_000)), MilliSats(10_000));
    }

    #[test]
    fn percentage_applies_above_the_floor() {
        assert_eq!(reserve_msat(MilliSats(2_000_000)), MilliSats(20_000));
        assert_eq!(reserve_msat(MilliSats(21_000)), MilliSats(10_000));
    }

    #[test]
    fn rounds_up_to_the_nearest_msat() {
        // 1,000,001 / 100 = 10,000.01 -> ceil to 10,001
        assert_eq!(reserve_msat(MilliSats(1_000_001)), MilliSats(10_001));
    }
}
