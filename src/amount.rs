//! Millisatoshi amounts used throughout the ledger.

use std::ops::{Add, AddAssign, Sub, SubAssign};

#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct MilliSats(pub i64);

#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Sats(pub i64);

impl MilliSats {
    pub const ZERO: MilliSats = MilliSats(0);

    pub fn sats_floor(&self) -> Sats {
        Sats(self.0 / 1000)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl Add for MilliSats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for MilliSats {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for MilliSats {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl SubAssign for MilliSats {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Sats {
    pub fn msats(self) -> MilliSats {
        MilliSats(self.0 * 1000)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sats_floor_truncates_towards_zero() {
        assert_eq!(MilliSats(1999).sats_floor(), Sats(1));
        assert_eq!(MilliSats(-1999).sats_floor(), Sats(-1));
    }

    #[test]
    fn arithmetic() {
        let mut a = MilliSats(100);
        a += MilliSats(50);
        assert_eq!(a, MilliSats(150));
        a -= MilliSats(200);
        assert_eq!(a, MilliSats(-50));
    }
}
