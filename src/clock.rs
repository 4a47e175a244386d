//! Time and randomness as explicit dependencies, so the state machine and the
//! fee/budget calculations stay deterministic under test.

use chrono::{DateTime, Utc};
use rand::Rng;

/// A source of the current time. Production code uses [`SystemClock`]; tests can
/// substitute a fixed clock to exercise budget-window boundaries deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Generates a cryptographically random 32-byte keysend preimage.
pub fn random_preimage() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    bytes
}
