//! The central ledger entity and its `pending -> settled | failed` state
//! machine. Mirrors the mutation style of the teacher's `payment::Payment`
//! and `invoice::Invoice`: plain methods that panic on invariant violations
//! (a transaction is only ever mutated by code that has already checked the
//! precondition) and return `Ok`/`Err` only for conditions a caller is
//! expected to handle.

use crate::amount::MilliSats;
use crate::app::AppId;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Settled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHash(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preimage(pub String);

impl Preimage {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Preimage(crate::hex::Hex::encode(bytes).into_string())
    }

    /// Validates that a caller-supplied hex string decodes to exactly 32 bytes.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let bytes = crate::hex::Hex::decode(s).map_err(|_| Error::InvalidPreimage)?;
        if bytes.len() != 32 {
            return Err(Error::InvalidPreimage);
        }
        Ok(Preimage(s.to_owned()))
    }

    pub fn payment_hash(&self) -> PaymentHash {
        let raw = crate::hex::Hex::decode(&self.0).expect("preimage is valid hex by construction");
        let digest = Sha256::digest(&raw);
        PaymentHash(crate::hex::Hex::encode(&digest).into_string())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("preimage must be exactly 32 bytes")]
    InvalidPreimage,
    #[error("transaction {0:?} is not pending")]
    NotPending(TransactionId),
    #[error("preimage required to settle a transaction")]
    MissingPreimage,
}

/// The central ledger row. Field semantics follow the data model one-to-one.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub app_id: Option<AppId>,
    pub request_event_id: Option<Uuid>,
    pub r#type: TransactionType,
    pub state: TransactionState,
    pub amount_msat: MilliSats,
    pub fee_msat: Option<MilliSats>,
    pub fee_reserve_msat: MilliSats,
    pub payment_request: Option<String>,
    pub payment_hash: PaymentHash,
    pub preimage: Option<Preimage>,
    pub description: Option<String>,
    pub description_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub self_payment: bool,
    pub metadata: Option<Value>,
    pub boostagram: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        r#type: TransactionType,
        app_id: Option<AppId>,
        request_event_id: Option<Uuid>,
        amount_msat: MilliSats,
        fee_reserve_msat: MilliSats,
        payment_request: Option<String>,
        payment_hash: PaymentHash,
        preimage: Option<Preimage>,
        description: Option<String>,
        description_hash: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        metadata: Option<Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId(Uuid::new_v4()),
            app_id,
            request_event_id,
            r#type,
            state: TransactionState::Pending,
            amount_msat,
            fee_msat: None,
            fee_reserve_msat,
            payment_request,
            payment_hash,
            preimage,
            description,
            description_hash,
            expires_at,
            settled_at: None,
            failure_reason: None,
            self_payment: false,
            metadata,
            boostagram: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == TransactionState::Pending
    }

    pub fn is_settled(&self) -> bool {
        self.state == TransactionState::Settled
    }

    pub fn is_failed(&self) -> bool {
        self.state == TransactionState::Failed
    }

    /// `pending -> settled`. Not idempotent by itself (the caller is expected
    /// to have already checked for an existing settled row with the same
    /// `(type, hash)` before loading this one for mutation, the same way
    /// [`Transaction::mark_failed`] lets the caller short-circuit).
    pub fn mark_settled(
        &mut self,
        preimage: Preimage,
        fee_msat: MilliSats,
        self_payment: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        if !self.is_pending() {
            return Err(Error::NotPending(self.id));
        }
        self.preimage = Some(preimage);
        self.fee_msat = Some(fee_msat);
        self.fee_reserve_msat = MilliSats::ZERO;
        self.self_payment = self_payment;
        self.settled_at = Some(now);
        self.state = TransactionState::Settled;
        self.updated_at = now;
        Ok(())
    }

    /// `pending -> failed`.
    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), Error> {
        if !self.is_pending() {
            return Err(Error::NotPending(self.id));
        }
        self.fee_reserve_msat = MilliSats::ZERO;
        self.failure_reason = Some(reason.into());
        self.state = TransactionState::Failed;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pending() -> Transaction {
        Transaction::new_pending(
            TransactionType::Outgoing,
            None,
            None,
            MilliSats(21_000),
            MilliSats(10_000),
            Some("lnbc...".to_owned()),
            PaymentHash("h".repeat(64)),
            None,
            None,
            None,
            None,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn settling_zeroes_the_fee_reserve() {
        let mut tx = pending();
        let preimage = Preimage::from_bytes(&[7u8; 32]);
        tx.mark_settled(preimage, MilliSats(5_000), false, Utc::now())
            .unwrap();
        assert!(tx.is_settled());
        assert_eq!(tx.fee_reserve_msat, MilliSats::ZERO);
        assert_eq!(tx.fee_msat, Some(MilliSats(5_000)));
    }

    #[test]
    fn settling_twice_is_rejected_at_the_entity_level() {
        let mut tx = pending();
        let preimage = Preimage::from_bytes(&[7u8; 32]);
        tx.mark_settled(preimage.clone(), MilliSats(0), false, Utc::now())
            .unwrap();
        let err = tx.mark_settled(preimage, MilliSats(0), false, Utc::now());
        assert!(matches!(err, Err(Error::NotPending(_))));
    }

    #[test]
    fn preimage_hashes_to_its_payment_hash() {
        let preimage = Preimage::from_bytes(&[0u8; 32]);
        let expected = crate::hex::Hex::encode(&Sha256::digest([0u8; 32])).into_string();
        assert_eq!(preimage.payment_hash(), PaymentHash(expected));
    }

    #[test]
    fn preimage_must_be_32_bytes() {
        assert!(Preimage::parse(&"ab".repeat(32)).is_ok());
        assert!(Preimage::parse(&"ab".repeat(31)).is_err());
        assert!(Preimage::parse(&"ab".repeat(33)).is_err());
    }
}
