//! The Self-Payment Interceptor (spec component 5). Short-circuits a payment
//! whose destination is our own node, settling the recipient's already
//! `pending incoming` row directly instead of round-tripping through the LN
//! client.

use crate::amount::MilliSats;
use crate::ledger::LedgerStore;
use crate::transaction::{PaymentHash, TransactionType};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelfPaymentError {
    #[error("no pending incoming transaction found for self-payment hash")]
    RecipientNotPrepared,
    #[error("recipient invoice has no known preimage; self-payment requires the LN client to reveal it at invoice creation")]
    MissingPreimage,
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error(transparent)]
    Transaction(#[from] crate::transaction::Error),
}

pub struct SelfPaymentOutcome {
    pub preimage: crate::transaction::Preimage,
    pub fee_msat: MilliSats,
}

/// Settles the recipient's `pending incoming` row for `hash` using its own
/// preimage, with zero fee, and returns the preimage so the caller can settle
/// the outgoing side with it.
pub async fn intercept(
    hash: &PaymentHash,
    ledger: &dyn LedgerStore,
    now: DateTime<Utc>,
) -> Result<SelfPaymentOutcome, SelfPaymentError> {
    let mut incoming = ledger
        .find_by_hash(TransactionType::Incoming, hash, None)
        .await?
        .filter(|tx| tx.is_pending())
        .ok_or(SelfPaymentError::RecipientNotPrepared)?;

    let preimage = incoming
        .preimage
        .clone()
        .ok_or(SelfPaymentError::MissingPreimage)?;

    incoming.mark_settled(preimage.clone(), MilliSats::ZERO, true, now)?;
    ledger.update_settled_or_failed(&incoming).await?;

    Ok(SelfPaymentOutcome {
        preimage,
        fee_msat: MilliSats::ZERO,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::transaction::{Preimage, Transaction};

    #[tokio::test]
    async fn settles_the_matching_pending_incoming_row() {
        let ledger = InMemoryLedger::new();
        let preimage = Preimage::from_bytes(&[9u8; 32]);
        let hash = preimage.payment_hash();
        let incoming = Transaction::new_pending(
            TransactionType::Incoming,
            None,
            None,
            MilliSats(1000),
            MilliSats(0),
            None,
            hash.clone(),
            Some(preimage.clone()),
            None,
            None,
            None,
            None,
            Utc::now(),
        );
        ledger.insert_pending(incoming).await.unwrap();

        let outcome = intercept(&hash, &ledger, Utc::now()).await.unwrap();
        assert_eq!(outcome.preimage, preimage);
        assert_eq!(outcome.fee_msat, MilliSats::ZERO);
    }

    #[tokio::test]
    async fn fails_when_recipient_has_no_pending_row() {
        let ledger = InMemoryLedger::new();
        let hash = PaymentHash(format!("{:064x}", 1));
        let result = intercept(&hash, &ledger, Utc::now()).await;
        assert!(matches!(result, Err(SelfPaymentError::RecipientNotPrepared)));
    }
}
