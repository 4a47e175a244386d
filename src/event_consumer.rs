//! The Event Consumer (spec component 8): handles the three inbound event
//! kinds an [`crate::ln_client::LnClient`] may push, reconciling the ledger
//! idempotently under at-least-once delivery.

use crate::amount::MilliSats;
use crate::event_publisher::{EventPublisher, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_RECEIVED, EVENT_PAYMENT_SENT};
use crate::ledger::LedgerStore;
use crate::tlv::{self, TlvRecord};
use crate::transaction::{PaymentHash, Preimage, Transaction, TransactionType};
use chrono::{DateTime, Utc};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct PaymentReceivedEvent {
    pub payment_hash: PaymentHash,
    pub preimage: Preimage,
    pub amount_msat: MilliSats,
    pub invoice: Option<String>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub tlv_records: Vec<TlvRecord>,
}

#[derive(Debug, Clone)]
pub struct PaymentSentEvent {
    pub payment_hash: PaymentHash,
    pub preimage: Preimage,
    pub fee_msat: MilliSats,
}

#[derive(Debug, Clone)]
pub struct PaymentFailedEvent {
    pub payment_hash: PaymentHash,
    pub reason: String,
}

/// `lnclient_payment_received`: finds the `incoming` row by hash, synthesizing
/// one from the event if absent (an unsolicited or externally-created
/// payment), then settles it.
pub async fn consume_payment_received(
    event: PaymentReceivedEvent,
    ledger: &dyn LedgerStore,
    events: &dyn EventPublisher,
    now: DateTime<Utc>,
) {
    let extracted = tlv::extract(&event.tlv_records);

    let existing = match ledger
        .find_by_hash(TransactionType::Incoming, &event.payment_hash, None)
        .await
    {
        Ok(existing) => existing,
        Err(e) => {
            log::error!(
                "event_consumer: failed to look up incoming tx {:?}: {e}",
                event.payment_hash
            );
            return;
        }
    };

    let mut tx = match existing {
        Some(tx) => tx,
        None => {
            let mut synthesized = Transaction::new_pending(
                TransactionType::Incoming,
                extracted.recipient_app_id,
                None,
                event.amount_msat,
                MilliSats::ZERO,
                event.invoice.clone(),
                event.payment_hash.clone(),
                Some(event.preimage.clone()),
                event.description.clone().or_else(|| extracted.description.clone()),
                None,
                event.expires_at,
                None,
                now,
            );
            synthesized.boostagram = extracted.boostagram.clone();
            match ledger.insert_pending(synthesized).await {
                Ok(tx) => tx,
                Err(e) => {
                    log::error!("event_consumer: failed to persist synthesized incoming tx: {e}");
                    return;
                }
            }
        }
    };

    if !tx.is_pending() {
        return; // already handled by a prior delivery; idempotent no-op
    }
    if tx.boostagram.is_none() {
        tx.boostagram = extracted.boostagram;
    }
    if tx.mark_settled(event.preimage, MilliSats::ZERO, false, now).is_err() {
        return;
    }
    if ledger.update_settled_or_failed(&tx).await.is_ok() {
        events
            .publish(
                EVENT_PAYMENT_RECEIVED,
                json!({ "transaction_id": tx.id.0, "payment_hash": tx.payment_hash.0.clone() }),
            )
            .await;
    }
}

/// `lnclient_payment_sent`: finds the `outgoing` row by hash; drops the event
/// if absent (we don't adopt externally-initiated payments).
pub async fn consume_payment_sent(
    event: PaymentSentEvent,
    ledger: &dyn LedgerStore,
    events: &dyn EventPublisher,
    now: DateTime<Utc>,
) {
    let tx = match ledger
        .find_by_hash(TransactionType::Outgoing, &event.payment_hash, None)
        .await
    {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            log::info!(
                "event_consumer: dropping payment_sent for unknown hash {:?} (externally-initiated payment)",
                event.payment_hash
            );
            return;
        }
        Err(e) => {
            log::error!("event_consumer: failed to look up outgoing tx: {e}");
            return;
        }
    };

    let mut tx = tx;
    if !tx.is_pending() {
        return;
    }
    if tx
        .mark_settled(event.preimage, event.fee_msat, false, now)
        .is_err()
    {
        return;
    }
    if ledger.update_settled_or_failed(&tx).await.is_ok() {
        events
            .publish(
                EVENT_PAYMENT_SENT,
                json!({ "transaction_id": tx.id.0, "payment_hash": tx.payment_hash.0.clone() }),
            )
            .await;
    }
}

/// `lnclient_payment_failed`: finds the `outgoing` row by hash and transitions
/// it to `failed`; duplicate deliveries after the first are a no-op.
pub async fn consume_payment_failed(
    event: PaymentFailedEvent,
    ledger: &dyn LedgerStore,
    events: &dyn EventPublisher,
    now: DateTime<Utc>,
) {
    let tx = match ledger
        .find_by_hash(TransactionType::Outgoing, &event.payment_hash, None)
        .await
    {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            log::info!(
                "event_consumer: dropping payment_failed for unknown hash {:?}",
                event.payment_hash
            );
            return;
        }
        Err(e) => {
            log::error!("event_consumer: failed to look up outgoing tx: {e}");
            return;
        }
    };

    let mut tx = tx;
    if !tx.is_pending() {
        return; // duplicate delivery; already terminal
    }
    if tx.mark_failed(event.reason, now).is_err() {
        return;
    }
    if ledger.update_settled_or_failed(&tx).await.is_ok() {
        events
            .publish(
                EVENT_PAYMENT_FAILED,
                json!({ "transaction_id": tx.id.0, "payment_hash": tx.payment_hash.0.clone() }),
            )
            .await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event_publisher::RecordingEventPublisher;
    use crate::ledger::InMemoryLedger;
    use crate::transaction::{Preimage, TransactionType};

    #[tokio::test]
    async fn payment_received_synthesizes_a_row_when_none_exists() {
        let ledger = InMemoryLedger::new();
        let events = RecordingEventPublisher::default();
        let preimage = Preimage::from_bytes(&[5u8; 32]);
        let hash = preimage.payment_hash();

        consume_payment_received(
            PaymentReceivedEvent {
                payment_hash: hash.clone(),
                preimage,
                amount_msat: MilliSats(5000),
                invoice: None,
                description: None,
                expires_at: None,
                tlv_records: vec![],
            },
            &ledger,
            &events,
            Utc::now(),
        )
        .await;

        let found = ledger
            .find_by_hash(TransactionType::Incoming, &hash, None)
            .await
            .unwrap()
            .unwrap();
        assert!(found.is_settled());
        assert_eq!(events.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_failed_events_only_publish_once() {
        let ledger = InMemoryLedger::new();
        let events = RecordingEventPublisher::default();
        let hash = PaymentHash(format!("{:064x}", 7));
        let tx = crate::transaction::Transaction::new_pending(
            TransactionType::Outgoing,
            None,
            None,
            MilliSats(1000),
            MilliSats(10_000),
            Some("lnbc...".to_owned()),
            hash.clone(),
            None,
            None,
            None,
            None,
            None,
            Utc::now(),
        );
        ledger.insert_pending(tx).await.unwrap();

        for _ in 0..2 {
            consume_payment_failed(
                PaymentFailedEvent {
                    payment_hash: hash.clone(),
                    reason: "no_route".to_owned(),
                },
                &ledger,
                &events,
                Utc::now(),
            )
            .await;
        }

        assert_eq!(events.events.lock().await.len(), 1);
    }
}
