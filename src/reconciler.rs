//! The Reconciler (spec component 7). Closes the loop for LN clients that
//! don't push a `payment_received` notification: polls pending rows and asks
//! the node directly whether the underlying invoice settled.

use crate::amount::MilliSats;
use crate::event_publisher::{EventPublisher, EVENT_PAYMENT_RECEIVED, EVENT_PAYMENT_SENT};
use crate::ledger::LedgerStore;
use crate::ln_client::{LnClient, NOTIFICATION_PAYMENT_RECEIVED};
use crate::transaction::{Transaction, TransactionType};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

/// Whether the reconciler needs to do anything at all for this node — a
/// no-op when the node already pushes `payment_received` notifications.
pub async fn is_needed(ln_client: &dyn LnClient) -> bool {
    !ln_client
        .get_supported_notification_types()
        .await
        .contains(NOTIFICATION_PAYMENT_RECEIVED)
}

/// Batch pass: sweeps `pending` rows, both directions, created within the
/// reconciliation window and settles any the node reports as paid. Incoming
/// rows are the whole point of this component (§4.7: nodes that don't push
/// `payment_received`), but outgoing rows benefit from the same sweep when a
/// `SendPaymentSync` timeout left them pending. Only applies to invoice-based
/// payments (keysends have nothing to look up).
pub async fn reconcile_batch(
    ledger: &dyn LedgerStore,
    ln_client: &dyn LnClient,
    events: &dyn EventPublisher,
    window_hours: i64,
    now: DateTime<Utc>,
) {
    if !is_needed(ln_client).await {
        return;
    }
    let since = now - Duration::hours(window_hours);
    for r#type in [TransactionType::Incoming, TransactionType::Outgoing] {
        let pending = match ledger.list_recent_pending(r#type, since).await {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("reconciler: failed to list pending transactions: {e}");
                continue;
            }
        };
        for tx in pending {
            reconcile_one(&tx, ledger, ln_client, events, now).await;
        }
    }
}

/// Single-row pass: reconciles one pending row, e.g. opportunistically from
/// `LookupTransaction`.
pub async fn reconcile_one(
    tx: &Transaction,
    ledger: &dyn LedgerStore,
    ln_client: &dyn LnClient,
    events: &dyn EventPublisher,
    now: DateTime<Utc>,
) {
    if !tx.is_pending() || tx.payment_request.is_none() {
        return;
    }
    let looked_up = match ln_client.lookup_invoice(&tx.payment_hash.0).await {
        Ok(looked_up) => looked_up,
        Err(e) => {
            log::warn!("reconciler: lookup_invoice failed for {:?}: {e}", tx.id);
            return;
        }
    };
    let (Some(_settled_at), Some(preimage)) = (looked_up.settled_at, looked_up.preimage) else {
        return;
    };
    let preimage = match crate::transaction::Preimage::parse(&preimage) {
        Ok(preimage) => preimage,
        Err(_) => {
            log::warn!("reconciler: node returned an invalid preimage for {:?}", tx.id);
            return;
        }
    };

    // Incoming invoices never pay a routing fee; `fees_paid_msat` only applies
    // to the outgoing direction.
    let fee_msat = match tx.r#type {
        TransactionType::Incoming => MilliSats::ZERO,
        TransactionType::Outgoing => looked_up.fees_paid_msat,
    };

    let mut settled = tx.clone();
    if settled.mark_settled(preimage, fee_msat, false, now).is_err() {
        return; // already settled/failed by a concurrent path; idempotent no-op
    }
    if ledger.update_settled_or_failed(&settled).await.is_ok() {
        let event_kind = match settled.r#type {
            TransactionType::Incoming => EVENT_PAYMENT_RECEIVED,
            TransactionType::Outgoing => EVENT_PAYMENT_SENT,
        };
        events
            .publish(
                event_kind,
                json!({ "transaction_id": settled.id.0, "payment_hash": settled.payment_hash.0.clone() }),
            )
            .await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event_publisher::RecordingEventPublisher;
    use crate::ledger::InMemoryLedger;
    use crate::ln_client::{
        KeysendError, KeysendResult, LookedUpInvoice, LookupError, MadeInvoice, MakeInvoiceError,
        SendPaymentError, SentPayment,
    };
    use crate::tlv::TlvRecord;
    use crate::transaction::{PaymentHash, Preimage, TransactionType};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    struct FakeLnClient {
        notification_types: HashSet<String>,
        lookup_result: StdMutex<Option<LookedUpInvoice>>,
    }

    #[async_trait]
    impl LnClient for FakeLnClient {
        async fn make_invoice(
            &self,
            _amount_msat: MilliSats,
            _description: Option<&str>,
            _description_hash: Option<&str>,
            _expiry_seconds: i64,
        ) -> Result<MadeInvoice, MakeInvoiceError> {
            unimplemented!()
        }

        async fn send_payment_sync(&self, _bolt11: &str) -> Result<SentPayment, SendPaymentError> {
            unimplemented!()
        }

        async fn send_keysend(
            &self,
            _amount_msat: MilliSats,
            _destination_pubkey: &str,
            _tlv_records: &[TlvRecord],
            _preimage: &str,
        ) -> Result<KeysendResult, KeysendError> {
            unimplemented!()
        }

        async fn lookup_invoice(&self, _payment_hash: &str) -> Result<LookedUpInvoice, LookupError> {
            self.lookup_result
                .lock()
                .unwrap()
                .clone()
                .ok_or(LookupError::NotFound)
        }

        async fn get_pubkey(&self) -> String {
            "our-pubkey".to_owned()
        }

        async fn get_supported_notification_types(&self) -> HashSet<String> {
            self.notification_types.clone()
        }
    }

    #[tokio::test]
    async fn settles_a_pending_row_the_node_reports_as_paid() {
        let ledger = InMemoryLedger::new();
        let events = RecordingEventPublisher::default();
        let preimage = Preimage::from_bytes(&[3u8; 32]);
        let hash = preimage.payment_hash();

        let tx = crate::transaction::Transaction::new_pending(
            TransactionType::Outgoing,
            None,
            None,
            MilliSats(21_000),
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
        let tx = ledger.insert_pending(tx).await.unwrap();

        let ln_client = FakeLnClient {
            notification_types: HashSet::new(),
            lookup_result: StdMutex::new(Some(LookedUpInvoice {
                settled_at: Some(Utc::now()),
                preimage: Some(preimage.0.clone()),
                fees_paid_msat: MilliSats(500),
            })),
        };

        reconcile_one(&tx, &ledger, &ln_client, &events, Utc::now()).await;

        let stored = ledger.get(tx.id).await.unwrap().unwrap();
        assert!(stored.is_settled());
        assert_eq!(stored.fee_msat, Some(MilliSats(500)));
        assert_eq!(events.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn settles_a_pending_incoming_invoice_with_zero_fee_and_received_event() {
        let ledger = InMemoryLedger::new();
        let events = RecordingEventPublisher::default();
        let preimage = Preimage::from_bytes(&[4u8; 32]);
        let hash = preimage.payment_hash();

        let tx = crate::transaction::Transaction::new_pending(
            TransactionType::Incoming,
            None,
            None,
            MilliSats(5_000),
            MilliSats(0),
            Some("lnbc...".to_owned()),
            hash.clone(),
            None,
            None,
            None,
            None,
            None,
            Utc::now(),
        );
        let tx = ledger.insert_pending(tx).await.unwrap();

        let ln_client = FakeLnClient {
            notification_types: HashSet::new(),
            lookup_result: StdMutex::new(Some(LookedUpInvoice {
                settled_at: Some(Utc::now()),
                preimage: Some(preimage.0.clone()),
                fees_paid_msat: MilliSats(0),
            })),
        };

        reconcile_one(&tx, &ledger, &ln_client, &events, Utc::now()).await;

        let stored = ledger.get(tx.id).await.unwrap().unwrap();
        assert!(stored.is_settled());
        assert_eq!(stored.fee_msat, Some(MilliSats::ZERO));
        let published = events.events.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, EVENT_PAYMENT_RECEIVED);
    }

    #[tokio::test]
    async fn is_a_no_op_when_node_pushes_notifications() {
        let ln_client = FakeLnClient {
            notification_types: HashSet::from([NOTIFICATION_PAYMENT_RECEIVED.to_owned()]),
            lookup_result: StdMutex::new(None),
        };
        assert!(!is_needed(&ln_client).await);
    }
}
