//! The Service Facade (spec component 9): the five public operations this
//! crate exposes, composing every other component. No HTTP/RPC surface lives
//! here — an embedder's own transport layer calls these methods directly,
//! the way the teacher's `api` crate calls into `app::payment::send` and
//! `app::invoice::create`.

use crate::amount::MilliSats;
use crate::app::{AppId, AppStore};
use crate::clock::Clock;
use crate::config::Config;
use crate::event_consumer::{PaymentFailedEvent, PaymentReceivedEvent, PaymentSentEvent};
use crate::event_publisher::{EventPublisher, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_SENT};
use crate::fee;
use crate::invoice_decode;
use crate::ledger::{LedgerStore, ListFilter};
use crate::ln_client::LnClient;
use crate::permission::PermissionStore;
use crate::reconciler;
use crate::self_payment;
use crate::tlv::{self, TlvRecord};
use crate::transaction::{PaymentHash, Preimage, Transaction, TransactionType};
use crate::validator::{self, ValidatorError};
use chrono::Duration;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MakeInvoiceError {
    #[error("serialized metadata exceeds the maximum allowed size")]
    MetadataTooLarge,
    #[error("lightning client error: {0}")]
    LnClient(#[from] crate::ln_client::MakeInvoiceError),
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SendPaymentError {
    #[error("invalid bolt11 invoice: {0}")]
    Decode(#[from] invoice_decode::InvoiceDecodeError),
    #[error("a settled outgoing payment for this invoice already exists")]
    AlreadyPaid,
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error(transparent)]
    SelfPayment(#[from] self_payment::SelfPaymentError),
    #[error(transparent)]
    InvalidPreimage(#[from] crate::transaction::Error),
    #[error("lightning client timed out; payment is still pending and will be reconciled")]
    LnClientTimeout,
    #[error("lightning client failure: {0}")]
    LnClientFailure(String),
    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum KeysendError {
    #[error(transparent)]
    InvalidPreimage(#[from] crate::transaction::Error),
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error(transparent)]
    SelfPayment(#[from] self_payment::SelfPaymentError),
    #[error("lightning client timed out; payment is still pending and will be reconciled")]
    LnClientTimeout,
    #[error("lightning client failure: {0}")]
    LnClientFailure(String),
    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no matching transaction")]
    NotFound,
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
}

#[derive(Debug, Clone, Default)]
pub struct ListTransactionsQuery {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: i64,
    pub offset: i64,
    pub unpaid_outgoing: bool,
    pub unpaid_incoming: bool,
    pub r#type: Option<TransactionType>,
    pub app_id: Option<AppId>,
}

/// Composes the Ledger Store, the Quota/Balance Validator, the Self-Payment
/// Interceptor, the Reconciler and the LN client into the five facade
/// operations.
pub struct Service {
    ledger: Arc<dyn LedgerStore>,
    apps: Arc<dyn AppStore>,
    permissions: Arc<dyn PermissionStore>,
    ln_client: Arc<dyn LnClient>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: Config,
    app_locks: Mutex<HashMap<AppId, Arc<Mutex<()>>>>,
}

impl Service {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        apps: Arc<dyn AppStore>,
        permissions: Arc<dyn PermissionStore>,
        ln_client: Arc<dyn LnClient>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            ledger,
            apps,
            permissions,
            ln_client,
            events,
            clock,
            config,
            app_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_app(&self, app_id: AppId) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.app_locks.lock().await;
            locks
                .entry(app_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    pub async fn make_invoice(
        &self,
        ctx: &CancellationToken,
        amount_msat: MilliSats,
        description: Option<String>,
        description_hash: Option<String>,
        expiry_seconds: i64,
        metadata: Option<Value>,
        app_id: Option<AppId>,
        request_event_id: Option<Uuid>,
    ) -> Result<Transaction, MakeInvoiceError> {
        if ctx.is_cancelled() {
            return Err(MakeInvoiceError::Cancelled);
        }
        if let Some(ref metadata) = metadata {
            let size = serde_json::to_vec(metadata).unwrap_or_default().len();
            if size > self.config.metadata_max_length {
                return Err(MakeInvoiceError::MetadataTooLarge);
            }
        }

        let made = self
            .ln_client
            .make_invoice(
                amount_msat,
                description.as_deref(),
                description_hash.as_deref(),
                expiry_seconds,
            )
            .await?;

        let now = self.clock.now();
        let expires_at = made
            .expires_at
            .or_else(|| now.checked_add_signed(Duration::seconds(expiry_seconds)));
        let preimage = made.preimage.as_deref().and_then(|p| Preimage::parse(p).ok());

        let tx = Transaction::new_pending(
            TransactionType::Incoming,
            app_id,
            request_event_id,
            made.amount_msat,
            MilliSats::ZERO,
            Some(made.invoice),
            PaymentHash(made.payment_hash),
            preimage,
            description,
            description_hash,
            expires_at,
            metadata,
            now,
        );
        Ok(self.ledger.insert_pending(tx).await?)
    }

    pub async fn send_payment_sync(
        &self,
        ctx: &CancellationToken,
        bolt11: &str,
        metadata: Option<Value>,
        app_id: Option<AppId>,
        request_event_id: Option<Uuid>,
    ) -> Result<Transaction, SendPaymentError> {
        if ctx.is_cancelled() {
            return Err(SendPaymentError::Cancelled);
        }

        let decoded = invoice_decode::decode(bolt11)?;
        let our_pubkey = self.ln_client.get_pubkey().await;
        let is_self_payment = decoded.payee_pubkey == our_pubkey;
        let hash = PaymentHash(decoded.payment_hash.clone());
        let amount = decoded
            .amount_msat
            .map(MilliSats)
            .unwrap_or(MilliSats::ZERO);

        let _guard = match app_id {
            Some(app_id) => Some(self.lock_app(app_id).await),
            None => None,
        };

        if ctx.is_cancelled() {
            return Err(SendPaymentError::Cancelled);
        }

        if self
            .ledger
            .find_by_hash(
                TransactionType::Outgoing,
                &hash,
                Some(crate::transaction::TransactionState::Settled),
            )
            .await?
            .is_some()
        {
            return Err(SendPaymentError::AlreadyPaid);
        }

        if let Some(app_id) = app_id {
            validator::validate(
                app_id,
                amount,
                self.apps.as_ref(),
                self.permissions.as_ref(),
                self.ledger.as_ref(),
                self.events.as_ref(),
                self.clock.now(),
            )
            .await?;
        }

        let now = self.clock.now();
        let tx = Transaction::new_pending(
            TransactionType::Outgoing,
            app_id,
            request_event_id,
            amount,
            fee::reserve_msat(amount),
            Some(bolt11.to_lowercase()),
            hash.clone(),
            None,
            decoded.description,
            None,
            None,
            metadata,
            now,
        );
        let mut tx = self.ledger.insert_pending(tx).await?;
        drop(_guard);

        if ctx.is_cancelled() {
            // The pending row stays; the Reconciler resolves it later.
            return Err(SendPaymentError::Cancelled);
        }

        if is_self_payment {
            let outcome = self_payment::intercept(&hash, self.ledger.as_ref(), self.clock.now()).await?;
            tx.mark_settled(outcome.preimage, outcome.fee_msat, true, self.clock.now())
                .expect("freshly inserted row is pending");
            self.ledger.update_settled_or_failed(&tx).await?;
            self.events
                .publish(
                    EVENT_PAYMENT_SENT,
                    json!({ "transaction_id": tx.id.0, "payment_hash": tx.payment_hash.0.clone() }),
                )
                .await;
            return Ok(tx);
        }

        match self.ln_client.send_payment_sync(&tx.payment_request.clone().unwrap()).await {
            Ok(sent) => {
                let preimage = Preimage::parse(&sent.preimage)?;
                tx.mark_settled(preimage, sent.fee_msat, false, self.clock.now())
                    .expect("freshly inserted row is pending");
                self.ledger.update_settled_or_failed(&tx).await?;
                self.events
                    .publish(
                        EVENT_PAYMENT_SENT,
                        json!({ "transaction_id": tx.id.0, "payment_hash": tx.payment_hash.0.clone() }),
                    )
                    .await;
                Ok(tx)
            }
            Err(e) if e.is_timeout() => Err(SendPaymentError::LnClientTimeout),
            Err(e) => {
                tx.mark_failed(e.to_string(), self.clock.now())
                    .expect("freshly inserted row is pending");
                let _ = self.ledger.update_settled_or_failed(&tx).await;
                self.events
                    .publish(
                        EVENT_PAYMENT_FAILED,
                        json!({ "transaction_id": tx.id.0, "payment_hash": tx.payment_hash.0.clone() }),
                    )
                    .await;
                Err(SendPaymentError::LnClientFailure(e.to_string()))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send_keysend(
        &self,
        ctx: &CancellationToken,
        amount_msat: MilliSats,
        destination_pubkey: &str,
        tlv_records: Vec<TlvRecord>,
        preimage: Option<String>,
        app_id: Option<AppId>,
        request_event_id: Option<Uuid>,
    ) -> Result<Transaction, KeysendError> {
        if ctx.is_cancelled() {
            return Err(KeysendError::Cancelled);
        }

        let preimage = match preimage {
            Some(p) => Preimage::parse(&p)?,
            None => Preimage::from_bytes(&crate::clock::random_preimage()),
        };
        let hash = preimage.payment_hash();
        let extracted = tlv::extract(&tlv_records);
        let our_pubkey = self.ln_client.get_pubkey().await;
        let is_self_payment = destination_pubkey == our_pubkey;

        let _guard = match app_id {
            Some(app_id) => Some(self.lock_app(app_id).await),
            None => None,
        };

        if let Some(app_id) = app_id {
            validator::validate(
                app_id,
                amount_msat,
                self.apps.as_ref(),
                self.permissions.as_ref(),
                self.ledger.as_ref(),
                self.events.as_ref(),
                self.clock.now(),
            )
            .await?;
        }

        let now = self.clock.now();
        let outgoing = Transaction::new_pending(
            TransactionType::Outgoing,
            app_id,
            request_event_id,
            amount_msat,
            fee::reserve_msat(amount_msat),
            None,
            hash.clone(),
            None,
            extracted.description.clone(),
            None,
            None,
            None,
            now,
        );

        let mut outgoing = if is_self_payment {
            let incoming = Transaction::new_pending(
                TransactionType::Incoming,
                extracted.recipient_app_id,
                request_event_id,
                amount_msat,
                MilliSats::ZERO,
                None,
                hash.clone(),
                Some(preimage.clone()),
                extracted.description.clone(),
                None,
                None,
                None,
                now,
            );
            let (outgoing, _incoming) = self
                .ledger
                .insert_pending_pair(outgoing, incoming)
                .await?;
            outgoing
        } else {
            self.ledger.insert_pending(outgoing).await?
        };
        drop(_guard);

        if is_self_payment {
            let outcome = self_payment::intercept(&hash, self.ledger.as_ref(), self.clock.now()).await?;
            outgoing
                .mark_settled(outcome.preimage, outcome.fee_msat, true, self.clock.now())
                .expect("freshly inserted row is pending");
            self.ledger.update_settled_or_failed(&outgoing).await?;
            self.events
                .publish(
                    EVENT_PAYMENT_SENT,
                    json!({ "transaction_id": outgoing.id.0, "payment_hash": outgoing.payment_hash.0.clone() }),
                )
                .await;
            return Ok(outgoing);
        }

        match self
            .ln_client
            .send_keysend(amount_msat, destination_pubkey, &tlv_records, &preimage.0)
            .await
        {
            Ok(result) => {
                outgoing
                    .mark_settled(preimage, result.fee_msat, false, self.clock.now())
                    .expect("freshly inserted row is pending");
                self.ledger.update_settled_or_failed(&outgoing).await?;
                self.events
                    .publish(
                        EVENT_PAYMENT_SENT,
                        json!({ "transaction_id": outgoing.id.0, "payment_hash": outgoing.payment_hash.0.clone() }),
                    )
                    .await;
                Ok(outgoing)
            }
            Err(e) if e.is_timeout() => Err(KeysendError::LnClientTimeout),
            Err(e) => {
                outgoing
                    .mark_failed(e.to_string(), self.clock.now())
                    .expect("freshly inserted row is pending");
                let _ = self.ledger.update_settled_or_failed(&outgoing).await;
                self.events
                    .publish(
                        EVENT_PAYMENT_FAILED,
                        json!({ "transaction_id": outgoing.id.0, "payment_hash": outgoing.payment_hash.0.clone() }),
                    )
                    .await;
                Err(KeysendError::LnClientFailure(e.to_string()))
            }
        }
    }

    pub async fn lookup_transaction(
        &self,
        payment_hash: &PaymentHash,
        r#type: Option<TransactionType>,
        app_id: Option<AppId>,
    ) -> Result<Transaction, LookupError> {
        let mut candidates = Vec::new();
        for candidate_type in r#type
            .map(|t| vec![t])
            .unwrap_or_else(|| vec![TransactionType::Incoming, TransactionType::Outgoing])
        {
            if let Some(tx) = self
                .ledger
                .find_by_hash(candidate_type, payment_hash, None)
                .await?
            {
                candidates.push(tx);
            }
        }
        if let Some(app_id) = app_id {
            if let Some(app) = self.apps.get(app_id).await {
                if app.isolated {
                    candidates.retain(|tx| tx.app_id == Some(app_id));
                }
            }
        }
        candidates.sort_by_key(|tx| std::cmp::Reverse((tx.settled_at, tx.created_at)));
        let tx = candidates.into_iter().next().ok_or(LookupError::NotFound)?;

        if tx.is_pending() {
            reconciler::reconcile_one(
                &tx,
                self.ledger.as_ref(),
                self.ln_client.as_ref(),
                self.events.as_ref(),
                self.clock.now(),
            )
            .await;
            return self
                .ledger
                .get(tx.id)
                .await?
                .ok_or(LookupError::NotFound);
        }
        Ok(tx)
    }

    pub async fn list_transactions(
        &self,
        query: ListTransactionsQuery,
    ) -> Result<Vec<Transaction>, crate::ledger::LedgerError> {
        reconciler::reconcile_batch(
            self.ledger.as_ref(),
            self.ln_client.as_ref(),
            self.events.as_ref(),
            self.config.reconcile_window_hours,
            self.clock.now(),
        )
        .await;

        self.ledger
            .list(ListFilter {
                app_id: query.app_id,
                r#type: query.r#type,
                from: query.from,
                until: query.until,
                limit: query.limit,
                offset: query.offset,
                unpaid_outgoing: query.unpaid_outgoing,
                unpaid_incoming: query.unpaid_incoming,
            })
            .await
    }

    /// Dispatches one of the three inbound LN client notification kinds to
    /// the Event Consumer.
    pub async fn consume_payment_received(&self, event: PaymentReceivedEvent) {
        crate::event_consumer::consume_payment_received(
            event,
            self.ledger.as_ref(),
            self.events.as_ref(),
            self.clock.now(),
        )
        .await;
    }

    pub async fn consume_payment_sent(&self, event: PaymentSentEvent) {
        crate::event_consumer::consume_payment_sent(
            event,
            self.ledger.as_ref(),
            self.events.as_ref(),
            self.clock.now(),
        )
        .await;
    }

    pub async fn consume_payment_failed(&self, event: PaymentFailedEvent) {
        crate::event_consumer::consume_payment_failed(
            event,
            self.ledger.as_ref(),
            self.events.as_ref(),
            self.clock.now(),
        )
        .await;
    }
}
