//! The Lightning node client contract. No concrete node integration lives in
//! this crate — this trait is the seam an embedder implements against their
//! node (LND, CLN, an embedded LDK instance, ...), following the shape of the
//! teacher's `ln::Node` but generalized away from a concrete gRPC client.

use crate::amount::MilliSats;
use crate::tlv::TlvRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MakeInvoiceError {
    #[error("lightning node rejected invoice creation: {0}")]
    NodeError(String),
}

#[derive(Debug, Error)]
pub enum SendPaymentError {
    #[error("payment timed out waiting for the node")]
    Timeout,
    #[error("invoice has expired")]
    InvoiceExpired,
    #[error("invoice already paid")]
    InvoiceAlreadyPaid,
    #[error("no route found")]
    NoRouteFound,
    #[error("insufficient outbound liquidity")]
    InsufficientLiquidity,
    #[error("lightning node error: {0}")]
    NodeError(String),
}

impl SendPaymentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SendPaymentError::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum KeysendError {
    #[error("payment timed out waiting for the node")]
    Timeout,
    #[error("no route found")]
    NoRouteFound,
    #[error("lightning node error: {0}")]
    NodeError(String),
}

impl KeysendError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, KeysendError::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invoice not found on the node")]
    NotFound,
    #[error("lightning node error: {0}")]
    NodeError(String),
}

#[derive(Debug, Clone)]
pub struct MadeInvoice {
    pub invoice: String,
    pub payment_hash: String,
    /// Some node clients reveal the preimage immediately, which is required
    /// for self-payment to work (see the Self-Payment Interceptor).
    pub preimage: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub amount_msat: MilliSats,
}

#[derive(Debug, Clone)]
pub struct SentPayment {
    pub preimage: String,
    pub fee_msat: MilliSats,
}

#[derive(Debug, Clone)]
pub struct KeysendResult {
    pub fee_msat: MilliSats,
}

#[derive(Debug, Clone)]
pub struct LookedUpInvoice {
    pub settled_at: Option<DateTime<Utc>>,
    pub preimage: Option<String>,
    pub fees_paid_msat: MilliSats,
}

/// Notification kinds an [`LnClient`] may push asynchronously; see the Event
/// Consumer (`payment_received` gates the Reconciler).
pub const NOTIFICATION_PAYMENT_RECEIVED: &str = "payment_received";
pub const NOTIFICATION_PAYMENT_SENT: &str = "payment_sent";
pub const NOTIFICATION_PAYMENT_FAILED: &str = "payment_failed";

#[async_trait]
pub trait LnClient: Send + Sync {
    async fn make_invoice(
        &self,
        amount_msat: MilliSats,
        description: Option<&str>,
        description_hash: Option<&str>,
        expiry_seconds: i64,
    ) -> Result<MadeInvoice, MakeInvoiceError>;

    async fn send_payment_sync(&self, bolt11: &str) -> Result<SentPayment, SendPaymentError>;

    async fn send_keysend(
        &self,
        amount_msat: MilliSats,
        destination_pubkey: &str,
        tlv_records: &[TlvRecord],
        preimage: &str,
    ) -> Result<KeysendResult, KeysendError>;

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<LookedUpInvoice, LookupError>;

    async fn get_pubkey(&self) -> String;

    async fn get_supported_notification_types(&self) -> HashSet<String>;
}
