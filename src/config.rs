//! Service-wide configuration, following the shape of the teacher's `ln::Config`.

use crate::amount::Sats;

/// Maximum serialized size, in bytes, of the opaque metadata map attached to an
/// invoice or keysend payment.
pub const INVOICE_METADATA_MAX_LENGTH: usize = 8192;

/// How far back the [`crate::reconciler`] looks for `pending` rows during a
/// batch pass.
pub const RECONCILE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint of the Lightning node client this service talks to. Opaque here
    /// since the concrete `LnClient` is supplied by the embedder.
    pub ln_endpoint: String,
    /// Minimum fee reserve, in sats, applied to any outgoing payment regardless
    /// of amount.
    pub min_fee_reserve: Sats,
    /// Cap on serialized metadata size; defaults to [`INVOICE_METADATA_MAX_LENGTH`].
    pub metadata_max_length: usize,
    /// Window, in hours, the reconciler considers when sweeping pending rows.
    pub reconcile_window_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ln_endpoint: String::new(),
            min_fee_reserve: Sats(10),
            metadata_max_length: INVOICE_METADATA_MAX_LENGTH,
            reconcile_window_hours: RECONCILE_WINDOW_HOURS,
        }
    }
}
