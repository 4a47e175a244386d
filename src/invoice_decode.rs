//! Offline bolt11 decoding. The only invoice-format parsing this crate does —
//! everything else about invoice semantics (creation, settlement) lives in
//! `ln_client`/`transaction`. Mirrors the teacher's `ln::RawInvoice::parse`.

use lightning_invoice::Invoice as ParsedInvoice;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid bolt11 invoice: {0}")]
pub struct InvoiceDecodeError(pub String);

#[derive(Debug, Clone)]
pub struct DecodedInvoice {
    pub amount_msat: Option<i64>,
    pub payment_hash: String,
    pub payee_pubkey: String,
    pub expiry_seconds: u64,
    pub description: Option<String>,
}

/// Decodes a bolt11 string, after normalizing it to lowercase (bolt11 is
/// case-insensitive but the crate's ecosystem conventionally canonicalizes to
/// lowercase before hashing/storage).
pub fn decode(bolt11: &str) -> Result<DecodedInvoice, InvoiceDecodeError> {
    let normalized = bolt11.trim().to_lowercase();
    let parsed =
        ParsedInvoice::from_str(&normalized).map_err(|e| InvoiceDecodeError(e.to_string()))?;

    let payee_pubkey = parsed
        .payee_pub_key()
        .copied()
        .unwrap_or_else(|| parsed.recover_payee_pub_key())
        .to_string();

    let description = match parsed.description() {
        lightning_invoice::InvoiceDescription::Direct(desc) => Some(desc.to_string()),
        lightning_invoice::InvoiceDescription::Hash(_) => None,
    };

    Ok(DecodedInvoice {
        amount_msat: parsed
            .amount_milli_satoshis()
            .map(|amount| amount.try_into().unwrap_or(i64::MAX)),
        payment_hash: hex::encode(parsed.payment_hash()),
        payee_pubkey,
        expiry_seconds: parsed
            .expiry_time()
            .unwrap_or_else(|| Duration::from_secs(3600))
            .as_secs(),
        description,
    })
}
