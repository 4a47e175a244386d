//! Parses the keysend TLV records this service understands: boostagram
//! (podcasting 2.0), whatsat free-text messages, and a custom-key app id
//! hint. No general TLV codec is implemented here — only extraction of the
//! handful of well-known types the spec cares about, consumed as already
//! decoded `(type, hex value)` pairs from the LN client.

use crate::app::AppId;
use serde_json::Value;
use uuid::Uuid;

pub const BOOSTAGRAM_TYPE: u64 = 7629169;
pub const WHATSAT_TYPE: u64 = 34349334;
pub const APP_ID_TYPE: u64 = 696969;

#[derive(Debug, Clone)]
pub struct TlvRecord {
    pub r#type: u64,
    pub hex_value: String,
}

#[derive(Debug, Default, Clone)]
pub struct ExtractedMetadata {
    pub description: Option<String>,
    pub boostagram: Option<Value>,
    pub recipient_app_id: Option<AppId>,
}

/// Extracts description, boostagram and recipient app id hints from a set of
/// inbound TLV records. Unknown types are ignored. Malformed values for a
/// known type are ignored rather than propagated as an error — a keysend
/// payment is still valid without decodable metadata.
pub fn extract(records: &[TlvRecord]) -> ExtractedMetadata {
    let mut result = ExtractedMetadata::default();

    for record in records {
        match record.r#type {
            BOOSTAGRAM_TYPE => {
                if let Some(bytes) = hex::decode(&record.hex_value).ok() {
                    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                        if result.description.is_none() {
                            result.description = value
                                .get("message")
                                .and_then(Value::as_str)
                                .map(str::to_owned);
                        }
                        result.boostagram = Some(value);
                    }
                }
            }
            WHATSAT_TYPE => {
                if result.description.is_none() {
                    if let Ok(bytes) = hex::decode(&record.hex_value) {
                        if let Ok(text) = String::from_utf8(bytes) {
                            result.description = Some(text);
                        }
                    }
                }
            }
            APP_ID_TYPE => {
                if let Ok(bytes) = hex::decode(&record.hex_value) {
                    if let Ok(text) = String::from_utf8(bytes) {
                        if let Ok(id) = text.parse::<u128>() {
                            result.recipient_app_id = Some(AppId(Uuid::from_u128(id)));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;

    fn hex_of(s: &str) -> String {
        hex::encode(s.as_bytes())
    }

    #[test]
    fn extracts_message_from_boostagram_json() {
        let records = vec![TlvRecord {
            r#type: BOOSTAGRAM_TYPE,
            hex_value: hex_of(r#"{"message":"hi","sender_name":"A"}"#),
        }];
        let extracted = extract(&records);
        assert_eq!(extracted.description.as_deref(), Some("hi"));
        assert!(extracted.boostagram.is_some());
    }

    #[test]
    fn falls_back_to_whatsat_text_when_no_boostagram() {
        let records = vec![TlvRecord {
            r#type: WHATSAT_TYPE,
            hex_value: hex_of("hello there"),
        }];
        let extracted = extract(&records);
        assert_eq!(extracted.description.as_deref(), Some("hello there"));
    }

    #[test]
    fn boostagram_takes_precedence_over_whatsat() {
        let records = vec![
            TlvRecord {
                r#type: WHATSAT_TYPE,
                hex_value: hex_of("fallback"),
            },
            TlvRecord {
                r#type: BOOSTAGRAM_TYPE,
                hex_value: hex_of(r#"{"message":"boosted"}"#),
            },
        ];
        let extracted = extract(&records);
        assert_eq!(extracted.description.as_deref(), Some("boosted"));
    }

    #[test]
    fn decodes_custom_app_id() {
        let records = vec![TlvRecord {
            r#type: APP_ID_TYPE,
            hex_value: hex_of("42"),
        }];
        let extracted = extract(&records);
        assert_eq!(extracted.recipient_app_id, Some(AppId(Uuid::from_u128(42))));
    }

    #[test]
    fn malformed_values_are_ignored_not_errors() {
        let records = vec![TlvRecord {
            r#type: BOOSTAGRAM_TYPE,
            hex_value: "not hex".to_owned(),
        }];
        let extracted = extract(&records);
        assert_eq!(extracted.description, None);
        assert_eq!(extracted.boostagram, None);
    }
}
