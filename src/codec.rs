//! Wire codec - typed envelopes discriminated by a `type` field
//!
//! Inbound frames are JSON text. Anything that does not parse into a known
//! envelope becomes a `ClientError::Decode`; callers log and drop it.

use crate::error::{ClientError, Result};
use crate::types::{now_millis, SwapQuote, TransactionStatus};
use serde::{Deserialize, Serialize};

/// `type` values accepted from the backend
pub const INBOUND_TYPES: [&str; 4] = [
    "AGENT_RESPONSE",
    "SYSTEM_MESSAGE",
    "TRANSACTION_TO_SIGN",
    "SWAP_QUOTE",
];

/// Envelopes received from the agent backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    /// Natural-language agent reply
    #[serde(rename = "AGENT_RESPONSE", rename_all = "camelCase")]
    AgentReply {
        message: String,
        #[serde(default)]
        has_transaction: bool,
    },

    /// Informational notice; also carries the auth acknowledgement
    #[serde(rename = "SYSTEM_MESSAGE")]
    SystemNotice { level: String, message: String },

    /// Opaque transaction the wallet must sign
    #[serde(rename = "TRANSACTION_TO_SIGN", rename_all = "camelCase")]
    TransactionToSign {
        original_query: String,
        transaction_bytes: Vec<u8>,
    },

    /// Pre-structured quote
    #[serde(rename = "SWAP_QUOTE", rename_all = "camelCase")]
    SwapQuote {
        quote: SwapQuote,
        #[serde(default)]
        original_message: String,
    },
}

impl Inbound {
    /// Wire `type` of this envelope
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentReply { .. } => "AGENT_RESPONSE",
            Self::SystemNotice { .. } => "SYSTEM_MESSAGE",
            Self::TransactionToSign { .. } => "TRANSACTION_TO_SIGN",
            Self::SwapQuote { .. } => "SWAP_QUOTE",
        }
    }
}

/// Envelopes sent to the agent backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    /// Identity proof sent once per connection/identity
    #[serde(rename = "CONNECTION_AUTH", rename_all = "camelCase")]
    Auth {
        user_account_id: String,
        timestamp: u64,
    },

    #[serde(rename = "USER_MESSAGE", rename_all = "camelCase")]
    UserMessage {
        message: String,
        user_account_id: String,
        timestamp: u64,
    },

    /// Outcome of a sign request
    #[serde(rename = "TRANSACTION_RESULT", rename_all = "camelCase")]
    TransactionResult {
        success: bool,
        transaction_id: String,
        status: String,
        timestamp: u64,
    },
}

impl Outbound {
    pub fn auth(identity: impl Into<String>) -> Self {
        Self::Auth {
            user_account_id: identity.into(),
            timestamp: now_millis(),
        }
    }

    pub fn user_message(message: impl Into<String>, identity: impl Into<String>) -> Self {
        Self::UserMessage {
            message: message.into(),
            user_account_id: identity.into(),
            timestamp: now_millis(),
        }
    }

    /// Result report; a failed request carries an empty transaction id
    pub fn transaction_result(status: TransactionStatus, transaction_id: Option<String>) -> Self {
        Self::TransactionResult {
            success: status == TransactionStatus::Success,
            transaction_id: transaction_id.unwrap_or_default(),
            status: status.as_wire().to_string(),
            timestamp: now_millis(),
        }
    }

    /// Wire `type` of this envelope
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "CONNECTION_AUTH",
            Self::UserMessage { .. } => "USER_MESSAGE",
            Self::TransactionResult { .. } => "TRANSACTION_RESULT",
        }
    }
}

/// Serialize an outbound envelope to a JSON text frame
pub fn encode(envelope: &Outbound) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parse a JSON text frame into an inbound envelope
pub fn decode(text: &str) -> Result<Inbound> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ClientError::decode(format!("invalid JSON: {}", e)))?;

    let kind = match value.get("type") {
        Some(serde_json::Value::String(kind)) => kind.clone(),
        Some(_) => return Err(ClientError::decode("'type' is not a string")),
        None => return Err(ClientError::decode("missing 'type' field")),
    };

    if !INBOUND_TYPES.contains(&kind.as_str()) {
        return Err(ClientError::decode(format!("unknown envelope type '{}'", kind)));
    }

    serde_json::from_value(value)
        .map_err(|e| ClientError::decode(format!("malformed '{}' envelope: {}", kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_reason(text: &str) -> String {
        match decode(text) {
            Err(ClientError::Decode { reason }) => reason,
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_agent_reply() {
        let msg = decode(r#"{"type":"AGENT_RESPONSE","message":"hi","hasTransaction":true}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::AgentReply {
                message: "hi".to_string(),
                has_transaction: true
            }
        );
    }

    #[test]
    fn test_decode_agent_reply_without_flag() {
        let msg = decode(r#"{"type":"AGENT_RESPONSE","message":"hi"}"#).unwrap();
        assert!(matches!(msg, Inbound::AgentReply { has_transaction: false, .. }));
    }

    #[test]
    fn test_decode_system_notice() {
        let msg = decode(r#"{"type":"SYSTEM_MESSAGE","level":"info","message":"Authenticated successfully"}"#)
            .unwrap();
        assert_eq!(msg.kind(), "SYSTEM_MESSAGE");
        match msg {
            Inbound::SystemNotice { level, message } => {
                assert_eq!(level, "info");
                assert_eq!(message, "Authenticated successfully");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_transaction_to_sign() {
        let msg = decode(
            r#"{"type":"TRANSACTION_TO_SIGN","originalQuery":"swap 10 HBAR","transactionBytes":[1,2,3]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Inbound::TransactionToSign {
                original_query: "swap 10 HBAR".to_string(),
                transaction_bytes: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn test_decode_swap_quote() {
        let msg = decode(
            r#"{"type":"SWAP_QUOTE","originalMessage":"quote please","quote":{
                "operation":"get_amounts_out","network":"mainnet",
                "input":{"token":"HBAR","tokenId":"0.0.0","amount":"10","formatted":"10"},
                "output":{"token":"SAUCE","tokenId":"0.0.731861","amount":"0.44","formatted":"0.44"},
                "path":["0.0.0","0.0.731861"],"fees":[3000],"exchangeRate":"0.044"}}"#,
        )
        .unwrap();
        match msg {
            Inbound::SwapQuote { quote, original_message } => {
                assert_eq!(original_message, "quote please");
                assert_eq!(quote.output.token, "SAUCE");
                assert_eq!(quote.fees, vec![3000]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode_reason(r#"{"type":"PING"}"#).contains("unknown envelope type 'PING'"));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        assert!(decode_reason(r#"{"message":"hi"}"#).contains("missing 'type'"));
        assert!(decode_reason(r#"{"type":7}"#).contains("not a string"));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let reason = decode_reason(r#"{"type":"TRANSACTION_TO_SIGN","originalQuery":"q","transactionBytes":[1,999]}"#);
        assert!(reason.contains("malformed 'TRANSACTION_TO_SIGN'"));

        let reason = decode_reason(r#"{"type":"SYSTEM_MESSAGE","message":"no level"}"#);
        assert!(reason.contains("malformed 'SYSTEM_MESSAGE'"));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(decode_reason("not json").contains("invalid JSON"));
        assert!(decode_reason("").contains("invalid JSON"));
    }

    #[test]
    fn test_encode_auth_wire_shape() {
        let json = encode(&Outbound::auth("0.0.100")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "CONNECTION_AUTH");
        assert_eq!(value["userAccountId"], "0.0.100");
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_user_message_roundtrip() {
        let envelope = Outbound::user_message("What is my HBAR balance?", "0.0.100");
        let json = encode(&envelope).unwrap();
        assert!(json.contains("\"type\":\"USER_MESSAGE\""));
        assert!(json.contains("\"userAccountId\":\"0.0.100\""));

        let parsed: Outbound = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_transaction_result_shapes() {
        let ok = Outbound::transaction_result(
            TransactionStatus::Success,
            Some("0.0.555@123.456".to_string()),
        );
        let value: serde_json::Value = serde_json::from_str(&encode(&ok).unwrap()).unwrap();
        assert_eq!(value["type"], "TRANSACTION_RESULT");
        assert_eq!(value["success"], true);
        assert_eq!(value["transactionId"], "0.0.555@123.456");
        assert_eq!(value["status"], "SUCCESS");

        let failed = Outbound::transaction_result(TransactionStatus::Failed, None);
        let value: serde_json::Value = serde_json::from_str(&encode(&failed).unwrap()).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["transactionId"], "");
        assert_eq!(value["status"], "FAILED");
    }
}
