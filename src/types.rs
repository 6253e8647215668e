//! Core session types: conversations, turns, transaction requests and quotes
//!
//! All types use camelCase JSON serialization for wire compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Agent,
    System,
}

/// Lifecycle of a transaction request
///
/// Only `Pending` may transition; `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    /// Whether this status can no longer change
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Wire representation used in `TRANSACTION_RESULT.status`
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

/// A sign request attached to a system turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// The user query that produced this transaction
    pub original_query: String,

    /// Opaque serialized transaction handed to the signer
    pub payload: Vec<u8>,

    /// Current status
    pub status: TransactionStatus,

    /// Network transaction id once signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// Failure annotation recorded when signing fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionRequest {
    /// Create a new pending request
    pub fn pending(original_query: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            original_query: original_query.into(),
            payload,
            status: TransactionStatus::Pending,
            transaction_id: None,
            error: None,
        }
    }

    /// Move to a terminal status
    ///
    /// Returns `false` and leaves the request untouched if it is already
    /// terminal or `status` is not terminal.
    pub fn resolve(
        &mut self,
        status: TransactionStatus,
        transaction_id: Option<String>,
        error: Option<String>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.transaction_id = transaction_id;
        self.error = error;
        true
    }
}

/// Which Hedera network a quote or token id refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

/// Quote direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapOperation {
    /// Exact input
    #[default]
    GetAmountsOut,
    /// Exact output
    GetAmountsIn,
}

/// One side of a swap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLeg {
    /// Token symbol (e.g. "HBAR")
    pub token: String,
    /// Token entity id (e.g. "0.0.731861")
    pub token_id: String,
    /// Raw amount as written
    pub amount: String,
    /// Display amount
    pub formatted: String,
}

/// Structured swap quote
///
/// Either delivered pre-structured by the backend or reconstructed from
/// agent text. Never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    #[serde(default)]
    pub operation: SwapOperation,

    #[serde(default)]
    pub network: Network,

    pub input: QuoteLeg,

    pub output: QuoteLeg,

    /// Token ids along the route
    #[serde(default)]
    pub path: Vec<String>,

    /// Pool fees in hundredths of a basis point (3000 = 0.30%)
    #[serde(default)]
    pub fees: Vec<u32>,

    /// Output units per one input unit
    pub exchange_rate: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_estimate: Option<String>,

    #[serde(default)]
    pub original_message: String,
}

impl SwapQuote {
    /// Fees rendered as percentages, e.g. `["0.30%"]`
    pub fn fee_percentages(&self) -> Vec<String> {
        self.fees
            .iter()
            .map(|fee| format!("{:.2}%", f64::from(*fee) / 10_000.0))
            .collect()
    }
}

/// One entry in a conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Unique turn identifier (turn-<uuid>)
    pub id: String,

    pub author: Author,

    pub body: String,

    pub timestamp: DateTime<Utc>,

    /// Set when the agent flagged that a transaction follows
    #[serde(default)]
    pub has_transaction: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_quote: Option<SwapQuote>,
}

impl Turn {
    /// Create a plain turn with a fresh id
    pub fn new(author: Author, body: impl Into<String>) -> Self {
        Self {
            id: format!("turn-{}", uuid::Uuid::new_v4()),
            author,
            body: body.into(),
            timestamp: Utc::now(),
            has_transaction: false,
            transaction: None,
            swap_quote: None,
        }
    }

    /// Attach a transaction request
    pub fn with_transaction(mut self, request: TransactionRequest) -> Self {
        self.transaction = Some(request);
        self
    }

    /// Attach a swap quote
    pub fn with_swap_quote(mut self, quote: SwapQuote) -> Self {
        self.swap_quote = Some(quote);
        self
    }

    /// Mark the agent's transaction flag
    pub fn with_transaction_flag(mut self, flag: bool) -> Self {
        self.has_transaction = flag;
        self
    }
}

/// Titled, ordered collection of turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation identifier (conv-<uuid>)
    pub id: String,

    pub title: String,

    /// Append-only log
    pub turns: Vec<Turn>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Title given to conversations created without a first message
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum characters kept when deriving a title from a message
pub const TITLE_MAX_CHARS: usize = 50;

impl Conversation {
    /// Create an empty conversation
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("conv-{}", uuid::Uuid::new_v4()),
            title: title.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Find a turn by id
    pub fn turn(&self, turn_id: &str) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == turn_id)
    }
}

/// Derive a conversation title from the first message
pub fn title_from_message(message: &str) -> String {
    let trimmed = message.trim();
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Process-wide connection state, gating the send affordance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
}

impl ConnectionState {
    /// Whether user messages may be sent
    pub fn can_send(self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

/// Current time in Unix milliseconds
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::new(Author::User, "hello");
        assert!(turn.id.starts_with("turn-"));
        assert_eq!(turn.author, Author::User);
        assert_eq!(turn.body, "hello");
        assert!(turn.transaction.is_none());
        assert!(turn.swap_quote.is_none());
        assert!(!turn.has_transaction);
    }

    #[test]
    fn test_turn_ids_unique() {
        let a = Turn::new(Author::Agent, "x");
        let b = Turn::new(Author::Agent, "x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_transaction_resolve_success() {
        let mut req = TransactionRequest::pending("swap 10 HBAR", vec![1, 2, 3]);
        assert!(req.resolve(
            TransactionStatus::Success,
            Some("0.0.555@123.456".to_string()),
            None
        ));
        assert_eq!(req.status, TransactionStatus::Success);
        assert_eq!(req.transaction_id.as_deref(), Some("0.0.555@123.456"));
    }

    #[test]
    fn test_transaction_status_is_monotonic() {
        let mut req = TransactionRequest::pending("q", vec![]);
        assert!(req.resolve(TransactionStatus::Failed, None, Some("rejected".into())));

        assert!(!req.resolve(TransactionStatus::Success, Some("tx".into()), None));
        assert!(!req.resolve(TransactionStatus::Pending, None, None));
        assert_eq!(req.status, TransactionStatus::Failed);
        assert!(req.transaction_id.is_none());
        assert_eq!(req.error.as_deref(), Some("rejected"));
    }

    #[test]
    fn test_transaction_resolve_requires_terminal_target() {
        let mut req = TransactionRequest::pending("q", vec![]);
        assert!(!req.resolve(TransactionStatus::Pending, None, None));
        assert_eq!(req.status, TransactionStatus::Pending);
    }

    #[test]
    fn test_title_from_short_message() {
        assert_eq!(title_from_message("  swap 10 HBAR  "), "swap 10 HBAR");
    }

    #[test]
    fn test_title_from_long_message() {
        let msg = "a".repeat(60);
        let title = title_from_message(&msg);
        assert_eq!(title.len(), 53);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_fee_percentages() {
        let quote = SwapQuote {
            fees: vec![3000, 1500],
            ..Default::default()
        };
        assert_eq!(quote.fee_percentages(), vec!["0.30%", "0.15%"]);
    }

    #[test]
    fn test_swap_quote_wire_shape() {
        let json = r#"{
            "operation": "get_amounts_in",
            "network": "testnet",
            "input": {"token": "HBAR", "tokenId": "0.0.0", "amount": "10", "formatted": "10"},
            "output": {"token": "SAUCE", "tokenId": "0.0.1183558", "amount": "0.44", "formatted": "0.44"},
            "path": ["0.0.0", "0.0.1183558"],
            "fees": [3000],
            "exchangeRate": "0.044",
            "gasEstimate": "120000"
        }"#;

        let quote: SwapQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.operation, SwapOperation::GetAmountsIn);
        assert_eq!(quote.network, Network::Testnet);
        assert_eq!(quote.input.token_id, "0.0.0");
        assert_eq!(quote.gas_estimate.as_deref(), Some("120000"));
        assert_eq!(quote.original_message, "");
    }

    #[test]
    fn test_connection_state_gates_send() {
        assert!(ConnectionState::Authenticated.can_send());
        assert!(!ConnectionState::Connected.can_send());
        assert!(!ConnectionState::Authenticating.can_send());
        assert!(!ConnectionState::Disconnected.can_send());
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("TESTNET".parse::<Network>().unwrap(), Network::Testnet);
        assert!("previewnet".parse::<Network>().is_err());
    }
}
