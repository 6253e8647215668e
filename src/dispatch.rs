//! Event dispatcher
//!
//! Applies one decoded inbound envelope to the store as exactly one
//! transition. Envelopes arriving with no conversation selected are
//! dropped, not queued.

use crate::codec::Inbound;
use crate::extract::extract_swap_quote;
use crate::store::SessionStore;
use crate::types::{Author, Network, TransactionRequest, Turn};

/// Handoff produced by a `TRANSACTION_TO_SIGN` envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub conversation_id: String,
    pub turn_id: String,
    pub payload: Vec<u8>,
}

/// Result of dispatching one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A turn was appended
    Appended { turn_id: String },
    /// A turn was appended and a signature is needed
    SignRequested(SignRequest),
    /// No conversation selected; nothing changed
    Dropped,
}

impl Dispatched {
    pub fn turn_id(&self) -> Option<&str> {
        match self {
            Self::Appended { turn_id } => Some(turn_id),
            Self::SignRequested(request) => Some(&request.turn_id),
            Self::Dropped => None,
        }
    }
}

/// Body text of a system turn
pub fn notice_text(level: &str, message: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        message.to_string()
    } else {
        format!("[{}] {}", level.to_ascii_lowercase(), message)
    }
}

/// Routes inbound envelopes into the store
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    network: Network,
}

impl Dispatcher {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn apply(&self, store: &mut SessionStore, inbound: Inbound) -> Dispatched {
        let kind = inbound.kind();
        let Some(conversation_id) = store.current_id().map(str::to_string) else {
            tracing::debug!(kind, "No conversation selected; dropping envelope");
            return Dispatched::Dropped;
        };

        let (turn, sign_payload, clears_loading) = match inbound {
            Inbound::AgentReply {
                message,
                has_transaction,
            } => {
                let mut turn = Turn::new(Author::Agent, message.as_str())
                    .with_transaction_flag(has_transaction);
                if let Some(quote) = extract_swap_quote(&message, self.network) {
                    tracing::debug!(input = %quote.input.token, output = %quote.output.token, "Swap quote extracted");
                    turn = turn.with_swap_quote(quote);
                }
                (turn, None, true)
            }
            Inbound::SystemNotice { level, message } => (
                Turn::new(Author::System, notice_text(&level, &message)),
                None,
                false,
            ),
            Inbound::TransactionToSign {
                original_query,
                transaction_bytes,
            } => {
                let request = TransactionRequest::pending(original_query, transaction_bytes.clone());
                let turn = Turn::new(Author::System, "Transaction ready. Please approve it in your wallet.")
                    .with_transaction_flag(true)
                    .with_transaction(request);
                (turn, Some(transaction_bytes), false)
            }
            Inbound::SwapQuote {
                mut quote,
                original_message,
            } => {
                if quote.original_message.is_empty() {
                    quote.original_message = original_message.clone();
                }
                let body = if original_message.is_empty() {
                    format!("Swap quote: {} {} for {} {}", quote.input.formatted, quote.input.token, quote.output.formatted, quote.output.token)
                } else {
                    original_message
                };
                (Turn::new(Author::Agent, body).with_swap_quote(quote), None, true)
            }
        };

        let turn_id = match store.append(&conversation_id, turn) {
            Ok(turn_id) => turn_id,
            Err(e) => {
                tracing::warn!(kind, error = %e, "Failed to append turn");
                return Dispatched::Dropped;
            }
        };
        if clears_loading {
            store.set_loading(false);
        }
        tracing::debug!(kind, conversation = %conversation_id, turn = %turn_id, "Envelope applied");

        match sign_payload {
            Some(payload) => Dispatched::SignRequested(SignRequest {
                conversation_id,
                turn_id,
                payload,
            }),
            None => Dispatched::Appended { turn_id },
        }
    }
}
