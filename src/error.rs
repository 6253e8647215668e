//! Error types for hedron-session

use thiserror::Error;

/// Errors that can occur in the session layer
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused or failed to open
    #[error("Connection error: {0}")]
    Connection(String),

    /// The channel closed underneath an operation
    #[error("Connection closed")]
    Closed,

    /// A write was attempted while the channel is not open
    #[error("Not connected to backend")]
    NotConnected,

    /// Malformed or unknown inbound envelope
    #[error("Failed to decode envelope: {reason}")]
    Decode { reason: String },

    /// Sending attempted before the handshake completed
    #[error("Not authenticated: wait for the wallet handshake to complete")]
    NotAuthenticated,

    /// External wallet signer failure
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    /// Unknown conversation or turn
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session service has been torn down
    #[error("Session service has shut down")]
    ShutDown,
}

impl ClientError {
    /// Build a decode error from any displayable reason
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}

/// Failures reported by the external wallet signer
///
/// Every variant is terminal for the transaction request it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// The user declined the request in their wallet
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// No wallet is connected
    #[error("Wallet not connected")]
    WalletUnavailable,

    /// The payload could not be parsed as a transaction
    #[error("Invalid transaction payload: {0}")]
    InvalidPayload(String),

    /// Any other wallet-side failure
    #[error("Signing failed: {0}")]
    Failed(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, ClientError>;
