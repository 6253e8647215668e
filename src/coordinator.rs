//! Pending-transaction coordinator
//!
//! Each sign request goes `received -> awaiting signature -> signed | failed`.
//! `begin` registers the request and spawns exactly one signer call; the
//! call's outcome comes back as a [`SignerCompletion`] through the same
//! queue the session applies everything else from, and `complete` turns
//! it into a store update plus the outbound result envelope.

use crate::codec::Outbound;
use crate::error::SignerError;
use crate::store::SessionStore;
use crate::types::TransactionStatus;
use crate::wallet::WalletSigner;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one signer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerCompletion {
    pub turn_id: String,
    pub result: std::result::Result<String, SignerError>,
}

/// Callback receiving signer completions
pub type CompletionSink = Arc<dyn Fn(SignerCompletion) + Send + Sync>;

#[derive(Debug)]
struct PendingSign {
    conversation_id: String,
}

/// Owns the pending map and the signer
pub struct Coordinator {
    wallet: Arc<dyn WalletSigner>,
    completions: CompletionSink,
    pending: HashMap<String, PendingSign>,
}

impl Coordinator {
    pub fn new(wallet: Arc<dyn WalletSigner>, completions: CompletionSink) -> Self {
        Self {
            wallet,
            completions,
            pending: HashMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, turn_id: &str) -> bool {
        self.pending.contains_key(turn_id)
    }

    /// Register a request and invoke the signer without waiting for it
    ///
    /// A request already registered for the same turn is left alone.
    pub fn begin(&mut self, conversation_id: &str, turn_id: &str, payload: Vec<u8>) {
        if self.pending.contains_key(turn_id) {
            tracing::warn!(turn = %turn_id, "Sign request already pending");
            return;
        }

        let wallet = Arc::clone(&self.wallet);
        let completions = Arc::clone(&self.completions);
        let task_turn = turn_id.to_string();
        tokio::spawn(async move {
            let result = if wallet.is_connected() {
                wallet.sign_bytes(&payload).await
            } else {
                Err(SignerError::WalletUnavailable)
            };
            completions(SignerCompletion {
                turn_id: task_turn,
                result,
            });
        });

        tracing::info!(
            conversation = %conversation_id,
            turn = %turn_id,
            pending = self.pending.len() + 1,
            "Awaiting signature"
        );
        self.pending.insert(
            turn_id.to_string(),
            PendingSign {
                conversation_id: conversation_id.to_string(),
            },
        );
    }

    /// Apply a signer outcome
    ///
    /// Returns the result envelope to send, or `None` for completions that
    /// no longer have a pending entry.
    pub fn complete(
        &mut self,
        store: &mut SessionStore,
        completion: SignerCompletion,
    ) -> Option<Outbound> {
        let Some(pending) = self.pending.remove(&completion.turn_id) else {
            tracing::debug!(turn = %completion.turn_id, "Ignoring completion for unknown request");
            return None;
        };

        let (status, transaction_id, error) = match completion.result {
            Ok(tx_id) => {
                tracing::info!(turn = %completion.turn_id, transaction_id = %tx_id, "Transaction signed");
                (TransactionStatus::Success, Some(tx_id), None)
            }
            Err(e) => {
                tracing::warn!(turn = %completion.turn_id, error = %e, "Transaction signing failed");
                (TransactionStatus::Failed, None, Some(e.to_string()))
            }
        };

        if let Err(e) = store.resolve_transaction(
            &pending.conversation_id,
            &completion.turn_id,
            status,
            transaction_id.clone(),
            error,
        ) {
            // Conversation deleted meanwhile; the backend still gets its answer
            tracing::warn!(turn = %completion.turn_id, error = %e, "Transaction turn no longer present");
        }
        store.set_loading(false);

        Some(Outbound::transaction_result(status, transaction_id))
    }

    /// Forget all pending requests; their completions will be ignored
    ///
    /// In-flight signer calls are not cancelled.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("pending", &self.pending.len())
            .finish()
    }
}
