//! Wallet signer abstraction
//!
//! The session never signs anything itself. A `WalletSigner` supplies the
//! account identity used for authentication and turns opaque transaction
//! payloads into network transaction ids.

use crate::error::SignerError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// External wallet capability
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Account id of the connected wallet, if any
    fn current_address(&self) -> Option<String>;

    /// Whether a wallet is connected and able to sign
    fn is_connected(&self) -> bool;

    /// Sign and submit a serialized transaction, returning its id
    async fn sign_bytes(&self, payload: &[u8]) -> std::result::Result<String, SignerError>;
}

/// What `MemoryWallet` does with requests that have no scripted outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignBehavior {
    /// Approve with a synthetic `<account>@<secs>.<nanos>` id
    Approve,
    /// Reject with the given reason
    Reject(String),
}

struct WalletState {
    address: Option<String>,
    connected: bool,
    behavior: SignBehavior,
    scripted: VecDeque<std::result::Result<String, SignerError>>,
    calls: Vec<Vec<u8>>,
    delay: Option<Duration>,
}

/// In-process wallet for tests and the demo client
#[derive(Clone)]
pub struct MemoryWallet {
    state: Arc<Mutex<WalletState>>,
}

impl MemoryWallet {
    /// Connected wallet that approves everything
    pub fn approving(address: impl Into<String>) -> Self {
        Self::with_behavior(Some(address.into()), SignBehavior::Approve)
    }

    /// Connected wallet that rejects everything
    pub fn rejecting(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_behavior(Some(address.into()), SignBehavior::Reject(reason.into()))
    }

    /// No wallet connected
    pub fn disconnected() -> Self {
        let wallet = Self::with_behavior(None, SignBehavior::Approve);
        wallet.lock().connected = false;
        wallet
    }

    fn with_behavior(address: Option<String>, behavior: SignBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(WalletState {
                address,
                connected: true,
                behavior,
                scripted: VecDeque::new(),
                calls: Vec::new(),
                delay: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulate the user taking time to approve
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    /// Switch accounts; `None` disconnects the wallet
    pub fn set_address(&self, address: Option<String>) {
        let mut state = self.lock();
        state.connected = address.is_some();
        state.address = address;
    }

    /// Queue the outcome of the next sign request
    pub fn push_result(&self, result: std::result::Result<String, SignerError>) {
        self.lock().scripted.push_back(result);
    }

    /// Payloads passed to `sign_bytes`, in call order
    pub fn calls(&self) -> Vec<Vec<u8>> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl WalletSigner for MemoryWallet {
    fn current_address(&self) -> Option<String> {
        let state = self.lock();
        if state.connected {
            state.address.clone()
        } else {
            None
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn sign_bytes(&self, payload: &[u8]) -> std::result::Result<String, SignerError> {
        let (delay, outcome) = {
            let mut state = self.lock();
            state.calls.push(payload.to_vec());

            let outcome = if !state.connected {
                Err(SignerError::WalletUnavailable)
            } else if let Some(scripted) = state.scripted.pop_front() {
                scripted
            } else if payload.is_empty() {
                Err(SignerError::InvalidPayload("empty transaction payload".to_string()))
            } else {
                match &state.behavior {
                    SignBehavior::Approve => Ok(synthetic_transaction_id(
                        state.address.as_deref().unwrap_or("0.0.0"),
                    )),
                    SignBehavior::Reject(reason) => Err(SignerError::Rejected(reason.clone())),
                }
            };
            (state.delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// Hedera-style transaction id: `<payer>@<seconds>.<nanos>`
fn synthetic_transaction_id(account: &str) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}@{}.{:09}", account, now.as_secs(), now.subsec_nanos())
}
