//! # hedron-session
//!
//! Client-side session layer for the Hedron DeFi agent.
//!
//! ## Overview
//!
//! `hedron-session` keeps one persistent WebSocket connection to the agent
//! backend, authenticates it with the connected wallet's account id, routes
//! inbound envelopes into an in-memory conversation store and drives the
//! out-of-band transaction signing handshake with an external wallet.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hedron_session::{ClientConfig, MemoryWallet, SessionClient, WsConnector};
//! use std::sync::Arc;
//!
//! # async fn example() -> hedron_session::Result<()> {
//! let client = SessionClient::start(
//!     ClientConfig::from_env()?,
//!     Arc::new(WsConnector::default()),
//!     Arc::new(MemoryWallet::approving("0.0.34567890")),
//! )?;
//!
//! let mut snapshots = client.subscribe();
//! while !snapshots.borrow().can_send() {
//!     snapshots.changed().await.ok();
//! }
//! client.send_user_message("What is my HBAR balance?").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Transport** - connection lifecycle over any `Connector` (WebSocket or in-memory)
//! - **Handshake** - one auth envelope per connection and identity
//! - **Codec** - typed envelopes discriminated by `type`
//! - **Dispatcher** - one store transition per inbound envelope
//! - **Coordinator** - pending sign requests and the wallet signer
//! - **Extractor** - heuristic swap quotes from agent text
//! - **SessionClient** - single-writer loop tying it all together

pub mod auth;
pub mod backoff;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;
pub mod wallet;

// Re-export core types
pub use backoff::{Jitter, ReconnectPolicy};
pub use codec::{Inbound, Outbound};
pub use config::{ClientConfig, DeployMode};
pub use error::{ClientError, Result, SignerError};
pub use extract::extract_swap_quote;
pub use session::{SessionClient, SessionSnapshot};
pub use store::SessionStore;
pub use types::{
    Author, ConnectionState, Conversation, Network, QuoteLeg, SwapOperation, SwapQuote,
    TransactionRequest, TransactionStatus, Turn,
};
pub use wallet::{MemoryWallet, SignBehavior, WalletSigner};

// Re-export connectors for convenience
pub use transport::memory::MemoryConnector;
pub use transport::ws::WsConnector;
pub use transport::{Connector, Transport, TransportEvent, TransportStatus};
