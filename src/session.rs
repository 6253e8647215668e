//! Session service - the single writer of conversation state
//!
//! `SessionClient::start` spawns one loop task that owns the store, the
//! handshake, the coordinator and the transport. Transport events and
//! signer completions arrive on an internal unbounded queue, presentation
//! commands on a bounded one; the loop applies them one at a time and
//! republishes a [`SessionSnapshot`] after each.

use crate::auth::Handshake;
use crate::codec::{self, Inbound, Outbound};
use crate::config::ClientConfig;
use crate::coordinator::{Coordinator, SignerCompletion};
use crate::dispatch::{Dispatched, Dispatcher};
use crate::error::{ClientError, Result};
use crate::store::SessionStore;
use crate::transport::{Connector, Transport, TransportEvent, TransportStatus};
use crate::types::{title_from_message, ConnectionState, Conversation, DEFAULT_TITLE};
use crate::wallet::WalletSigner;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Read-only view of the session published after every applied event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Newest first
    pub conversations: Vec<Conversation>,
    pub current_id: Option<String>,
    pub connection: ConnectionState,
    pub identity: Option<String>,
    pub loading: bool,
    pub last_error: Option<String>,
    pub pending_transactions: usize,
}

impl SessionSnapshot {
    pub fn current(&self) -> Option<&Conversation> {
        let id = self.current_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn can_send(&self) -> bool {
        self.connection.can_send()
    }
}

/// Derive the process-wide connection state
///
/// A channel whose open has not reached the handshake yet counts as
/// merely connected, whatever the handshake says about the previous one.
pub fn connection_state(status: &TransportStatus, handshake: &Handshake) -> ConnectionState {
    if status.connected {
        if !handshake.is_current(status.generation) {
            ConnectionState::Connected
        } else if handshake.is_authenticated() {
            ConnectionState::Authenticated
        } else if handshake.is_pending() {
            ConnectionState::Authenticating
        } else {
            ConnectionState::Connected
        }
    } else if status.connecting {
        ConnectionState::Connecting
    } else {
        ConnectionState::Disconnected
    }
}

/// Internal events posted from transport and signer tasks
#[derive(Debug)]
enum SessionEvent {
    Transport(TransportEvent),
    Signed(SignerCompletion),
}

type Reply<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
enum Command {
    SendUserMessage { text: String, reply: Reply<Option<String>> },
    CreateConversation { reply: Reply<String> },
    SelectConversation { id: String, reply: Reply<()> },
    DeleteConversation { id: String, reply: Reply<()> },
    RenameConversation { id: String, title: String, reply: Reply<()> },
    SetIdentity { identity: Option<String>, reply: Reply<()> },
    Connect { reply: Reply<()> },
    Disconnect { reply: Reply<()> },
    Shutdown { reply: Reply<()> },
}

/// Cloneable handle to the running session service
#[derive(Debug, Clone)]
pub struct SessionClient {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionClient {
    /// Validate the config, spawn the session loop and start connecting
    pub fn start(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        wallet: Arc<dyn WalletSigner>,
    ) -> Result<Self> {
        config.validate()?;
        let connector_name = connector.name().to_string();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(config.event_capacity);

        let transport_tx = event_tx.clone();
        let transport = Transport::new(
            config.endpoint(),
            connector,
            &config.reconnect,
            Arc::new(move |event| {
                let _ = transport_tx.send(SessionEvent::Transport(event));
            }),
        );

        let signer_tx = event_tx;
        let coordinator = Coordinator::new(
            Arc::clone(&wallet),
            Arc::new(move |completion| {
                // Fails only after shutdown; the completion is then ignored
                let _ = signer_tx.send(SessionEvent::Signed(completion));
            }),
        );

        let mut handshake = Handshake::new(config.auth_marker.clone());
        handshake.set_identity(wallet.current_address());

        let status_rx = transport.subscribe();
        let session = SessionLoop {
            store: SessionStore::new(),
            handshake,
            coordinator,
            dispatcher: Dispatcher::new(config.network),
            transport,
            connect_task: None,
            snapshots: watch::channel(SessionSnapshot::default()).0,
        };
        let snapshots = session.snapshots.subscribe();
        session.publish();

        tracing::info!(
            endpoint = %config.endpoint(),
            connector = %connector_name,
            network = ?config.network,
            "Starting session service"
        );
        tokio::spawn(session.run(event_rx, command_rx, status_rx));

        Ok(Self {
            commands: command_tx,
            snapshots,
        })
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ClientError::ShutDown)?;
        rx.await.map_err(|_| ClientError::ShutDown)?
    }

    /// Send a user message in the current conversation
    ///
    /// Creates a conversation titled from the message when none is
    /// selected. Whitespace-only text is ignored and yields `Ok(None)`.
    /// Fails with `NotAuthenticated` before the handshake completes.
    pub async fn send_user_message(&self, text: impl Into<String>) -> Result<Option<String>> {
        let text = text.into();
        self.request(|reply| Command::SendUserMessage { text, reply }).await
    }

    /// Create and select an empty conversation
    pub async fn create_conversation(&self) -> Result<String> {
        self.request(|reply| Command::CreateConversation { reply }).await
    }

    pub async fn select_conversation(&self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        self.request(|reply| Command::SelectConversation { id, reply }).await
    }

    pub async fn delete_conversation(&self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        self.request(|reply| Command::DeleteConversation { id, reply }).await
    }

    pub async fn rename_conversation(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<()> {
        let id = id.into();
        let title = title.into();
        self.request(|reply| Command::RenameConversation { id, title, reply })
            .await
    }

    /// Report the wallet identity; a different identity re-authenticates
    pub async fn set_identity(&self, identity: Option<String>) -> Result<()> {
        self.request(|reply| Command::SetIdentity { identity, reply }).await
    }

    /// Start connecting; the outcome shows up in snapshots
    pub async fn connect(&self) -> Result<()> {
        self.request(|reply| Command::Connect { reply }).await
    }

    /// Close gracefully and cancel any scheduled reconnect
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Disconnect and stop the session loop
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch snapshots as they are published
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Whether the session loop is still running
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

struct SessionLoop {
    store: SessionStore,
    handshake: Handshake,
    coordinator: Coordinator,
    dispatcher: Dispatcher,
    transport: Transport,
    /// In-flight connect started by the loop
    connect_task: Option<JoinHandle<()>>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut commands: mpsc::Receiver<Command>,
        mut status: watch::Receiver<TransportStatus>,
    ) {
        self.start_connect();

        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event).await,
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::debug!("All session handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Ok(()) = status.changed() => {}
            }
            self.publish();
        }

        tracing::info!("Session service stopped");
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(TransportEvent::Opened { generation }) => {
                self.handshake.on_connected(generation);
                self.authenticate().await;
            }
            SessionEvent::Transport(TransportEvent::Frame(text)) => self.handle_frame(&text).await,
            SessionEvent::Transport(TransportEvent::Closed {
                generation,
                code,
                clean,
                ..
            }) => {
                // A newer channel may already have been applied
                if self.handshake.is_current(generation) {
                    self.handshake.on_disconnected();
                }
                tracing::debug!(generation, code, clean, "Session unauthenticated after close");
            }
            SessionEvent::Transport(TransportEvent::Failed(reason)) => {
                tracing::debug!(reason = %reason, "Transport open failed");
            }
            SessionEvent::Signed(completion) => {
                if let Some(result) = self.coordinator.complete(&mut self.store, completion) {
                    self.send_envelope(&result).await;
                }
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        let inbound = match codec::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping inbound frame");
                return;
            }
        };

        if let Inbound::SystemNotice { message, .. } = &inbound {
            if self.handshake.on_notice(message) {
                tracing::info!(identity = ?self.handshake.identity(), "Authenticated");
            }
        }

        if let Dispatched::SignRequested(request) = self.dispatcher.apply(&mut self.store, inbound) {
            self.coordinator
                .begin(&request.conversation_id, &request.turn_id, request.payload);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendUserMessage { text, reply } => {
                let result = self.send_user_message(text).await;
                self.respond(reply, result);
            }
            Command::CreateConversation { reply } => {
                let id = self.store.create_conversation(DEFAULT_TITLE);
                self.respond(reply, Ok(id));
            }
            Command::SelectConversation { id, reply } => {
                let result = self.store.select(&id);
                self.respond(reply, result);
            }
            Command::DeleteConversation { id, reply } => {
                let result = self.store.delete(&id).map(|_| ());
                self.respond(reply, result);
            }
            Command::RenameConversation { id, title, reply } => {
                let result = self.store.rename(&id, &title);
                self.respond(reply, result);
            }
            Command::SetIdentity { identity, reply } => {
                tracing::info!(identity = ?identity, "Wallet identity changed");
                self.handshake.set_identity(identity);
                self.authenticate().await;
                self.respond(reply, Ok(()));
            }
            Command::Connect { reply } => {
                self.start_connect();
                self.respond(reply, Ok(()));
            }
            Command::Disconnect { reply } => {
                self.cancel_connect();
                self.transport.disconnect(true).await;
                self.respond(reply, Ok(()));
            }
            Command::Shutdown { reply } => {
                // Intercepted by the loop
                let _ = reply.send(Err(ClientError::ShutDown));
            }
        }
    }

    /// Open the transport off the loop; `Opened`/`Failed` come back as events
    fn start_connect(&mut self) {
        if self.connect_task.as_ref().map_or(false, |task| !task.is_finished()) {
            return;
        }
        let transport = self.transport.clone();
        self.connect_task = Some(tokio::spawn(async move {
            if let Err(e) = transport.connect().await {
                tracing::debug!(error = %e, "Connect attempt failed");
            }
        }));
    }

    fn cancel_connect(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }

    /// Reply after publishing; callers see their change in `snapshot()`
    fn respond<T>(&self, reply: Reply<T>, result: Result<T>) {
        self.publish();
        let _ = reply.send(result);
    }

    async fn send_user_message(&mut self, text: String) -> Result<Option<String>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        // Gate on the live transport too; the close event may still be queued
        if !connection_state(&self.transport.status(), &self.handshake).can_send() {
            return Err(ClientError::NotAuthenticated);
        }
        let identity = self
            .handshake
            .identity()
            .ok_or(ClientError::NotAuthenticated)?
            .to_string();

        let frame = codec::encode(&Outbound::user_message(text.as_str(), identity))?;
        self.transport.send(frame).await?;

        let conversation_id = match self.store.current_id() {
            Some(id) => id.to_string(),
            None => self.store.create_conversation(title_from_message(&text)),
        };
        let turn_id = self.store.append_user_turn(&conversation_id, &text)?;
        self.store.set_loading(true);
        tracing::debug!(conversation = %conversation_id, turn = %turn_id, "User message sent");
        Ok(Some(turn_id))
    }

    async fn authenticate(&mut self) {
        if let Some(auth) = self.handshake.take_auth_request() {
            tracing::info!(identity = ?self.handshake.identity(), "Sending auth envelope");
            self.send_envelope(&auth).await;
        }
    }

    async fn send_envelope(&self, envelope: &Outbound) {
        let result = match codec::encode(envelope) {
            Ok(frame) => self.transport.send(frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(kind = envelope.kind(), error = %e, "Failed to send envelope");
        }
    }

    async fn shutdown(&mut self) {
        self.cancel_connect();
        self.transport.disconnect(true).await;
        let dropped = self.coordinator.clear();
        self.handshake.on_disconnected();
        if dropped > 0 {
            tracing::info!(dropped, "Abandoned pending sign requests");
        }
        self.publish();
    }

    fn publish(&self) {
        let status = self.transport.status();
        let snapshot = SessionSnapshot {
            conversations: self.store.conversations().to_vec(),
            current_id: self.store.current_id().map(str::to_string),
            connection: connection_state(&status, &self.handshake),
            identity: self.handshake.identity().map(str::to_string),
            loading: self.store.is_loading(),
            last_error: status.last_error,
            pending_transactions: self.coordinator.pending_count(),
        };
        self.snapshots.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Handshake;

    fn connected(generation: u64) -> TransportStatus {
        TransportStatus {
            connected: true,
            generation,
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_state_derivation() {
        let mut hs = Handshake::new("Authenticated successfully");
        assert_eq!(
            connection_state(&TransportStatus::default(), &hs),
            ConnectionState::Disconnected
        );
        assert_eq!(
            connection_state(
                &TransportStatus {
                    connecting: true,
                    ..Default::default()
                },
                &hs
            ),
            ConnectionState::Connecting
        );

        hs.on_connected(1);
        assert_eq!(connection_state(&connected(1), &hs), ConnectionState::Connected);

        hs.set_identity(Some("0.0.100".to_string()));
        hs.take_auth_request();
        assert_eq!(connection_state(&connected(1), &hs), ConnectionState::Authenticating);

        hs.on_notice("Authenticated successfully");
        assert_eq!(connection_state(&connected(1), &hs), ConnectionState::Authenticated);
        assert_eq!(
            connection_state(&TransportStatus::default(), &hs),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_reopened_channel_is_not_authenticated() {
        let mut hs = Handshake::new("Authenticated successfully");
        hs.set_identity(Some("0.0.100".to_string()));
        hs.on_connected(1);
        hs.take_auth_request();
        hs.on_notice("Authenticated successfully");

        // Transport already reopened; neither the close nor the open applied yet
        let state = connection_state(&connected(2), &hs);
        assert_eq!(state, ConnectionState::Connected);
        assert!(!state.can_send());
    }

    #[test]
    fn test_snapshot_current() {
        let conversation = Conversation::new("Swaps");
        let snapshot = SessionSnapshot {
            current_id: Some(conversation.id.clone()),
            conversations: vec![conversation],
            ..Default::default()
        };
        assert_eq!(snapshot.current().unwrap().title, "Swaps");
        assert!(!snapshot.can_send());
    }
}
