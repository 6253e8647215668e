//! Connection lifecycle - connect, disconnect, send and reconnect
//!
//! `Transport` owns exactly one channel at a time. Every open bumps a
//! generation counter; reader tasks and reconnect timers carry the
//! generation they were started for and become no-ops once it is stale.

use super::{Connector, Frame, FrameSink, FrameStream, CLOSE_ABNORMAL, CLOSE_NORMAL};
use crate::backoff::{ExponentialBackoff, ReconnectPolicy};
use crate::error::{ClientError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Lifecycle notifications delivered in the order they happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Channel of `generation` is open and writable
    Opened { generation: u64 },
    /// Inbound text frame
    Frame(String),
    /// Channel of `generation` closed; `clean` closes never reconnect
    Closed {
        generation: u64,
        code: u16,
        reason: String,
        clean: bool,
    },
    /// An open attempt failed
    Failed(String),
}

/// Observable connection signals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatus {
    pub connected: bool,
    pub connecting: bool,
    /// Human-readable description of the last problem
    pub last_error: Option<String>,
    /// Reconnect delays handed out since the last successful open
    pub reconnect_attempts: u32,
    /// Generation of the most recently opened channel
    pub generation: u64,
}

/// Callback receiving transport events
pub type EventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

struct LinkState {
    connecting: bool,
    sink: Option<Box<dyn FrameSink>>,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    backoff: ExponentialBackoff,
}

struct Inner {
    endpoint: String,
    connector: Arc<dyn Connector>,
    events: EventSink,
    status: watch::Sender<TransportStatus>,
    /// Bumped under the `link` lock, read without it
    generation: AtomicU64,
    link: Mutex<LinkState>,
}

/// Single full-duplex connection with reconnection
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.inner.endpoint)
            .field("connector", &self.inner.connector.name())
            .finish()
    }
}

impl Transport {
    pub fn new(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
        policy: &ReconnectPolicy,
        events: EventSink,
    ) -> Self {
        let (status, _) = watch::channel(TransportStatus::default());
        Self {
            inner: Arc::new(Inner {
                endpoint: endpoint.into(),
                connector,
                events,
                status,
                generation: AtomicU64::new(0),
                link: Mutex::new(LinkState {
                    connecting: false,
                    sink: None,
                    reader: None,
                    reconnect: None,
                    backoff: policy.backoff(),
                }),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Current status snapshot
    pub fn status(&self) -> TransportStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<TransportStatus> {
        self.inner.status.subscribe()
    }

    /// Open the channel; a no-op while open or while an attempt is running
    ///
    /// A failed attempt schedules a reconnect before the error is returned.
    pub async fn connect(&self) -> Result<()> {
        let generation = {
            let mut link = self.inner.link.lock().await;
            if link.sink.is_some() || link.connecting {
                tracing::debug!(endpoint = %self.inner.endpoint, "Already connected or connecting");
                return Ok(());
            }
            if let Some(timer) = link.reconnect.take() {
                timer.abort();
            }
            link.connecting = true;
            self.bump_generation()
        };

        self.inner.status.send_modify(|s| {
            s.connecting = true;
        });
        tracing::info!(endpoint = %self.inner.endpoint, generation, "Connecting");

        let result = self.inner.connector.open(&self.inner.endpoint).await;

        let mut link = self.inner.link.lock().await;
        if !self.is_current(generation) {
            // Disconnected while the attempt was in flight
            if let Ok((mut sink, _)) = result {
                let _ = sink.close(CLOSE_NORMAL, "Superseded").await;
            }
            return Ok(());
        }
        link.connecting = false;

        match result {
            Ok((sink, stream)) => {
                link.sink = Some(sink);
                link.backoff.reset();
                self.inner.status.send_modify(|s| {
                    s.connected = true;
                    s.connecting = false;
                    s.last_error = None;
                    s.reconnect_attempts = 0;
                    s.generation = generation;
                });
                tracing::info!(endpoint = %self.inner.endpoint, generation, "Connected");

                (self.inner.events)(TransportEvent::Opened { generation });
                link.reader = Some(self.spawn_reader(generation, stream));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.inner.endpoint, error = %e, "Connection attempt failed");
                self.inner.status.send_modify(|s| {
                    s.connecting = false;
                    s.last_error = Some(e.to_string());
                });
                (self.inner.events)(TransportEvent::Failed(e.to_string()));
                self.schedule_reconnect(&mut link);
                Err(e)
            }
        }
    }

    /// Close the channel and cancel any scheduled reconnect
    ///
    /// With `graceful` a normal close frame is sent first.
    pub async fn disconnect(&self, graceful: bool) {
        let mut link = self.inner.link.lock().await;
        let generation = self.current_generation();
        self.bump_generation();
        link.connecting = false;

        if let Some(timer) = link.reconnect.take() {
            timer.abort();
        }
        if let Some(reader) = link.reader.take() {
            reader.abort();
        }

        let was_open = match link.sink.take() {
            Some(mut sink) => {
                if graceful {
                    if let Err(e) = sink.close(CLOSE_NORMAL, "Client disconnect").await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                }
                true
            }
            None => false,
        };
        link.backoff.reset();
        drop(link);

        self.inner.status.send_modify(|s| {
            s.connected = false;
            s.connecting = false;
            s.reconnect_attempts = 0;
        });

        if was_open {
            tracing::info!(endpoint = %self.inner.endpoint, graceful, "Disconnected");
            (self.inner.events)(TransportEvent::Closed {
                generation,
                code: CLOSE_NORMAL,
                reason: "Client disconnect".to_string(),
                clean: true,
            });
        }
    }

    /// Write one text frame
    pub async fn send(&self, text: String) -> Result<()> {
        let mut link = self.inner.link.lock().await;
        let sink = link.sink.as_mut().ok_or(ClientError::NotConnected)?;
        sink.send_text(text).await.map_err(|e| {
            self.inner.status.send_modify(|s| {
                s.last_error = Some("Failed to send message".to_string());
            });
            e
        })
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.link.lock().await.sink.is_some()
    }

    fn spawn_reader(&self, generation: u64, mut stream: Box<dyn FrameStream>) -> JoinHandle<()> {
        let transport = self.clone();
        tokio::spawn(async move {
            let (code, reason) = loop {
                match stream.next_frame().await {
                    Some(Ok(Frame::Text(text))) => {
                        if !transport.is_current(generation) {
                            return;
                        }
                        (transport.inner.events)(TransportEvent::Frame(text));
                    }
                    Some(Ok(Frame::Close { code, reason })) => break (code, reason),
                    Some(Err(e)) => break (CLOSE_ABNORMAL, e.to_string()),
                    None => break (CLOSE_ABNORMAL, "Connection dropped".to_string()),
                }
            };
            transport.handle_closed(generation, code, reason).await;
        })
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// Start a new generation; callers hold the `link` lock
    fn bump_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn handle_closed(&self, generation: u64, code: u16, reason: String) {
        let mut link = self.inner.link.lock().await;
        if !self.is_current(generation) {
            return;
        }
        link.sink = None;
        // Our own handle; dropping it detaches rather than aborts
        link.reader.take();

        let clean = code == CLOSE_NORMAL;
        tracing::info!(endpoint = %self.inner.endpoint, code, reason = %reason, clean, "Connection closed");

        self.inner.status.send_modify(|s| {
            s.connected = false;
            s.connecting = false;
            if !clean {
                s.last_error = Some("Connection lost. Attempting to reconnect...".to_string());
            }
        });
        (self.inner.events)(TransportEvent::Closed {
            generation,
            code,
            reason,
            clean,
        });

        if !clean {
            self.schedule_reconnect(&mut link);
        }
    }

    fn schedule_reconnect(&self, link: &mut LinkState) {
        let Some(delay) = link.backoff.next_delay() else {
            tracing::warn!(endpoint = %self.inner.endpoint, "Reconnect attempts exhausted");
            self.inner.status.send_modify(|s| {
                s.last_error = Some("Reconnect attempts exhausted".to_string());
            });
            return;
        };

        let attempt = link.backoff.attempt();
        self.inner.status.send_modify(|s| {
            s.reconnect_attempts = attempt;
        });
        tracing::info!(endpoint = %self.inner.endpoint, attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let generation = self.current_generation();
        let transport = self.clone();
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            transport.fire_reconnect(generation).await;
        }));
    }

    async fn fire_reconnect(&self, generation: u64) {
        {
            let mut link = self.inner.link.lock().await;
            if !self.is_current(generation) {
                return;
            }
            // Detach our own handle so connect() does not abort this task
            link.reconnect.take();
        }
        if let Err(e) = self.connect().await {
            tracing::debug!(error = %e, "Reconnect attempt failed");
        }
    }
}
