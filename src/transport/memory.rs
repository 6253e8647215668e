//! In-process connector for testing and single-process use
//!
//! Records every open attempt and outbound frame, and lets the caller play
//! the backend: inject inbound frames, close cleanly or abnormally, and
//! refuse upcoming connection attempts.

use super::{Connector, Frame, FrameSink, FrameStream};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct MemoryState {
    attempts: usize,
    refuse_next: usize,
    sent: Vec<String>,
    client_closes: Vec<u16>,
    inbound: Option<mpsc::UnboundedSender<Frame>>,
}

/// Connector whose "server" is driven by the test
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the recorded frames
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of `open` calls so far
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: usize) {
        self.lock().refuse_next = n;
    }

    /// Whether a channel is currently open
    pub fn is_open(&self) -> bool {
        self.lock().inbound.is_some()
    }

    /// Raw outbound text frames, in send order
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Outbound frames parsed as JSON
    pub fn sent_envelopes(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// Outbound envelopes with the given `type`
    pub fn sent_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent_envelopes()
            .into_iter()
            .filter(|value| value["type"] == kind)
            .collect()
    }

    /// Close codes sent by the client
    pub fn client_closes(&self) -> Vec<u16> {
        self.lock().client_closes.clone()
    }

    /// Deliver a text frame to the client; `false` if nothing is open
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        match &self.lock().inbound {
            Some(tx) => tx.send(Frame::Text(text.into())).is_ok(),
            None => false,
        }
    }

    /// Deliver a JSON envelope to the client
    pub fn push_json(&self, value: serde_json::Value) -> bool {
        self.push_text(value.to_string())
    }

    /// Server-initiated close with a code
    pub fn close_with(&self, code: u16, reason: &str) {
        let inbound = self.lock().inbound.take();
        if let Some(tx) = inbound {
            let _ = tx.send(Frame::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }

    /// Drop the channel without a close frame
    pub fn drop_connection(&self) {
        self.lock().inbound.take();
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, endpoint: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(ClientError::Connection(format!("{}: connection refused", endpoint)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.inbound = Some(tx);

        let sink = MemorySink {
            state: Arc::clone(&self.state),
        };
        Ok((Box::new(sink), Box::new(MemoryStream { rx })))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let mut state = self.lock();
        if state.inbound.is_none() {
            return Err(ClientError::Closed);
        }
        state.sent.push(text);
        Ok(())
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<()> {
        let mut state = self.lock();
        state.client_closes.push(code);
        state.inbound = None;
        Ok(())
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.rx.recv().await.map(Ok)
    }
}
