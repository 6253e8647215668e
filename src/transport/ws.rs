//! WebSocket connector backed by tokio-tungstenite

use super::{Connector, Frame, FrameSink, FrameStream};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connect_async(endpoint))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "{}: timed out after {:?}",
                    endpoint, self.connect_timeout
                ))
            })?
            .map_err(|e| ClientError::Connection(format!("{}: {}", endpoint, e)))?;

        tracing::debug!(endpoint = %endpoint, "WebSocket handshake complete");

        let (write, read) = socket.split();
        Ok((Box::new(WsSink { write }), Box::new(WsStream { read })))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

struct WsSink {
    write: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Connection(format!("send failed: {}", e)))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.write
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| ClientError::Connection(format!("close failed: {}", e)))
    }
}

struct WsStream {
    read: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ClientError::Connection(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(Frame::Text(text))),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => {
                        tracing::warn!("Dropping non-UTF-8 binary frame");
                    }
                },
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                        None => (1005, String::new()),
                    };
                    return Some(Ok(Frame::Close { code, reason }));
                }
                // Ping/pong are answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}
