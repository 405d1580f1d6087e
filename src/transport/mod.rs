//! Duplex message channel to the conversation backend.

pub mod protocol;

pub use protocol::{ClientMessage, ServerMessage};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn};
use url::Url;

const EVENT_BUFFER: usize = 32;
const OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("channel closed")]
    Closed,
}

/// Events produced by a channel until it terminates.
///
/// `Closed` and `Failed` are terminal; at most one of them is emitted per
/// connection.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Message(ServerMessage),
    Closed,
    Failed(String),
}

#[async_trait]
pub trait Channel: Send + Sync {
    /// Queue a message for delivery. Messages are sent in call order; anything
    /// still in flight when the connection dies is dropped without retry.
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self);
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn Channel>, mpsc::Receiver<ChannelEvent>), TransportError>;
}

enum WriterCommand {
    Send(ClientMessage),
    Close,
}

/// WebSocket-backed channel. A writer task preserves FIFO ordering of sends; a
/// reader task decodes inbound frames and emits exactly one terminal event.
pub struct WsChannel {
    outbound_tx: mpsc::Sender<WriterCommand>,
}

impl WsChannel {
    pub async fn connect(
        url: &str,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ChannelEvent>), TransportError> {
        let parsed = Url::parse(url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let (stream, _) = connect_async(parsed.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<WriterCommand>(OUTBOUND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel::<ChannelEvent>(EVENT_BUFFER);

        tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                match command {
                    WriterCommand::Send(message) => {
                        let encoded = match serde_json::to_string(&message) {
                            Ok(encoded) => encoded,
                            Err(err) => {
                                warn!(target: "ws_transport", %err, "failed to encode outbound message");
                                continue;
                            }
                        };
                        if let Err(err) = sink.send(Message::Text(encoded)).await {
                            warn!(target: "ws_transport", %err, "websocket send failed, dropping outbound queue");
                            break;
                        }
                    }
                    WriterCommand::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if events_tx.send(ChannelEvent::Message(message)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(target: "ws_transport", %err, "skipping malformed inbound frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events_tx.send(ChannelEvent::Closed).await;
                        break;
                    }
                    Some(Ok(other)) => {
                        debug!(target: "ws_transport", kind = ?other, "ignoring non-text frame");
                    }
                    Some(Err(err)) => {
                        let _ = events_tx.send(ChannelEvent::Failed(err.to_string())).await;
                        break;
                    }
                }
            }
        });

        Ok((Arc::new(Self { outbound_tx }), events_rx))
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.outbound_tx
            .send(WriterCommand::Send(message))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        let _ = self.outbound_tx.send(WriterCommand::Close).await;
    }
}

/// Default connector used outside of tests.
#[derive(Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn Channel>, mpsc::Receiver<ChannelEvent>), TransportError> {
        let (channel, events) = WsChannel::connect(url).await?;
        Ok((channel, events))
    }
}
