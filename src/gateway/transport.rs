use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

use super::events::GatewayFrame;
use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One physical connection to the gateway, split into a write half and a
/// read half so the session event loop can select over inbound frames while
/// sending from other arms.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    /// Establish the websocket connection.
    pub async fn open(url: &str) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(ClientError::ConnectFailed)?;
        let (sink, stream) = ws.split();
        Ok(Self {
            sink: FrameSink {
                inner: sink,
                closed: false,
            },
            stream: FrameStream {
                inner: stream,
                closed: false,
            },
        })
    }

    pub fn into_split(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

/// Write half: serializes frames onto the wire.
pub struct FrameSink {
    inner: SplitSink<WsStream, Message>,
    closed: bool,
}

impl FrameSink {
    pub async fn send_frame(&mut self, frame: &GatewayFrame) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(frame)?;
        if let Err(e) = self.inner.send(Message::Text(text.into())).await {
            warn!("gateway send failed: {e}");
            self.closed = true;
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    /// Initiate the close handshake. Best-effort; errors only mean the peer
    /// beat us to it.
    pub async fn close(&mut self, code: u16, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        let _ = self.inner.send(Message::Close(Some(frame))).await;
    }
}

/// Event surfaced by the read half.
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded inbound frame.
    Frame(GatewayFrame),
    /// The connection is gone. `code` is absent when the peer vanished
    /// without a close handshake. Delivered exactly once; afterwards the
    /// stream yields `None`.
    Closed { code: Option<u16>, reason: String },
}

/// Read half: deserializes inbound frames, dropping undecodable ones.
pub struct FrameStream {
    inner: SplitStream<WsStream>,
    closed: bool,
}

impl FrameStream {
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(frame) => return Some(TransportEvent::Frame(frame)),
                    Err(e) => {
                        warn!("{}", ClientError::MalformedFrame(e.to_string()));
                    }
                },
                Some(Ok(Message::Close(close))) => {
                    self.closed = true;
                    let (code, reason) = match close {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Some(TransportEvent::Closed { code, reason });
                }
                // Pings are answered by the protocol layer on the next write.
                Some(Ok(_)) => {}
                Some(Err(e)) => match e {
                    tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Io(_)
                    | tungstenite::Error::Protocol(_) => {
                        warn!("gateway connection lost: {e}");
                        self.closed = true;
                        return Some(TransportEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        });
                    }
                    other => {
                        warn!("gateway transport error: {other}");
                    }
                },
                None => {
                    self.closed = true;
                    return Some(TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }
}
