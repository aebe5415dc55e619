use std::fmt;

use tokio_tungstenite::tungstenite;

#[derive(Debug)]
pub enum ClientError {
    /// The transport could not establish a connection. Retried per ReconnectPolicy.
    ConnectFailed(tungstenite::Error),
    /// Inbound data that could not be decoded. Dropped and logged, never fatal.
    MalformedFrame(String),
    /// A send was attempted while the connection is closed.
    NotConnected,
    /// The reconnect budget is spent. Fatal for this session.
    ReconnectExhausted { attempts: u32 },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::ConnectFailed(e) => write!(f, "failed to connect to gateway: {e}"),
            ClientError::MalformedFrame(msg) => write!(f, "malformed gateway frame: {msg}"),
            ClientError::NotConnected => write!(f, "gateway connection is closed"),
            ClientError::ReconnectExhausted { attempts } => {
                write!(f, "gave up reconnecting after {attempts} attempts")
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::MalformedFrame(e.to_string())
    }
}
