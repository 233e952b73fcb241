use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub mod mock;
pub mod websocket;

pub use websocket::{WebSocketConnector, WebSocketLink};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid control uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport not connected")]
    NotConnected,
}

/// Lifecycle and data events produced by an open link.
///
/// `Connected` has no variant here: a successful [`Connector::connect`] is the
/// connected event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Disconnected(String),
    Error(String),
}

/// One open control connection.
#[async_trait]
pub trait Link: Send {
    /// Queues a text frame. Best effort, no acknowledgement.
    fn send(&self, text: &str) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Attempts a graceful close for at most `grace`, then releases the socket
    /// regardless of the outcome.
    async fn close(&mut self, grace: Duration);
}

pub struct Connection {
    pub link: Box<dyn Link>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Connection, TransportError>;
}

/// Validates a `ws://host:port[/path]` control endpoint.
pub fn parse_control_uri(uri: &str) -> Result<Url, TransportError> {
    let invalid = |reason: &str| TransportError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(uri).map_err(|err| invalid(&err.to_string()))?;
    match url.scheme() {
        "ws" => {}
        "wss" => return Err(invalid("tls endpoints are not supported")),
        _ => return Err(invalid("expected ws:// scheme")),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}
