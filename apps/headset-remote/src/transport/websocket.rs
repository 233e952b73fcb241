use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

use super::{Connection, Connector, Link, TransportError, TransportEvent, parse_control_uri};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outgoing {
    Text(String),
    Close,
}

/// Opens WebSocket links to the control server.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, uri: &str) -> Result<Connection, TransportError> {
        let url = parse_control_uri(uri)?;
        let socket = match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
        {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(err)) => return Err(TransportError::Connect(err.to_string())),
            Err(_) => return Err(TransportError::Timeout(self.connect_timeout)),
        };
        debug!(target = "headset_remote::transport", %url, "websocket connected");
        Ok(WebSocketLink::spawn(socket))
    }
}

/// Open WebSocket connection driven by a reader and a writer task.
pub struct WebSocketLink {
    outbound: mpsc::UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl WebSocketLink {
    fn spawn(socket: Socket) -> Connection {
        let (sink, stream) = socket.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(write_loop(sink, out_rx, open.clone()));
        let reader = tokio::spawn(read_loop(stream, event_tx, open.clone()));

        Connection {
            link: Box::new(Self {
                outbound: out_tx,
                open,
                reader: Some(reader),
                writer: Some(writer),
            }),
            events: event_rx,
        }
    }
}

#[async_trait]
impl Link for WebSocketLink {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(Outgoing::Text(text.to_string()))
            .map_err(|_| {
                self.open.store(false, Ordering::SeqCst);
                TransportError::NotConnected
            })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self, grace: Duration) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Outgoing::Close);

        if let Some(writer) = self.writer.take() {
            let abort = writer.abort_handle();
            if tokio::time::timeout(grace, writer).await.is_err() {
                debug!(
                    target = "headset_remote::transport",
                    ?grace,
                    "graceful close timed out; dropping socket"
                );
                abort.abort();
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        if let Some(task) = self.writer.take() {
            task.abort();
        }
        if let Some(task) = self.reader.take() {
            task.abort();
        }
    }
}

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<Socket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
    open: Arc<AtomicBool>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outgoing::Text(text) => {
                trace!(target = "headset_remote::transport", frame = %text, "send");
                if let Err(err) = sink.send(Message::Text(text)).await {
                    debug!(
                        target = "headset_remote::transport",
                        error = %err,
                        "websocket write failed"
                    );
                    open.store(false, Ordering::SeqCst);
                    break;
                }
            }
            Outgoing::Close => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                break;
            }
        }
    }
}

async fn read_loop(
    mut stream: futures_util::stream::SplitStream<Socket>,
    events: mpsc::UnboundedSender<TransportEvent>,
    open: Arc<AtomicBool>,
) {
    let terminal = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!(target = "headset_remote::transport", frame = %text, "recv");
                if events.send(TransportEvent::Frame(text)).is_err() {
                    return;
                }
            }
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => {
                    if events.send(TransportEvent::Frame(text)).is_err() {
                        return;
                    }
                }
                Err(_) => warn!(
                    target = "headset_remote::transport",
                    "dropping non-utf8 binary frame"
                ),
            },
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|frame| format!("closed by server ({}): {}", frame.code, frame.reason))
                    .unwrap_or_else(|| "closed by server".to_string());
                break TransportEvent::Disconnected(reason);
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => break TransportEvent::Error(err.to_string()),
            None => break TransportEvent::Disconnected("stream ended".to_string()),
        }
    };
    open.store(false, Ordering::SeqCst);
    let _ = events.send(terminal);
}
