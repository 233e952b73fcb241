//! Minimal control server for driving the headset client over real sockets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, oneshot};
use tokio::time::timeout;

/// Marker pushed into the frame log when a client sends a close frame.
pub const CLOSE_MARKER: &str = "<close>";

#[derive(Clone, Debug)]
enum ServerCommand {
    Send(String),
    Close,
}

#[derive(Clone)]
struct AppState {
    frames: mpsc::UnboundedSender<String>,
    commands: broadcast::Sender<ServerCommand>,
    connections: Arc<AtomicUsize>,
}

pub struct ControlServer {
    pub addr: SocketAddr,
    frames: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    commands: broadcast::Sender<ServerCommand>,
    connections: Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ControlServer {
    pub async fn start() -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (commands, _) = broadcast::channel(32);
        let connections = Arc::new(AtomicUsize::new(0));
        let state = AppState {
            frames: frames_tx,
            commands: commands.clone(),
            connections: connections.clone(),
        };
        let router = Router::new()
            .route("/", get(ws_handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener bind");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            frames: AsyncMutex::new(frames_rx),
            commands,
            connections,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn uri(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sends a text frame to every connected client.
    pub fn send(&self, text: &str) {
        let _ = self.commands.send(ServerCommand::Send(text.to_string()));
    }

    /// Closes every client connection from the server side.
    pub fn close_clients(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }

    /// Next frame received from any client.
    pub async fn next_frame(&self) -> String {
        let mut frames = self.frames.lock().await;
        timeout(Duration::from_secs(5), frames.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server frame channel closed")
    }

    /// Skips frames until one matches, e.g. past periodic pings.
    pub async fn frame_matching(&self, predicate: impl Fn(&str) -> bool) -> String {
        loop {
            let frame = self.next_frame().await;
            if predicate(&frame) {
                return frame;
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let mut commands = state.commands.subscribe();
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = state.frames.send(text);
                }
                Some(Ok(WsMessage::Close(_))) => {
                    let _ = state.frames.send(CLOSE_MARKER.to_string());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            command = commands.recv() => match command {
                Ok(ServerCommand::Send(text)) => {
                    if sink.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(ServerCommand::Close) => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
                Err(_) => break,
            },
        }
    }
}
