//! In-memory transport for exercising the session loop without sockets.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connection, Connector, Link, TransportError, TransportEvent};

#[derive(Default)]
struct MockState {
    scripted: VecDeque<Result<(), TransportError>>,
    unreachable: bool,
    attempts: usize,
    peers: Vec<MockPeer>,
}

/// Connector whose outcomes are scripted by the test.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` connect attempts fail.
    pub fn fail_next(&self, count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state
                .scripted
                .push_back(Err(TransportError::Connect("connection refused".into())));
        }
    }

    /// Makes every attempt fail until switched back.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Server side of the most recent successful connection.
    pub fn last_peer(&self) -> Option<MockPeer> {
        self.state.lock().peers.last().cloned()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().peers.len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _uri: &str) -> Result<Connection, TransportError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if state.unreachable {
            return Err(TransportError::Connect("host unreachable".into()));
        }
        if let Some(Err(err)) = state.scripted.pop_front() {
            return Err(err);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let peer = MockPeer {
            sent: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
            closed_gracefully: Arc::new(AtomicBool::new(false)),
            events: event_tx,
        };
        state.peers.push(peer.clone());
        Ok(Connection {
            link: Box::new(MockLink { peer }),
            events: event_rx,
        })
    }
}

/// Test handle for the server end of a mock connection.
#[derive(Clone)]
pub struct MockPeer {
    sent: Arc<Mutex<Vec<String>>>,
    open: Arc<AtomicBool>,
    closed_gracefully: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockPeer {
    /// Frames the client has sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn push_frame(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Frame(text.to_string()));
    }

    pub fn disconnect(&self, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self
            .events
            .send(TransportEvent::Disconnected(reason.to_string()));
    }

    /// Closes the link without telling the client, like a half-open socket.
    pub fn vanish(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn closed_gracefully(&self) -> bool {
        self.closed_gracefully.load(Ordering::SeqCst)
    }
}

struct MockLink {
    peer: MockPeer,
}

#[async_trait]
impl Link for MockLink {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        self.peer.sent.lock().push(text.to_string());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.peer.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self, _grace: Duration) {
        if self.peer.open.swap(false, Ordering::SeqCst) {
            self.peer.closed_gracefully.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::tokio_timeout_test(5)]
    async fn scripted_failures_precede_success() {
        let connector = MockConnector::new();
        connector.fail_next(2);
        assert!(connector.connect("ws://mock").await.is_err());
        assert!(connector.connect("ws://mock").await.is_err());
        let mut connection = connector.connect("ws://mock").await.expect("third attempt");
        assert_eq!(connector.attempts(), 3);

        connection.link.send("PING:1").unwrap();
        let peer = connector.last_peer().unwrap();
        assert_eq!(peer.sent(), vec!["PING:1".to_string()]);

        peer.push_frame("pause");
        assert_eq!(
            connection.events.recv().await,
            Some(TransportEvent::Frame("pause".into()))
        );
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn send_after_vanish_reports_not_connected() {
        let connector = MockConnector::new();
        let mut connection = connector.connect("ws://mock").await.unwrap();
        let peer = connector.last_peer().unwrap();
        peer.vanish();
        assert!(!connection.link.is_open());
        assert_eq!(
            connection.link.send("TIMECODE:1.0"),
            Err(TransportError::NotConnected)
        );
        connection.link.close(Duration::from_millis(10)).await;
        assert!(!peer.closed_gracefully());
    }
}
