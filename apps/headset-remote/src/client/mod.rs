//! The long-lived control session.
//!
//! [`SessionRunner`] owns the socket, the reconnect supervisor and the
//! playback controller, and multiplexes them on a single task. Everything
//! outside the task talks to it through a [`SessionHandle`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use remote_proto::{OutboundFrame, decode_frame};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::config::{Config, SessionTiming};
use crate::controller::{PlaybackState, SessionController};
use crate::device::ClientInfoSource;
use crate::restriction::RestrictionSignal;
use crate::session::Session;
use crate::supervisor::{FailureOutcome, ReconnectSupervisor, RetryOutcome};
use crate::transport::{Connector, Link, TransportEvent};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("session loop has stopped")]
pub struct SessionClosed;

enum ControlRequest {
    Retry(oneshot::Sender<RetryOutcome>),
    Shutdown,
}

enum Step {
    Control(Option<ControlRequest>),
    Reconnect,
    Event(Option<TransportEvent>),
    Tick,
    Probe,
}

/// Cloneable front for a running [`SessionRunner`].
#[derive(Clone)]
pub struct SessionHandle {
    control: mpsc::UnboundedSender<ControlRequest>,
    status: watch::Receiver<Session>,
    playback: watch::Receiver<PlaybackState>,
    restriction: watch::Receiver<RestrictionSignal>,
}

impl SessionHandle {
    /// Manual connection test. Resets an exhausted supervisor and skips any
    /// pending backoff wait.
    pub async fn retry(&self) -> Result<RetryOutcome, SessionClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(ControlRequest::Retry(reply_tx))
            .map_err(|_| SessionClosed)?;
        reply_rx.await.map_err(|_| SessionClosed)
    }

    /// Requests a graceful close. Returns immediately; await the runner's
    /// join handle to wait for completion.
    pub fn shutdown(&self) {
        let _ = self.control.send(ControlRequest::Shutdown);
    }

    pub fn status(&self) -> watch::Receiver<Session> {
        self.status.clone()
    }

    pub fn playback(&self) -> watch::Receiver<PlaybackState> {
        self.playback.clone()
    }

    pub fn restriction(&self) -> watch::Receiver<RestrictionSignal> {
        self.restriction.clone()
    }
}

pub struct SessionRunner<C: Connector> {
    connector: C,
    server: String,
    timing: SessionTiming,
    supervisor: ReconnectSupervisor,
    controller: SessionController,
    device: Box<dyn ClientInfoSource>,
    session: Session,
    status: watch::Sender<Session>,
    control: mpsc::UnboundedReceiver<ControlRequest>,
    link: Option<Box<dyn Link>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    reconnect_at: Option<Instant>,
}

impl<C: Connector + 'static> SessionRunner<C> {
    pub fn new(
        connector: C,
        config: &Config,
        controller: SessionController,
        device: Box<dyn ClientInfoSource>,
    ) -> (Self, SessionHandle) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Session::new());
        let handle = SessionHandle {
            control: control_tx,
            status: status_rx,
            playback: controller.subscribe_playback(),
            restriction: controller.subscribe_restriction(),
        };
        let runner = Self {
            connector,
            server: config.server.clone(),
            timing: config.timing.clone(),
            supervisor: ReconnectSupervisor::new(config.backoff.clone()),
            controller,
            device,
            session: Session::new(),
            status: status_tx,
            control: control_rx,
            link: None,
            events: None,
            reconnect_at: None,
        };
        (runner, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connects, then serves commands until shutdown is requested or every
    /// handle is dropped.
    pub async fn run(mut self) {
        info!(
            target = "headset_remote::client",
            server = %self.server,
            max_attempts = self.supervisor.policy().max_attempts,
            "starting control session"
        );
        self.connect_now().await;

        let mut tick = interval(self.timing.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probe = interval_at(
            Instant::now() + self.timing.probe_interval,
            self.timing.probe_interval,
        );
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                request = self.control.recv() => Step::Control(request),
                _ = wait_until(self.reconnect_at) => Step::Reconnect,
                event = next_event(&mut self.events) => Step::Event(event),
                _ = tick.tick() => Step::Tick,
                _ = probe.tick() => Step::Probe,
            };

            match step {
                Step::Control(Some(ControlRequest::Retry(reply))) => {
                    let outcome = self.retry().await;
                    let _ = reply.send(outcome);
                }
                Step::Control(Some(ControlRequest::Shutdown)) | Step::Control(None) => break,
                Step::Reconnect => {
                    self.reconnect_at = None;
                    self.connect_now().await;
                }
                Step::Event(Some(event)) => self.on_event(event),
                Step::Event(None) => self.on_link_lost("event stream closed".to_string()),
                Step::Tick => self.on_tick(),
                Step::Probe => self.probe(),
            }
        }

        self.shutdown().await;
    }

    async fn connect_now(&mut self) {
        if !self.supervisor.begin_attempt() {
            return;
        }
        self.session.begin_connect();
        self.publish();
        debug!(
            target = "headset_remote::client",
            server = %self.server,
            attempt = self.supervisor.failures() + 1,
            "connecting"
        );

        match self.connector.connect(&self.server).await {
            Ok(connection) => {
                self.supervisor.on_connected();
                self.session.mark_connected();
                self.link = Some(connection.link);
                self.events = Some(connection.events);
                self.publish();
                info!(target = "headset_remote::client", server = %self.server, "connected");

                let announce = self.controller.on_connected(self.device.client_info());
                self.transmit(&announce);
            }
            Err(err) => {
                warn!(
                    target = "headset_remote::client",
                    server = %self.server,
                    error = %err,
                    "connect failed"
                );
                self.on_link_lost(err.to_string());
            }
        }
    }

    fn on_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => {
                trace!(target = "headset_remote::client", frame = %text, "frame received");
                if let Some(command) = decode_frame(&text) {
                    self.controller.apply(command, Instant::now().into_std());
                }
            }
            TransportEvent::Disconnected(reason) => {
                info!(target = "headset_remote::client", %reason, "server disconnected");
                self.on_link_lost(reason);
            }
            TransportEvent::Error(reason) => {
                warn!(target = "headset_remote::client", %reason, "transport error");
                self.on_link_lost(reason);
            }
        }
    }

    /// Drops the current link and lets the supervisor decide what follows.
    fn on_link_lost(&mut self, reason: String) {
        self.link = None;
        self.events = None;

        match self.supervisor.on_failure(&reason) {
            FailureOutcome::Ignored => return,
            FailureOutcome::Retry { attempt, delay } => {
                self.session.mark_backoff(attempt, reason);
                self.reconnect_at = Some(Instant::now() + delay);
            }
            FailureOutcome::Exhausted { attempts } => {
                self.session.mark_exhausted(attempts, reason);
                self.reconnect_at = None;
            }
        }
        self.publish();
    }

    async fn retry(&mut self) -> RetryOutcome {
        let outcome = self.supervisor.retry();
        info!(target = "headset_remote::client", ?outcome, "manual retry");
        if outcome == RetryOutcome::Started {
            if self.supervisor.failures() == 0 {
                self.session.reset_attempts();
            }
            self.reconnect_at = None;
            self.connect_now().await;
        }
        outcome
    }

    fn on_tick(&mut self) {
        if let Some(report) = self.controller.tick(Instant::now().into_std()) {
            self.transmit(&report);
        }
    }

    /// Liveness check; a closed or unwritable link counts as a disconnect.
    fn probe(&mut self) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        if !link.is_open() {
            self.on_link_lost("liveness probe found the link closed".to_string());
            return;
        }
        self.transmit(&OutboundFrame::Ping(probe_token()));
    }

    fn transmit(&mut self, frame: &OutboundFrame) {
        let Some(link) = self.link.as_ref() else {
            debug!(
                target = "headset_remote::client",
                kind = frame.kind(),
                "dropping frame while disconnected"
            );
            return;
        };
        let text = frame.to_string();
        match link.send(&text) {
            Ok(()) => trace!(target = "headset_remote::client", frame = %text, "frame sent"),
            Err(err) => {
                warn!(
                    target = "headset_remote::client",
                    kind = frame.kind(),
                    error = %err,
                    "send failed"
                );
                self.on_link_lost(err.to_string());
            }
        }
    }

    async fn shutdown(&mut self) {
        self.supervisor.stop();
        self.reconnect_at = None;
        self.events = None;
        if let Some(mut link) = self.link.take() {
            link.close(self.timing.close_grace).await;
        }
        self.session.mark_disconnected();
        self.publish();
        info!(target = "headset_remote::client", "control session closed");
    }

    fn publish(&self) {
        self.status.send_replace(self.session.clone());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

fn probe_token() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
        .to_string()
}
