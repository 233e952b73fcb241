//! Reconnection bookkeeping for the control session.
//!
//! The supervisor is a plain state machine: it decides *whether* and *when*
//! to reconnect, while the session loop owns the sleeping and the socket.
//! Keeping it free of I/O makes the backoff schedule directly testable.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

mod backoff;

pub use backoff::BackoffPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SupervisorState {
    Idle,
    Connecting,
    Connected,
    Backoff { attempt: u32, delay_ms: u64 },
    Exhausted,
}

/// What the session loop should do after a connectivity failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// A reconnect is already scheduled or the supervisor has given up.
    Ignored,
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    Started,
    AlreadyConnected,
    AlreadyConnecting,
}

#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    policy: BackoffPolicy,
    state: SupervisorState,
    failures: u32,
}

impl ReconnectSupervisor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: SupervisorState::Idle,
            failures: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Consecutive failures since the last successful connect.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == SupervisorState::Exhausted
    }

    /// Marks the start of a connect attempt. Refused once exhausted.
    pub fn begin_attempt(&mut self) -> bool {
        if self.is_exhausted() {
            debug!(
                target = "headset_remote::supervisor",
                "connect attempt refused; supervisor exhausted"
            );
            return false;
        }
        self.state = SupervisorState::Connecting;
        true
    }

    pub fn on_connected(&mut self) {
        if self.failures > 0 {
            info!(
                target = "headset_remote::supervisor",
                failures = self.failures,
                "reconnected"
            );
        }
        self.failures = 0;
        self.state = SupervisorState::Connected;
    }

    /// Records a disconnect, transport error, failed connect or failed probe.
    pub fn on_failure(&mut self, reason: &str) -> FailureOutcome {
        match self.state {
            SupervisorState::Backoff { .. } | SupervisorState::Exhausted | SupervisorState::Idle => {
                debug!(
                    target = "headset_remote::supervisor",
                    state = ?self.state,
                    reason,
                    "ignoring failure outside an active connection"
                );
                return FailureOutcome::Ignored;
            }
            SupervisorState::Connecting | SupervisorState::Connected => {}
        }

        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.policy.max_attempts {
            self.state = SupervisorState::Exhausted;
            error!(
                target = "headset_remote::supervisor",
                attempts = self.failures,
                reason,
                "reconnect attempts exhausted; waiting for manual retry"
            );
            return FailureOutcome::Exhausted {
                attempts: self.failures,
            };
        }

        let delay = self.policy.delay_for(self.failures);
        self.state = SupervisorState::Backoff {
            attempt: self.failures,
            delay_ms: delay.as_millis() as u64,
        };
        warn!(
            target = "headset_remote::supervisor",
            attempt = self.failures,
            max_attempts = self.policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            reason,
            "connection lost; backing off"
        );
        FailureOutcome::Retry {
            attempt: self.failures,
            delay,
        }
    }

    /// Manual "test connection" trigger.
    ///
    /// Leaves `Exhausted` with a fresh attempt budget, or cuts a running
    /// backoff short without touching the failure count.
    pub fn retry(&mut self) -> RetryOutcome {
        match self.state {
            SupervisorState::Connected => RetryOutcome::AlreadyConnected,
            SupervisorState::Connecting => RetryOutcome::AlreadyConnecting,
            SupervisorState::Exhausted => {
                info!(
                    target = "headset_remote::supervisor",
                    "manual retry after exhaustion"
                );
                self.failures = 0;
                self.state = SupervisorState::Idle;
                RetryOutcome::Started
            }
            SupervisorState::Backoff { .. } | SupervisorState::Idle => RetryOutcome::Started,
        }
    }

    /// Closes the session for good; later failures are ignored.
    pub fn stop(&mut self) {
        self.state = SupervisorState::Idle;
    }
}
