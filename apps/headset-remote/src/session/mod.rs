use serde::Serialize;

/// Connection phase of the control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Automatic reconnection gave up; only an explicit retry leaves this state.
    Exhausted,
}

/// Logical client-to-server control connection, independent of any single
/// socket. Published to observers as a snapshot after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Session {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub(crate) fn begin_connect(&mut self) {
        self.state = if self.reconnect_attempts == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        };
    }

    pub(crate) fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.last_error = None;
    }

    pub(crate) fn mark_backoff(&mut self, attempts: u32, reason: String) {
        self.state = ConnectionState::Reconnecting;
        self.reconnect_attempts = attempts;
        self.last_error = Some(reason);
    }

    pub(crate) fn mark_exhausted(&mut self, attempts: u32, reason: String) {
        self.state = ConnectionState::Exhausted;
        self.reconnect_attempts = attempts;
        self.last_error = Some(reason);
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub(crate) fn reset_attempts(&mut self) {
        self.reconnect_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_connect_resets_attempts_and_error() {
        let mut session = Session::new();
        session.mark_backoff(3, "connection refused".into());
        session.begin_connect();
        assert_eq!(session.state, ConnectionState::Reconnecting);

        session.mark_connected();
        assert!(session.is_connected());
        assert_eq!(session.reconnect_attempts, 0);
        assert_eq!(session.last_error, None);
    }

    #[test]
    fn first_connect_reports_connecting() {
        let mut session = Session::new();
        session.begin_connect();
        assert_eq!(session.state, ConnectionState::Connecting);
    }

    #[test]
    fn snapshot_serializes_state_in_snake_case() {
        let mut session = Session::new();
        session.mark_exhausted(10, "host unreachable".into());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["state"], "exhausted");
        assert_eq!(json["reconnect_attempts"], 10);
    }
}
