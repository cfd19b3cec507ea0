use std::fmt;

use tracing::{debug, warn};

/// Which socket endpoint a session was opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Chat,
    Notification,
}

impl StreamKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Notification => "notification",
        }
    }

    /// Metrics endpoint label for inbound entries on this stream.
    pub const fn entry_endpoint(self) -> &'static str {
        match self {
            Self::Chat => "chat_entry",
            Self::Notification => "notification_entry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Joined,
    Streaming,
    AuthFailed,
    JoinRejected,
    ProtocolError,
    Closed,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticated => "authenticated",
            Self::Joined => "joined",
            Self::Streaming => "streaming",
            Self::AuthFailed => "auth_failed",
            Self::JoinRejected => "join_rejected",
            Self::ProtocolError => "protocol_error",
            Self::Closed => "closed",
        }
    }

    /// Error states emit one error frame and then close.
    pub const fn is_error(self) -> bool {
        matches!(self, Self::AuthFailed | Self::JoinRejected | Self::ProtocolError)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Authenticated)
                | (Self::Connecting, Self::AuthFailed)
                | (Self::Authenticated, Self::Joined)
                | (Self::Authenticated, Self::JoinRejected)
                | (Self::Joined, Self::Streaming)
                | (Self::Streaming, Self::ProtocolError)
                | (Self::AuthFailed, Self::Closed)
                | (Self::JoinRejected, Self::Closed)
                | (Self::ProtocolError, Self::Closed)
                | (Self::Connecting, Self::Closed)
                | (Self::Authenticated, Self::Closed)
                | (Self::Joined, Self::Closed)
                | (Self::Streaming, Self::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid socket session transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Lifecycle of one socket connection.
#[derive(Debug)]
pub struct SocketSession {
    stream: StreamKind,
    state: SessionState,
}

impl SocketSession {
    pub fn new(stream: StreamKind) -> Self {
        Self { stream, state: SessionState::Connecting }
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn advance(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition { from: self.state, to: next });
        }

        debug!(stream = self.stream.as_str(), from = %self.state, to = %next, "socket session transition");
        self.state = next;
        Ok(())
    }

    /// Moves to `next`, logging instead of failing on an illegal step.
    pub fn step(&mut self, next: SessionState) {
        if let Err(error) = self.advance(next) {
            warn!(stream = self.stream.as_str(), error = %error, "ignored socket session transition");
        }
    }

    /// Terminal step; valid from every state except `Closed`.
    pub fn close(&mut self) {
        if !self.is_closed() {
            self.step(SessionState::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InvalidTransition, SessionState, SocketSession, StreamKind};

    #[test]
    fn happy_path_reaches_streaming_then_closed() {
        let mut session = SocketSession::new(StreamKind::Chat);

        for next in [
            SessionState::Authenticated,
            SessionState::Joined,
            SessionState::Streaming,
            SessionState::Closed,
        ] {
            session.advance(next).expect("happy path transition");
        }

        assert!(session.is_closed());
    }

    #[test]
    fn gates_cannot_be_skipped() {
        let mut session = SocketSession::new(StreamKind::Chat);

        assert_eq!(
            session.advance(SessionState::Streaming),
            Err(InvalidTransition { from: SessionState::Connecting, to: SessionState::Streaming })
        );
        assert_eq!(session.state(), SessionState::Connecting);

        session.advance(SessionState::Authenticated).expect("auth");
        assert!(session.advance(SessionState::Streaming).is_err());
    }

    #[test]
    fn error_states_only_lead_to_closed() {
        for (setup, error_state) in [
            (vec![], SessionState::AuthFailed),
            (vec![SessionState::Authenticated], SessionState::JoinRejected),
            (
                vec![SessionState::Authenticated, SessionState::Joined, SessionState::Streaming],
                SessionState::ProtocolError,
            ),
        ] {
            let mut session = SocketSession::new(StreamKind::Notification);
            for state in setup {
                session.advance(state).expect("setup transition");
            }
            session.advance(error_state).expect("error transition");
            assert!(session.state().is_error());

            assert!(session.advance(SessionState::Streaming).is_err());
            session.advance(SessionState::Closed).expect("error states close");
        }
    }

    #[test]
    fn closed_is_terminal_and_close_is_idempotent() {
        let mut session = SocketSession::new(StreamKind::Chat);
        session.close();
        session.close();

        assert!(session.is_closed());
        assert!(session.advance(SessionState::Authenticated).is_err());
    }

    #[test]
    fn stream_labels() {
        assert_eq!(StreamKind::Chat.as_str(), "chat");
        assert_eq!(StreamKind::Notification.entry_endpoint(), "notification_entry");
    }
}
