//! Connection status and per-direction close bookkeeping

use std::fmt::Display;

use log::debug;

use crate::protocol::frame::CloseFrame;

/// Which side of the connection this endpoint plays.
///
/// Fixed for the lifetime of a connection. It decides masking: a client masks
/// every frame it sends and rejects masked frames, a server the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client mode
    Client,
    /// Server mode
    Server,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The upgrade handshake has not completed yet.
    Handshake,
    /// Messages flow in both directions.
    Open,
    /// A close frame was sent or received; the closing handshake is in progress.
    Closing,
    /// The closing handshake finished and the transport was torn down.
    Closed,
    /// A protocol violation or transport error ended the connection.
    Failed,
}

impl Status {
    /// `Closed` or `Failed`. No further I/O is issued in either.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Closed | Status::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Status::Handshake => 0,
            Status::Open => 1,
            Status::Closing => 2,
            Status::Closed | Status::Failed => 3,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Handshake => "handshake",
            Status::Open => "open",
            Status::Closing => "closing",
            Status::Closed => "closed",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Authoritative state of one connection.
#[derive(Debug)]
pub(crate) struct ConnectionState {
    role: Role,
    status: Status,
    /// Our close frame went out (or is being sent).
    pub(crate) wr_close: bool,
    /// The peer's close frame was read.
    pub(crate) rd_close: bool,
    /// What the peer sent in its close frame, if anything.
    pub(crate) close_reason: Option<CloseFrame>,
}

impl ConnectionState {
    pub(crate) fn new(role: Role, status: Status) -> Self {
        ConnectionState { role, status, wr_close: false, rd_close: false, close_reason: None }
    }

    #[inline]
    pub(crate) fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub(crate) fn status(&self) -> Status {
        self.status
    }

    /// Move forward in the lifecycle.
    ///
    /// Transitions only ever go forward; once terminal the status is frozen, so a
    /// late attempt to overwrite `Closed` with `Failed` (or back) is ignored.
    pub(crate) fn transition(&mut self, next: Status) {
        if self.status.is_terminal() || next.rank() < self.status.rank() || next == self.status {
            return;
        }
        debug!("{} connection {} -> {}", self.role, self.status, next);
        self.status = next;
    }

    /// Finish the connection after a teardown attempt.
    pub(crate) fn finish(&mut self, ok: bool) {
        self.transition(if ok { Status::Closed } else { Status::Failed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_monotonic() {
        let mut state = ConnectionState::new(Role::Client, Status::Handshake);
        state.transition(Status::Open);
        state.transition(Status::Closing);
        state.transition(Status::Open);
        assert_eq!(state.status(), Status::Closing);

        state.finish(true);
        assert_eq!(state.status(), Status::Closed);
        state.finish(false);
        assert_eq!(state.status(), Status::Closed);
    }

    #[test]
    fn failure_may_skip_closing() {
        let mut state = ConnectionState::new(Role::Server, Status::Open);
        state.transition(Status::Failed);
        assert_eq!(state.status(), Status::Failed);
        state.transition(Status::Closed);
        assert_eq!(state.status(), Status::Failed);
    }
}
