//! Error kinds for the control-channel session.
//!
//! Authentication failures are fatal to the session and never retried here;
//! the caller decides whether to reconnect. Malformed datagrams are not
//! errors at this level since the session drops them locally.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RconError {
    /// The server rejected the rcon password.
    #[error("bad rcon password")]
    BadPassword,

    /// The server rejected our challenge id.
    #[error("bad challenge")]
    BadChallenge,

    /// The session was torn down while the command was outstanding.
    #[error("session closed")]
    SessionClosed,

    /// No reply arrived for the queue head within the deadline. The command
    /// was dropped so later commands can still complete.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The peer sent something the protocol cannot account for.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
