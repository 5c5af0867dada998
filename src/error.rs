use std::{io, path::PathBuf};

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum CommitDbError {
    /// Opening the TCP connection failed (refused, unreachable or timed out).
    #[error("failed to connect to {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: io::Error,
    },
    /// The embedded library could not be loaded or initialised.
    #[error("failed to load embedded library {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
    /// The peer closed the stream before a full response line arrived.
    #[error("connection closed by server while waiting for a reply to '{command}'")]
    ConnectionClosed { command: String },
    /// I/O failure on an already open transport (reset, read deadline).
    #[error("transport error during '{command}': {source}")]
    Transport {
        command: String,
        #[source]
        source: io::Error,
    },
    /// Response bytes were not a well-formed envelope.
    #[error("invalid response from server: {message}")]
    Protocol { command: String, message: String },
    /// The server answered with `success = false`.
    ///
    /// `message` is the server's `error` text, unmodified.
    #[error("{message}")]
    Server { command: String, message: String },
    /// The caller misused the session.
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl CommitDbError {
    /// Returns `true` when the server itself rejected the command.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// Server-side error text, if this is a [`CommitDbError::Server`].
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The command that was being executed when the error occurred.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::ConnectionClosed { command }
            | Self::Transport { command, .. }
            | Self::Protocol { command, .. }
            | Self::Server { command, .. } => Some(command),
            Self::Usage(UsageError::MergePending { command }) => Some(command),
            _ => None,
        }
    }
}

/// Ways a caller can misuse a [`Session`](crate::Session).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("not connected: call open() first")]
    NotConnected,
    #[error("session is already open")]
    AlreadyOpen,
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },
    #[error("expected {expected} result, got {actual} result")]
    UnexpectedResult {
        expected: &'static str,
        actual: &'static str,
    },
    /// Refused locally because a manual merge is still open.
    #[error("'{command}' is refused while a merge is pending; COMMIT or ABORT it first")]
    MergePending { command: String },
}
