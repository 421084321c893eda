//! Error types for sshexpect.

use std::io;
use std::time::Duration;

use log::warn;
use thiserror::Error;

/// Main error type for sshexpect operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Shell channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Client lifecycle errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Pattern compilation errors
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),
}

/// Transport layer errors (SSH connection, authentication, PTY setup).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// The configured authentication method name is not recognised
    #[error("Unsupported SSH authentication method: {method:?}")]
    UnsupportedAuthMethod { method: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// SSH agent error
    #[error("SSH agent error: {0}")]
    Agent(String),

    /// Host is not present in known_hosts (strict verification)
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection attempt timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Requesting a pseudo-terminal failed. The channel is closed and the
    /// session disconnected afterwards; `channel_close` and `disconnect`
    /// hold the errors from those steps if they failed too.
    #[error("PTY request failed: {source}{}", teardown_failures(.channel_close, .disconnect))]
    PtyRequest {
        #[source]
        source: russh::Error,
        channel_close: Option<russh::Error>,
        disconnect: Option<russh::Error>,
    },

    /// I/O error on the shell stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn teardown_failures(channel_close: &Option<russh::Error>, disconnect: &Option<russh::Error>) -> String {
    let mut out = String::new();
    if let Some(e) = channel_close {
        out.push_str(&format!("; channel close also failed: {e}"));
    }
    if let Some(e) = disconnect {
        out.push_str(&format!("; disconnect also failed: {e}"));
    }
    out
}

/// Shell channel errors raised while waiting for output.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The remote side closed the stream before a pattern matched
    #[error("Channel closed")]
    Closed,

    /// No pattern matched before the deadline
    #[error("No pattern matched within {after:?}")]
    TimedOut { after: Duration, partial: String },

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled { partial: String },
}

impl ChannelError {
    /// Output accumulated before the operation was interrupted, if any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Self::TimedOut { partial, .. } | Self::Cancelled { partial } => Some(partial),
            Self::Closed => None,
        }
    }
}

/// Client lifecycle errors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Client not connected
    #[error("Session not established - call open() first")]
    NotConnected,

    /// Client already connected
    #[error("Session already established")]
    AlreadyConnected,

    /// Invalid configuration in the client builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Pattern compilation errors.
#[derive(Error, Debug)]
pub enum PatternError {
    /// A pattern is not a valid regular expression
    #[error("Invalid pattern '{name}': {source}")]
    Syntax {
        name: String,
        #[source]
        source: regex::Error,
    },
}

impl PatternError {
    /// Name of the offending pattern.
    pub fn name(&self) -> &str {
        match self {
            Self::Syntax { name, .. } => name,
        }
    }
}

impl Error {
    /// Attach the outcome of disconnecting after a failed shell setup.
    ///
    /// A PTY failure carries the disconnect error itself; for any other
    /// error a failed disconnect is only logged.
    pub(crate) fn with_disconnect(self, outcome: std::result::Result<(), russh::Error>) -> Self {
        match (self, outcome) {
            (
                Error::Transport(TransportError::PtyRequest {
                    source,
                    channel_close,
                    ..
                }),
                outcome,
            ) => TransportError::PtyRequest {
                source,
                channel_close,
                disconnect: outcome.err(),
            }
            .into(),
            (err, Err(e)) => {
                warn!("failed to disconnect after shell setup error: {e}");
                err
            }
            (err, Ok(())) => err,
        }
    }
}

/// Result type alias using sshexpect's Error.
pub type Result<T> = std::result::Result<T, Error>;
