//! Error types for the gateway.

use std::io;
use std::path::PathBuf;

use lightmanager_protocol::ProtocolError;
use thiserror::Error;

/// Errors reported by a [`DeviceIo`](crate::device::DeviceIo) backend for a
/// single transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceIoError {
    /// The transfer did not complete within its timeout.
    #[error("transfer timed out")]
    Timeout,

    /// Fewer than 8 bytes were transferred.
    #[error("short transfer ({0} of 8 bytes)")]
    ShortTransfer(usize),

    /// The device is gone (unplugged or closed).
    #[error("device disconnected")]
    Disconnected,

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Errors from the serialized hardware transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Every attempt of one leg of the exchange failed.
    #[error("{leg} transfer failed after {attempts} attempts: {source}")]
    Exhausted {
        /// `out` for the request, `in` for the reply.
        leg: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// Error of the final attempt.
        source: DeviceIoError,
    },

    /// The transport was released during shutdown.
    #[error("device released")]
    Released,
}

/// Errors produced while executing one command.
///
/// The `Display` text is what clients see after `ERROR - `.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Missing or unparsable parameters.
    #[error("{0}")]
    Malformed(String),

    /// A parameter outside its valid range.
    #[error(transparent)]
    OutOfRange(ProtocolError),

    /// The first token is not a known command.
    #[error("unknown command '{0}'")]
    Unknown(String),

    /// The device could not be reached.
    #[error("USB communication error")]
    Transport(#[from] TransportError),

    /// The device answered with something unusable.
    #[error("{0}")]
    InvalidReply(String),

    /// Writing output to the client failed; the connection must close.
    #[error("client write failed: {0}")]
    Io(#[from] io::Error),
}

impl CommandError {
    /// Create a malformed-command error.
    pub fn malformed(message: impl Into<String>) -> Self {
        CommandError::Malformed(message.into())
    }

    /// Short kind name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Malformed(_) => "malformed",
            CommandError::OutOfRange(_) => "out_of_range",
            CommandError::Unknown(_) => "unknown",
            CommandError::Transport(_) => "transport",
            CommandError::InvalidReply(_) => "invalid_reply",
            CommandError::Io(_) => "io",
        }
    }
}

impl From<ProtocolError> for CommandError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::OutOfRange { .. } => CommandError::OutOfRange(err),
            ProtocolError::InvalidReply(_) => CommandError::InvalidReply("invalid device reply".into()),
            other => CommandError::Malformed(other.to_string()),
        }
    }
}

/// Result type alias for command execution.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors loading or validating the startup configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The configuration file is not valid YAML for [`StartupConfig`](crate::config::StartupConfig).
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// A value is syntactically fine but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
