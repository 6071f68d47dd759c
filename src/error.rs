//! Error types shared by the command handlers.

use std::fmt;

use thiserror::Error;

use crate::ssh::OptionKind;

/// Broad classification of a failure, mapped onto the status code returned
/// to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Arity,
    UnknownCommand,
    ResourceExhaustion,
    StateConflict,
    Transport,
    AuthProbe,
    Internal,
}

impl ErrorKind {
    /// Status code for this failure class. `0` is reserved for success.
    pub fn status_code(self) -> i32 {
        match self {
            ErrorKind::Arity => 1,
            ErrorKind::UnknownCommand => 2,
            ErrorKind::ResourceExhaustion => 3,
            ErrorKind::StateConflict => 4,
            ErrorKind::Transport => 5,
            ErrorKind::AuthProbe => 6,
            ErrorKind::Internal => 7,
        }
    }
}

/// A step of the connect sequence, used to label transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    CreateSession,
    Configure(OptionKind),
    Connect,
    PublicKey,
    Fingerprint,
    Authenticate,
}

impl fmt::Display for ConnectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectStep::CreateSession => write!(f, "session creation"),
            ConnectStep::Configure(option) => write!(f, "setting {}", option),
            ConnectStep::Connect => write!(f, "connect"),
            ConnectStep::PublicKey => write!(f, "getting public key"),
            ConnectStep::Fingerprint => write!(f, "hashing public key"),
            ConnectStep::Authenticate => write!(f, "userauth_none"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FluxError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} takes {expected} parameters, got {actual}")]
    Arity {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("{step} failed: {message}")]
    Transport { step: ConnectStep, message: String },

    #[error("{step} failed: {message}")]
    AuthProbe { step: ConnectStep, message: String },

    #[error("out of memory")]
    OutOfMemory,

    #[error("internal error: {0}")]
    Internal(String),
}

impl FluxError {
    /// Wrap a backend error raised during `step`, keeping the full context chain.
    pub fn at_step(step: ConnectStep, err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        match step {
            ConnectStep::Authenticate => FluxError::AuthProbe { step, message },
            _ => FluxError::Transport { step, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FluxError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            FluxError::Arity { .. } => ErrorKind::Arity,
            FluxError::AlreadyConnected | FluxError::NotConnected => ErrorKind::StateConflict,
            FluxError::Transport { .. } => ErrorKind::Transport,
            FluxError::AuthProbe { .. } => ErrorKind::AuthProbe,
            FluxError::OutOfMemory => ErrorKind::ResourceExhaustion,
            FluxError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }
}
