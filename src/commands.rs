//! Command surface: name resolution, arity checks and the three handlers.

use std::fmt;

use crate::error::FluxError;
use crate::format::{format_command_failure, format_failure, format_success, Reply};
use crate::session::SessionManager;
use crate::ssh::SshBackend;

/// Payload returned by a successful `connectToFlux`.
pub const CONNECTED_STATUS: &str = "yatta ne!";
/// Payload returned by a successful `disconnectFromFlux`.
pub const DISCONNECTED_STATUS: &str = "owari desu";
/// Reported by `runtest` when the SSH library has no version string.
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandName {
    RunTest,
    ConnectToFlux,
    DisconnectFromFlux,
}

impl CommandName {
    pub const ALL: [CommandName; 3] = [
        CommandName::RunTest,
        CommandName::ConnectToFlux,
        CommandName::DisconnectFromFlux,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::RunTest => "runtest",
            CommandName::ConnectToFlux => "connectToFlux",
            CommandName::DisconnectFromFlux => "disconnectFromFlux",
        }
    }

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated invocation. Each variant carries exactly the parameters its
/// handler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RunTest { callback_id: String },
    ConnectToFlux { callback_id: String },
    DisconnectFromFlux { callback_id: String },
}

impl Command {
    /// Resolve `name` and check `params` against the command's arity.
    pub fn parse(name: &str, params: Vec<String>) -> Result<Self, FluxError> {
        let command =
            CommandName::lookup(name).ok_or_else(|| FluxError::UnknownCommand(name.to_string()))?;

        let [callback_id] = fixed_params::<1>(command, params)?;
        Ok(match command {
            CommandName::RunTest => Command::RunTest { callback_id },
            CommandName::ConnectToFlux => Command::ConnectToFlux { callback_id },
            CommandName::DisconnectFromFlux => Command::DisconnectFromFlux { callback_id },
        })
    }

    pub fn name(&self) -> CommandName {
        match self {
            Command::RunTest { .. } => CommandName::RunTest,
            Command::ConnectToFlux { .. } => CommandName::ConnectToFlux,
            Command::DisconnectFromFlux { .. } => CommandName::DisconnectFromFlux,
        }
    }
}

fn fixed_params<const N: usize>(
    command: CommandName,
    params: Vec<String>,
) -> Result<[String; N], FluxError> {
    let actual = params.len();
    <[String; N]>::try_from(params).map_err(|_| FluxError::Arity {
        command: command.as_str(),
        expected: N,
        actual,
    })
}

/// Routes commands to their handlers. Holds the session manager exclusively,
/// so handlers never run concurrently.
pub struct Dispatcher<B: SshBackend> {
    sessions: SessionManager<B>,
}

impl<B: SshBackend> Dispatcher<B> {
    pub fn new(sessions: SessionManager<B>) -> Self {
        Self { sessions }
    }

    /// Parse and run one command. Never panics on bad input; every failure
    /// comes back as a non-zero [`Reply`].
    pub fn dispatch(&mut self, name: &str, params: Vec<String>) -> Reply {
        match Command::parse(name, params) {
            Ok(command) => self.execute(command),
            Err(e) => {
                tracing::warn!("rejected call to {}: {}", name, e);
                format_failure(&e)
            }
        }
    }

    pub fn execute(&mut self, command: Command) -> Reply {
        let name = command.name();
        tracing::info!(
            command = %name,
            connected = self.sessions.is_connected(),
            "handling command"
        );

        match command {
            Command::RunTest { callback_id } => self.run_test(&callback_id),
            Command::ConnectToFlux { callback_id } => self.connect(&callback_id),
            Command::DisconnectFromFlux { callback_id } => self.disconnect(&callback_id),
        }
    }

    fn run_test(&self, callback_id: &str) -> Reply {
        let version = self
            .sessions
            .backend()
            .version()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        format_success(callback_id, &version)
    }

    fn connect(&mut self, callback_id: &str) -> Reply {
        match self.sessions.connect() {
            Ok(info) => {
                tracing::info!(
                    fingerprint = %info.server_key_fingerprint,
                    "connected"
                );
                format_success(callback_id, CONNECTED_STATUS)
            }
            Err(e) => {
                tracing::error!("{}: {}", CommandName::ConnectToFlux, e);
                format_command_failure(CommandName::ConnectToFlux.as_str(), &e)
            }
        }
    }

    fn disconnect(&mut self, callback_id: &str) -> Reply {
        if let Some(info) = self.sessions.info() {
            tracing::debug!(
                fingerprint = %info.server_key_fingerprint,
                "closing session"
            );
        }
        match self.sessions.disconnect() {
            Ok(()) => format_success(callback_id, DISCONNECTED_STATUS),
            Err(e) => {
                tracing::warn!("{}: {}", CommandName::DisconnectFromFlux, e);
                format_command_failure(CommandName::DisconnectFromFlux.as_str(), &e)
            }
        }
    }
}
