//! Runtime configuration, read from the environment (and `.env`).

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::ConnectTarget;
use crate::ssh::Verbosity;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 22;
const DEFAULT_USER: &str = "flux";
const DEFAULT_SSH_DIR: &str = "/";
const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub target: ConnectTarget,
    pub listen: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source. Unset and blank
    /// variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match get("FLUX_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ConfigError::Invalid {
                    var: "FLUX_PORT",
                    reason: format!("{:?} is not a port number", raw),
                })?,
            None => DEFAULT_PORT,
        };

        let verbosity = match get("FLUX_SSH_VERBOSITY") {
            Some(raw) => raw
                .parse::<Verbosity>()
                .map_err(|reason| ConfigError::Invalid {
                    var: "FLUX_SSH_VERBOSITY",
                    reason,
                })?,
            None => Verbosity::Functions,
        };

        let listen = get("FLUXUI_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "FLUXUI_LISTEN",
                reason: e.to_string(),
            })?;

        let username = get("FLUX_USER")
            .or_else(|| get("USER"))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        Ok(Self {
            target: ConnectTarget {
                host: get("FLUX_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
                username,
                ssh_dir: PathBuf::from(
                    get("FLUX_SSH_DIR").unwrap_or_else(|| DEFAULT_SSH_DIR.to_string()),
                ),
                verbosity,
            },
            listen,
        })
    }
}
