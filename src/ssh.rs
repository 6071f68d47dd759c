use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use russh::client;
use russh::keys::{PublicKey, PublicKeyBase64};
use russh::{Disconnect, SshId};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::Handle as RuntimeHandle;

/// Backend log verbosity, from quietest to noisiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    NoLog,
    Warning,
    Protocol,
    Functions,
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "nolog" => Ok(Verbosity::NoLog),
            "warning" | "warn" => Ok(Verbosity::Warning),
            // russh gives no per-packet hook, so packet tracing is protocol tracing.
            "protocol" | "packet" => Ok(Verbosity::Protocol),
            "functions" => Ok(Verbosity::Functions),
            other => Err(format!("unknown verbosity: {}", other)),
        }
    }
}

/// A connection option applied to a fresh handle before connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOption {
    Host(String),
    Port(u16),
    User(String),
    /// Working directory for SSH state. Required even when unused.
    SshDir(PathBuf),
    LogVerbosity(Verbosity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Host,
    Port,
    User,
    SshDir,
    LogVerbosity,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::Host => "host",
            OptionKind::Port => "port",
            OptionKind::User => "user",
            OptionKind::SshDir => "ssh directory",
            OptionKind::LogVerbosity => "verbosity",
        };
        f.write_str(name)
    }
}

impl SessionOption {
    pub fn kind(&self) -> OptionKind {
        match self {
            SessionOption::Host(_) => OptionKind::Host,
            SessionOption::Port(_) => OptionKind::Port,
            SessionOption::User(_) => OptionKind::User,
            SessionOption::SshDir(_) => OptionKind::SshDir,
            SessionOption::LogVerbosity(_) => OptionKind::LogVerbosity,
        }
    }
}

/// Server answer to the `none` authentication probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProbe {
    /// The server let us in without credentials.
    Accepted,
    /// The server refused and listed the methods it would take instead.
    Denied { remaining_methods: Vec<String> },
}

/// Entry point into an SSH client library.
pub trait SshBackend {
    type Handle: SshHandle;

    /// Library version, if the library reports one.
    fn version(&self) -> Option<String>;

    /// Allocate a new, unconnected handle. Dropping the handle frees it.
    fn new_handle(&self) -> Result<Self::Handle>;
}

/// One connection handle. All calls block until the network operation ends.
pub trait SshHandle {
    type Key: HostKey;

    fn set_option(&mut self, option: SessionOption) -> Result<()>;

    fn connect(&mut self) -> Result<()>;

    fn server_public_key(&mut self) -> Result<Self::Key>;

    fn authenticate_none(&mut self) -> Result<AuthProbe>;

    fn server_banner(&self) -> Option<String>;

    /// Close the transport. Errors are logged, never returned.
    fn disconnect(&mut self);
}

/// Server host key material.
pub trait HostKey {
    fn fingerprint(&self) -> Result<String>;
}

// ============================================================================
// russh backend
// ============================================================================

/// [`SshBackend`] over russh. Async calls are driven on `runtime`, so handles
/// must be used from a thread where blocking is allowed.
#[derive(Clone)]
pub struct RusshBackend {
    runtime: RuntimeHandle,
}

impl RusshBackend {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self { runtime }
    }
}

impl SshBackend for RusshBackend {
    type Handle = RusshHandle;

    fn version(&self) -> Option<String> {
        // russh stamps its own name and version into the default client id.
        match client::Config::default().client_id {
            SshId::Standard(id) => id
                .strip_prefix("SSH-2.0-")
                .map(|v| v.trim().replace('_', " ")),
            _ => None,
        }
    }

    fn new_handle(&self) -> Result<RusshHandle> {
        Ok(RusshHandle {
            runtime: self.runtime.clone(),
            host: None,
            port: 22,
            user: None,
            ssh_dir: None,
            verbosity: Verbosity::Warning,
            captured: Arc::new(Mutex::new(Captured::default())),
            session: None,
        })
    }
}

/// Values russh hands to the client callbacks during the handshake.
#[derive(Default)]
struct Captured {
    server_key: Option<PublicKey>,
    banner: Option<String>,
}

struct Client {
    captured: Arc<Mutex<Captured>>,
}

impl client::Handler for Client {
    type Error = russh::Error;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        self.captured.lock().server_key = Some(server_public_key.clone());
        // No known_hosts lookup: every server key is accepted.
        async { Ok(true) }
    }

    fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut client::Session,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        self.captured.lock().banner = Some(banner.to_string());
        async { Ok(()) }
    }
}

pub struct RusshHandle {
    runtime: RuntimeHandle,
    host: Option<String>,
    port: u16,
    user: Option<String>,
    ssh_dir: Option<PathBuf>,
    verbosity: Verbosity,
    captured: Arc<Mutex<Captured>>,
    session: Option<client::Handle<Client>>,
}

impl RusshHandle {
    fn trace_call(&self, call: &str) {
        if self.verbosity >= Verbosity::Functions {
            tracing::trace!(call, "ssh handle call");
        }
    }
}

impl SshHandle for RusshHandle {
    type Key = RusshKey;

    fn set_option(&mut self, option: SessionOption) -> Result<()> {
        self.trace_call("set_option");
        match option {
            SessionOption::Host(host) => {
                if host.trim().is_empty() {
                    bail!("host must not be empty");
                }
                self.host = Some(host);
            }
            SessionOption::Port(port) => {
                if port == 0 {
                    bail!("port must be non-zero");
                }
                self.port = port;
            }
            SessionOption::User(user) => {
                if user.trim().is_empty() {
                    bail!("user must not be empty");
                }
                self.user = Some(user);
            }
            SessionOption::SshDir(dir) => {
                if !dir.is_dir() {
                    bail!("{} is not a directory", dir.display());
                }
                self.ssh_dir = Some(dir);
            }
            SessionOption::LogVerbosity(level) => self.verbosity = level,
        }
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        self.trace_call("connect");
        let host = self.host.clone().context("host option not set")?;
        if self.ssh_dir.is_none() {
            bail!("ssh directory option not set");
        }

        let client_config = Arc::new(client::Config::default());
        let handler = Client {
            captured: self.captured.clone(),
        };

        if self.verbosity >= Verbosity::Protocol {
            tracing::debug!(%host, port = self.port, "opening SSH transport");
        }

        let session = self
            .runtime
            .block_on(client::connect(
                client_config,
                (host.as_str(), self.port),
                handler,
            ))
            .with_context(|| format!("failed to connect to {}:{}", host, self.port))?;

        self.session = Some(session);
        Ok(())
    }

    fn server_public_key(&mut self) -> Result<RusshKey> {
        self.trace_call("server_public_key");
        if self.session.is_none() {
            bail!("not connected");
        }
        let key = self
            .captured
            .lock()
            .server_key
            .take()
            .context("server did not present a host key")?;
        Ok(RusshKey(key))
    }

    fn authenticate_none(&mut self) -> Result<AuthProbe> {
        self.trace_call("authenticate_none");
        let user = self.user.clone().context("user option not set")?;
        let session = self.session.as_mut().context("not connected")?;

        let result = self
            .runtime
            .block_on(session.authenticate_none(user))
            .context("none authentication request failed")?;

        Ok(match result {
            client::AuthResult::Success => AuthProbe::Accepted,
            client::AuthResult::Failure {
                remaining_methods, ..
            } => AuthProbe::Denied {
                remaining_methods: remaining_methods
                    .iter()
                    .map(|m| <&str>::from(m).to_string())
                    .collect(),
            },
        })
    }

    fn server_banner(&self) -> Option<String> {
        self.trace_call("server_banner");
        self.captured.lock().banner.clone()
    }

    fn disconnect(&mut self) {
        self.trace_call("disconnect");
        if let Some(session) = self.session.take() {
            let result = self
                .runtime
                .block_on(session.disconnect(Disconnect::ByApplication, "", "English"));
            if let Err(e) = result {
                if self.verbosity >= Verbosity::Warning {
                    tracing::warn!("SSH disconnect failed: {}", e);
                }
            }
        }
    }
}

/// Host key captured during the handshake.
pub struct RusshKey(PublicKey);

impl HostKey for RusshKey {
    fn fingerprint(&self) -> Result<String> {
        Ok(sha256_fingerprint(&self.0.public_key_bytes()))
    }
}

/// OpenSSH-style `SHA256:<base64>` fingerprint of raw key bytes.
pub fn sha256_fingerprint(key_bytes: &[u8]) -> String {
    let hash = Sha256::digest(key_bytes);
    format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
}
