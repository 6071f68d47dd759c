use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use anyhow::anyhow;

use crate::error::{ConnectStep, FluxError};
use crate::ssh::{AuthProbe, HostKey, SessionOption, SshBackend, SshHandle, Verbosity};

/// Fixed connection target for `connectToFlux`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub ssh_dir: PathBuf,
    pub verbosity: Verbosity,
}

impl ConnectTarget {
    fn options(&self) -> [SessionOption; 5] {
        [
            SessionOption::Host(self.host.clone()),
            SessionOption::Port(self.port),
            SessionOption::User(self.username.clone()),
            SessionOption::SshDir(self.ssh_dir.clone()),
            SessionOption::LogVerbosity(self.verbosity),
        ]
    }
}

/// Metadata negotiated while bringing the session up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub server_key_fingerprint: String,
    pub server_banner: Option<String>,
}

struct ActiveSession<H> {
    handle: H,
    info: SessionInfo,
}

/// Owner of the single SSH session. A session is either fully connected and
/// stored here, or absent.
pub struct SessionManager<B: SshBackend> {
    backend: B,
    target: ConnectTarget,
    active: Option<ActiveSession<B::Handle>>,
}

/// Disconnects the transport on drop unless disarmed. Borrowing the handle
/// guarantees the disconnect runs before the handle itself is freed.
struct TransportGuard<'a, H: SshHandle> {
    handle: &'a mut H,
    armed: bool,
}

impl<'a, H: SshHandle> TransportGuard<'a, H> {
    fn new(handle: &'a mut H) -> Self {
        Self {
            handle,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<H: SshHandle> Deref for TransportGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &*self.handle
    }
}

impl<H: SshHandle> DerefMut for TransportGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut *self.handle
    }
}

impl<H: SshHandle> Drop for TransportGuard<'_, H> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("unwinding: disconnecting transport");
            self.handle.disconnect();
        }
    }
}

impl<B: SshBackend> SessionManager<B> {
    pub fn new(backend: B, target: ConnectTarget) -> Self {
        Self {
            backend,
            target,
            active: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Snapshot of the live session, `None` when disconnected.
    pub fn info(&self) -> Option<&SessionInfo> {
        self.active.as_ref().map(|s| &s.info)
    }

    /// Bring up a session: allocate, configure, connect, fingerprint the host
    /// key, probe `none` authentication and read the banner.
    ///
    /// The server must accept the `none` probe. A denial fails the connect
    /// like any other authentication error.
    ///
    /// Any failure releases everything acquired so far, newest first, and
    /// leaves the manager disconnected.
    pub fn connect(&mut self) -> Result<&SessionInfo, FluxError> {
        if self.active.is_some() {
            return Err(FluxError::AlreadyConnected);
        }

        tracing::debug!("creating session");
        let mut handle = self
            .backend
            .new_handle()
            .map_err(|e| FluxError::at_step(ConnectStep::CreateSession, e))?;

        tracing::debug!("setting options");
        for option in self.target.options() {
            let step = ConnectStep::Configure(option.kind());
            handle
                .set_option(option)
                .map_err(|e| FluxError::at_step(step, e))?;
        }

        tracing::info!(
            host = %self.target.host,
            port = self.target.port,
            user = %self.target.username,
            "connecting"
        );
        handle
            .connect()
            .map_err(|e| FluxError::at_step(ConnectStep::Connect, e))?;

        let mut transport = TransportGuard::new(&mut handle);

        tracing::debug!("getting public key");
        let key = transport
            .server_public_key()
            .map_err(|e| FluxError::at_step(ConnectStep::PublicKey, e))?;
        let fingerprint = key.fingerprint();
        drop(key);
        let fingerprint =
            fingerprint.map_err(|e| FluxError::at_step(ConnectStep::Fingerprint, e))?;
        tracing::warn!(
            %fingerprint,
            "server host key accepted without known_hosts verification"
        );

        tracing::debug!("userauth_none");
        let probe = transport
            .authenticate_none()
            .map_err(|e| FluxError::at_step(ConnectStep::Authenticate, e))?;
        if let AuthProbe::Denied { remaining_methods } = probe {
            let err = anyhow!(
                "server denied none authentication (remaining methods: {})",
                remaining_methods.join(",")
            );
            return Err(FluxError::at_step(ConnectStep::Authenticate, err));
        }

        tracing::debug!("getting server banner");
        let server_banner = transport.server_banner();
        if let Some(banner) = &server_banner {
            tracing::info!("banner: {}", banner);
        }

        transport.disarm();
        let active = self.active.insert(ActiveSession {
            handle,
            info: SessionInfo {
                server_key_fingerprint: fingerprint,
                server_banner,
            },
        });
        Ok(&active.info)
    }

    /// Close the transport and free the handle.
    pub fn disconnect(&mut self) -> Result<(), FluxError> {
        let mut session = self.active.take().ok_or(FluxError::NotConnected)?;
        session.handle.disconnect();
        drop(session);
        tracing::info!("disconnected");
        Ok(())
    }
}
