//! Scripted SSH backend for unit tests. Every acquisition and release is
//! appended to an [`EventLog`] so tests can check unwind order.

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::session::ConnectTarget;
use crate::ssh::{
    sha256_fingerprint, AuthProbe, HostKey, OptionKind, SessionOption, SshBackend, SshHandle,
    Verbosity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Allocated(u32),
    OptionSet(u32, OptionKind),
    Connected(u32),
    KeyFetched(u32),
    KeyFreed(u32),
    Authenticated(u32),
    Disconnected(u32),
    Freed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Allocate,
    Option(OptionKind),
    Connect,
    PublicKey,
    Fingerprint,
    Authenticate,
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock())
    }
}

struct Script {
    fail_at: Option<FailAt>,
    banner: Option<String>,
    version: Option<String>,
    denied_methods: Option<Vec<String>>,
    next_id: u32,
}

pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    log: EventLog,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                fail_at: None,
                banner: None,
                version: Some("scripted 1.0".to_string()),
                denied_methods: None,
                next_id: 0,
            })),
            log: EventLog::default(),
        }
    }

    pub fn failing(self, at: FailAt) -> Self {
        self.script.lock().fail_at = Some(at);
        self
    }

    pub fn with_banner(self, banner: &str) -> Self {
        self.script.lock().banner = Some(banner.to_string());
        self
    }

    /// Answer the `none` probe with a denial listing `methods`.
    pub fn denying_none(self, methods: &[&str]) -> Self {
        self.script.lock().denied_methods =
            Some(methods.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn without_version(self) -> Self {
        self.script.lock().version = None;
        self
    }

    pub fn clear_failure(&self) {
        self.script.lock().fail_at = None;
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl SshBackend for ScriptedBackend {
    type Handle = ScriptedHandle;

    fn version(&self) -> Option<String> {
        self.script.lock().version.clone()
    }

    fn new_handle(&self) -> Result<ScriptedHandle> {
        let mut script = self.script.lock();
        if script.fail_at == Some(FailAt::Allocate) {
            bail!("cannot allocate session");
        }
        script.next_id += 1;
        let id = script.next_id;
        self.log.push(Event::Allocated(id));
        Ok(ScriptedHandle {
            id,
            fail_at: script.fail_at,
            banner: script.banner.clone(),
            denied_methods: script.denied_methods.clone(),
            log: self.log.clone(),
        })
    }
}

pub struct ScriptedHandle {
    id: u32,
    fail_at: Option<FailAt>,
    banner: Option<String>,
    denied_methods: Option<Vec<String>>,
    log: EventLog,
}

impl SshHandle for ScriptedHandle {
    type Key = ScriptedKey;

    fn set_option(&mut self, option: SessionOption) -> Result<()> {
        let kind = option.kind();
        if self.fail_at == Some(FailAt::Option(kind)) {
            bail!("invalid value for {}", kind);
        }
        self.log.push(Event::OptionSet(self.id, kind));
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        if self.fail_at == Some(FailAt::Connect) {
            return Err(anyhow!("Connection refused (os error 111)"))
                .context("failed to connect to 127.0.0.1:22");
        }
        self.log.push(Event::Connected(self.id));
        Ok(())
    }

    fn server_public_key(&mut self) -> Result<ScriptedKey> {
        if self.fail_at == Some(FailAt::PublicKey) {
            bail!("server did not present a host key");
        }
        self.log.push(Event::KeyFetched(self.id));
        Ok(ScriptedKey {
            id: self.id,
            unhashable: self.fail_at == Some(FailAt::Fingerprint),
            log: self.log.clone(),
        })
    }

    fn authenticate_none(&mut self) -> Result<AuthProbe> {
        if self.fail_at == Some(FailAt::Authenticate) {
            bail!("connection closed during authentication");
        }
        self.log.push(Event::Authenticated(self.id));
        Ok(match &self.denied_methods {
            Some(methods) => AuthProbe::Denied {
                remaining_methods: methods.clone(),
            },
            None => AuthProbe::Accepted,
        })
    }

    fn server_banner(&self) -> Option<String> {
        self.banner.clone()
    }

    fn disconnect(&mut self) {
        self.log.push(Event::Disconnected(self.id));
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        self.log.push(Event::Freed(self.id));
    }
}

pub struct ScriptedKey {
    id: u32,
    unhashable: bool,
    log: EventLog,
}

impl HostKey for ScriptedKey {
    fn fingerprint(&self) -> Result<String> {
        if self.unhashable {
            bail!("unsupported key type");
        }
        Ok(sha256_fingerprint(b"scripted-host-key"))
    }
}

impl Drop for ScriptedKey {
    fn drop(&mut self) {
        self.log.push(Event::KeyFreed(self.id));
    }
}

pub fn target() -> ConnectTarget {
    ConnectTarget {
        host: "127.0.0.1".to_string(),
        port: 22,
        username: "flux".to_string(),
        ssh_dir: "/".into(),
        verbosity: Verbosity::Functions,
    }
}
