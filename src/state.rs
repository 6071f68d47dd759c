use std::sync::Arc;
use tokio::sync::Mutex;

use crate::commands::Dispatcher;
use crate::error::FluxError;
use crate::format::{format_failure, Reply};
use crate::ssh::{RusshBackend, SshBackend};

/// Global application state
pub struct AppState<B: SshBackend = RusshBackend> {
    dispatcher: Arc<Mutex<Dispatcher<B>>>,
}

impl<B: SshBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<B> AppState<B>
where
    B: SshBackend + Send + 'static,
    B::Handle: Send,
{
    pub fn new(dispatcher: Dispatcher<B>) -> Self {
        Self {
            dispatcher: Arc::new(Mutex::new(dispatcher)),
        }
    }

    /// Run one command on the blocking pool. The dispatcher lock is held for
    /// the whole call, so commands from all clients run one at a time.
    pub async fn call(&self, name: String, params: Vec<String>) -> Reply {
        let dispatcher = self.dispatcher.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut dispatcher = dispatcher.blocking_lock();
            dispatcher.dispatch(&name, params)
        });

        match task.await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("command task failed: {}", e);
                format_failure(&FluxError::Internal(e.to_string()))
            }
        }
    }
}
