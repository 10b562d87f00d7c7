//! Start/stop hooks for long-lived resources.
//!
//! Hooks start in registration order and stop in reverse order. Only hooks
//! that started are stopped. A failed start rolls back the hooks already
//! started; a failed stop is recorded and the remaining hooks still run.

use futures::future::BoxFuture;
use futures::FutureExt;
use meridian_core::RoutingError;
use std::fmt;
use std::future::Future;

type HookFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), RoutingError>> + Send>;

/// A named pair of optional start and stop callbacks.
pub struct Hook {
    name: String,
    on_start: Option<HookFn>,
    on_stop: Option<HookFn>,
}

impl Hook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_start: None,
            on_stop: None,
        }
    }

    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RoutingError>> + Send + 'static,
    {
        self.on_start = Some(Box::new(move || f().boxed()));
        self
    }

    pub fn on_stop<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RoutingError>> + Send + 'static,
    {
        self.on_stop = Some(Box::new(move || f().boxed()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_stop(&self) -> bool {
        self.on_stop.is_some()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// A stop hook that returned an error.
#[derive(Debug, thiserror::Error)]
#[error("{hook}: {error}")]
pub struct HookFailure {
    pub hook: String,
    pub error: RoutingError,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("start hook '{hook}' failed: {source}")]
    Start {
        hook: String,
        #[source]
        source: RoutingError,
    },

    #[error("stop hooks failed: {}", join_failures(.0))]
    Stop(Vec<HookFailure>),

    #[error("lifecycle already started")]
    AlreadyStarted,
}

fn join_failures(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    hooks: Vec<Hook>,
    /// Number of leading hooks that have started.
    started: usize,
    running: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, hook: Hook) {
        tracing::debug!(hook = %hook.name, "lifecycle hook registered");
        self.hooks.push(hook);
    }

    /// Move every hook of `other` to the end of this lifecycle.
    pub fn extend(&mut self, other: Lifecycle) {
        self.hooks.extend(other.hooks);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Hooks that will do something on stop.
    pub fn stop_hook_count(&self) -> usize {
        self.hooks.iter().filter(|h| h.has_stop()).count()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run every start hook in order. On failure the hooks already started
    /// are stopped in reverse order before the error is returned.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        if self.running {
            return Err(LifecycleError::AlreadyStarted);
        }
        self.running = true;

        while self.started < self.hooks.len() {
            let hook = &mut self.hooks[self.started];
            if let Some(on_start) = hook.on_start.take() {
                tracing::debug!(hook = %hook.name, "starting hook");
                if let Err(source) = on_start().await {
                    let name = hook.name.clone();
                    tracing::error!(hook = %name, error = %source, "start hook failed, rolling back");
                    if let Err(e) = self.stop().await {
                        tracing::warn!(error = %e, "rollback incomplete");
                    }
                    return Err(LifecycleError::Start { hook: name, source });
                }
            }
            self.started += 1;
        }

        tracing::info!(hooks = self.hooks.len(), "lifecycle started");
        Ok(())
    }

    /// Run the stop hooks of every started hook in reverse order.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        let mut failures = Vec::new();
        while self.started > 0 {
            self.started -= 1;
            let hook = &mut self.hooks[self.started];
            if let Some(on_stop) = hook.on_stop.take() {
                tracing::debug!(hook = %hook.name, "stopping hook");
                if let Err(error) = on_stop().await {
                    tracing::warn!(hook = %hook.name, error = %error, "stop hook failed");
                    failures.push(HookFailure {
                        hook: hook.name.clone(),
                        error,
                    });
                }
            }
        }
        self.running = false;

        if failures.is_empty() {
            tracing::info!("lifecycle stopped");
            Ok(())
        } else {
            Err(LifecycleError::Stop(failures))
        }
    }
}
