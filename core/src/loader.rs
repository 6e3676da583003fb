//! Runtime loader
//!
//! Acquires the external interpreter exactly once per host lifetime. The
//! lifecycle is an explicit state machine published over a watch channel:
//!
//! ```text
//! NotStarted -> Loading -> Ready(handle)
//!                       \-> Failed(reason)
//! ```
//!
//! `Ready` and `Failed` are terminal. There is no automatic retry.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::runtime::{share, RuntimeFactory, SharedHandle};

/// Why the runtime could not be brought up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The artifact loaded but does not expose the expected factory
    #[error("entry point '{0}' is missing from the interpreter artifact")]
    EntryPointMissing(String),

    #[error("failed to fetch interpreter artifact: {0}")]
    Fetch(String),

    #[error("failed to instantiate interpreter artifact: {0}")]
    Instantiate(String),
}

/// Lifecycle of artifact acquisition
#[derive(Clone, Default)]
pub enum LoadState {
    #[default]
    NotStarted,
    Loading,
    Ready(SharedHandle),
    Failed(LoadError),
}

impl LoadState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready(_))
    }

    /// True once the loader can no longer change state
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadState::Ready(_) | LoadState::Failed(_))
    }

    pub fn handle(&self) -> Option<SharedHandle> {
        match self {
            LoadState::Ready(handle) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LoadState::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoadState::NotStarted => "not started",
            LoadState::Loading => "loading",
            LoadState::Ready(_) => "ready",
            LoadState::Failed(_) => "failed",
        }
    }
}

impl fmt::Debug for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::NotStarted => f.write_str("NotStarted"),
            LoadState::Loading => f.write_str("Loading"),
            LoadState::Ready(_) => f.write_str("Ready(..)"),
            LoadState::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Owns the one runtime handle of this host
pub struct RuntimeLoader {
    factory: Arc<dyn RuntimeFactory>,
    state: watch::Sender<LoadState>,
}

impl RuntimeLoader {
    pub fn new(factory: Arc<dyn RuntimeFactory>) -> Self {
        let (state, _) = watch::channel(LoadState::NotStarted);
        Self { factory, state }
    }

    /// Snapshot of the current lifecycle state
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Readiness signal: observers are woken on every transition
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// The shared handle, only once ready
    pub fn handle(&self) -> Option<SharedHandle> {
        self.state.borrow().handle()
    }

    /// Bring the runtime up and return the settled state.
    ///
    /// Only the first call reaches the factory. Later or concurrent calls
    /// wait for that attempt and report its outcome.
    pub async fn initialize(&self) -> LoadState {
        let claimed = self.state.send_if_modified(|state| {
            if matches!(state, LoadState::NotStarted) {
                *state = LoadState::Loading;
                true
            } else {
                false
            }
        });

        if !claimed {
            debug!(state = self.state.borrow().label(), "initialize already claimed");
            return self.settled().await;
        }

        info!(artifact = %self.factory.describe(), "Loading interpreter runtime");

        let mut guard = LoadingGuard {
            state: &self.state,
            armed: true,
        };

        let next = match self.factory.create().await {
            Ok(handle) => {
                info!("Interpreter runtime ready");
                LoadState::Ready(share(handle))
            }
            Err(err) => {
                error!(error = %err, "Interpreter runtime failed to load");
                LoadState::Failed(err)
            }
        };

        guard.armed = false;
        self.state.send_replace(next.clone());
        next
    }

    async fn settled(&self) -> LoadState {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        // Bound to a local so the borrowed Ref drops before rx.
        #[allow(clippy::let_and_return)]
        let settled = match rx.wait_for(LoadState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }
}

/// Moves a claimed load to `Failed` if the initializing future is dropped
/// before it settles, so waiters never hang on `Loading`.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<LoadState>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Interpreter runtime initialization was cancelled");
            self.state.send_replace(LoadState::Failed(LoadError::Instantiate(
                "initialization was cancelled".to_string(),
            )));
        }
    }
}
