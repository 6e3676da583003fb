//! The playground component
//!
//! Owns one [`RuntimeLoader`] and one [`SessionController`] and is what a
//! presentation layer binds to: mount once, dispatch user actions, render
//! the [`View`].

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use crate::loader::{LoadState, RuntimeLoader};
use crate::runtime::RuntimeFactory;
use crate::session::{Action, Outcome, SessionController, SessionError, SessionState};
use crate::snippets;

/// Everything the presentation layer needs to draw the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    pub status: String,
    /// Why the runtime never became ready, if it failed
    pub load_error: Option<String>,
    pub examples: Vec<String>,
    pub source: String,
    pub run_enabled: bool,
    pub reset_enabled: bool,
    pub output: String,
    pub output_is_error: bool,
}

pub struct Playground {
    loader: Arc<RuntimeLoader>,
    session: SessionController,
}

impl Playground {
    pub fn new(factory: Arc<dyn RuntimeFactory>) -> Self {
        Self {
            loader: Arc::new(RuntimeLoader::new(factory)),
            session: SessionController::new(),
        }
    }

    /// Bring the runtime up. Mounting again never reloads the artifact.
    pub async fn mount(&mut self) -> LoadState {
        let state = self.loader.initialize().await;
        self.attach_if_ready();
        state
    }

    /// Start loading without waiting, so the session stays editable
    pub fn spawn_mount(&self) -> JoinHandle<LoadState> {
        let loader = Arc::clone(&self.loader);
        tokio::spawn(async move { loader.initialize().await })
    }

    pub fn load_state(&self) -> LoadState {
        self.loader.state()
    }

    pub fn session(&self) -> &SessionState {
        self.session.state()
    }

    pub fn dispatch(&mut self, action: Action) -> Result<Outcome, SessionError> {
        self.attach_if_ready();
        self.session.dispatch(action)
    }

    pub fn edit(&mut self, source: impl Into<String>) -> Outcome {
        self.attach_if_ready();
        self.session.edit(source)
    }

    pub fn load_example(&mut self, index: usize) -> Result<Outcome, SessionError> {
        self.dispatch(Action::LoadExample(index))
    }

    pub fn run(&mut self) -> Outcome {
        self.attach_if_ready();
        self.session.run()
    }

    pub fn reset(&mut self) -> Outcome {
        self.attach_if_ready();
        self.session.reset()
    }

    pub fn view(&self) -> View {
        let state = self.loader.state();
        let ready = state.is_ready();
        let session = self.session.state();

        View {
            status: state.label().to_string(),
            load_error: state.error().map(|e| e.to_string()),
            examples: snippets::labels(),
            source: session.source.clone(),
            run_enabled: ready,
            reset_enabled: ready,
            output: session.output.as_str().to_string(),
            output_is_error: session.output.is_error(),
        }
    }

    fn attach_if_ready(&mut self) {
        if self.session.is_ready() {
            return;
        }
        if let Some(handle) = self.loader.handle() {
            info!("Runtime attached to session");
            self.session.attach(handle);
        }
    }
}
