//! Fake runtimes for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::loader::LoadError;
use crate::runtime::{RuntimeFactory, RuntimeFailure, RuntimeHandle};

/// Records every call that reaches a fake runtime
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}

type ExecuteFn = Box<dyn FnMut(&str) -> Result<String, RuntimeFailure> + Send>;

pub struct FakeRuntime {
    execute: ExecuteFn,
    reset_failure: Option<String>,
    calls: CallLog,
}

impl FakeRuntime {
    pub fn new(
        calls: CallLog,
        execute: impl FnMut(&str) -> Result<String, RuntimeFailure> + Send + 'static,
    ) -> Self {
        Self {
            execute: Box::new(execute),
            reset_failure: None,
            calls,
        }
    }

    /// Returns the source text unchanged
    pub fn echo(calls: CallLog) -> Self {
        Self::new(calls, |source| Ok(source.to_string()))
    }

    /// Always throws the given failure
    pub fn throwing(calls: CallLog, message: &'static str) -> Self {
        Self::new(calls, move |_| Err(RuntimeFailure::from(message)))
    }

    pub fn with_reset_failure(mut self, message: impl Into<String>) -> Self {
        self.reset_failure = Some(message.into());
        self
    }
}

impl RuntimeHandle for FakeRuntime {
    fn execute(&mut self, source: &str) -> Result<String, RuntimeFailure> {
        self.calls.push(format!("execute:{source}"));
        (self.execute)(source)
    }

    fn reset_state(&mut self) -> Result<(), RuntimeFailure> {
        self.calls.push("reset");
        match &self.reset_failure {
            Some(message) => Err(RuntimeFailure::new(message.clone())),
            None => Ok(()),
        }
    }
}

/// Hands out one prepared runtime, or fails
pub struct FakeFactory {
    runtime: Mutex<Option<FakeRuntime>>,
    error: Option<LoadError>,
    yields: usize,
    gate: Option<Arc<Notify>>,
    creates: AtomicUsize,
}

impl FakeFactory {
    pub fn ready(runtime: FakeRuntime) -> Self {
        Self {
            runtime: Mutex::new(Some(runtime)),
            error: None,
            yields: 0,
            gate: None,
            creates: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: LoadError) -> Self {
        Self {
            runtime: Mutex::new(None),
            error: Some(error),
            yields: 0,
            gate: None,
            creates: AtomicUsize::new(0),
        }
    }

    /// Suspend this many times inside `create` so other tasks interleave
    pub fn with_yields(mut self, yields: usize) -> Self {
        self.yields = yields;
        self
    }

    /// Block inside `create` until the gate is notified
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeFactory for FakeFactory {
    fn describe(&self) -> String {
        "fake".to_string()
    }

    async fn create(&self) -> Result<Box<dyn RuntimeHandle>, LoadError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let runtime = self
            .runtime
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LoadError::Instantiate("fake runtime already taken".to_string()))?;
        Ok(Box::new(runtime))
    }
}
