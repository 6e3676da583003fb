//! Runtime capability seam
//!
//! The interpreter is an external artifact. The host only ever talks to it
//! through [`RuntimeHandle`], and only ever acquires one through a
//! [`RuntimeFactory`]. Nothing on this side of the boundary knows how the
//! artifact lexes, parses or evaluates anything.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::loader::LoadError;

/// A failure thrown by the runtime while executing or resetting.
///
/// The artifact's error taxonomy is opaque, so this carries only the
/// failure's textual rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFailure(String);

impl RuntimeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for RuntimeFailure {}

impl From<String> for RuntimeFailure {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for RuntimeFailure {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Capability object for an initialized interpreter.
pub trait RuntimeHandle: Send {
    /// Execute source text and return the produced output verbatim
    fn execute(&mut self, source: &str) -> Result<String, RuntimeFailure>;

    /// Discard the interpreter's internal state (variables, definitions)
    fn reset_state(&mut self) -> Result<(), RuntimeFailure>;
}

/// Handle shared between the loader (owner) and the session controller.
pub type SharedHandle = Arc<Mutex<Box<dyn RuntimeHandle>>>;

/// Wrap a freshly created handle for sharing
pub fn share(handle: Box<dyn RuntimeHandle>) -> SharedHandle {
    Arc::new(Mutex::new(handle))
}

/// Fetches and instantiates the external artifact.
///
/// The loader calls [`RuntimeFactory::create`] at most once per lifetime.
#[async_trait]
pub trait RuntimeFactory: Send + Sync {
    /// Short description of where the artifact comes from, for logs
    fn describe(&self) -> String;

    async fn create(&self) -> Result<Box<dyn RuntimeHandle>, LoadError>;
}
