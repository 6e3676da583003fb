pub mod cli;
pub mod config;
pub mod loader;
pub mod playground;
pub mod runtime;
pub mod session;
pub mod snippets;
pub mod wasm;

#[cfg(test)]
mod test_helpers;

pub use loader::{LoadError, LoadState, RuntimeLoader};
pub use playground::{Playground, View};
pub use runtime::{RuntimeFactory, RuntimeFailure, RuntimeHandle, SharedHandle};
pub use session::{Action, ErrorReport, Outcome, Output, SessionController, SessionError, SessionState};
pub use wasm::{WasmFactory, WasmRuntime};
