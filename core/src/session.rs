//! Session controller
//!
//! Holds the editable source buffer and the last output, and mediates `run`
//! and `reset` against the runtime handle. Every user action is a pure
//! transition from one [`SessionState`] to the next; the controller binds
//! those transitions to the shared handle.

use std::fmt;
use std::sync::TryLockError;

use thiserror::Error;
use tracing::{debug, warn};

use crate::runtime::{RuntimeFailure, RuntimeHandle, SharedHandle};
use crate::snippets;

/// A runtime failure as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport(String);

impl ErrorReport {
    pub const PREFIX: &'static str = "Error: ";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&RuntimeFailure> for ErrorReport {
    fn from(failure: &RuntimeFailure) -> Self {
        Self(format!("{}{}", Self::PREFIX, failure))
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of the most recently completed run or reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Text(String),
    Error(ErrorReport),
}

impl Output {
    pub fn as_str(&self) -> &str {
        match self {
            Output::Text(text) => text,
            Output::Error(report) => report.as_str(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Output::Error(_))
    }
}

impl Default for Output {
    fn default() -> Self {
        Output::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub source: String,
    pub output: Output,
}

/// User-triggered actions; nothing else mutates a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Edit(String),
    LoadExample(usize),
    Run,
    Reset,
}

impl Action {
    /// Whether the action calls into the runtime
    pub fn needs_runtime(&self) -> bool {
        matches!(self, Action::Run | Action::Reset)
    }
}

/// What happened to a dispatched action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The runtime is not ready; nothing changed
    Ignored,
    /// Another run or reset holds the runtime; nothing changed
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("example {index} does not exist ({len} examples available)")]
    ExampleOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub outcome: Outcome,
}

impl Transition {
    fn applied(state: SessionState) -> Self {
        Self {
            state,
            outcome: Outcome::Applied,
        }
    }

    fn ignored(state: &SessionState) -> Self {
        Self {
            state: state.clone(),
            outcome: Outcome::Ignored,
        }
    }
}

/// Compute the next session state.
///
/// `runtime` is `None` whenever the loader is not ready, in which case run
/// and reset leave the state untouched.
pub fn transition(
    state: &SessionState,
    action: Action,
    runtime: Option<&mut dyn RuntimeHandle>,
) -> Result<Transition, SessionError> {
    match action {
        Action::Edit(source) => Ok(Transition::applied(SessionState {
            source,
            output: state.output.clone(),
        })),

        Action::LoadExample(index) => {
            let source = snippets::get(index).ok_or(SessionError::ExampleOutOfRange {
                index,
                len: snippets::EXAMPLES.len(),
            })?;
            Ok(Transition::applied(SessionState {
                source: source.to_string(),
                output: state.output.clone(),
            }))
        }

        Action::Run => {
            let Some(runtime) = runtime else {
                return Ok(Transition::ignored(state));
            };
            let output = match runtime.execute(&state.source) {
                Ok(text) => Output::Text(text),
                Err(failure) => Output::Error(ErrorReport::from(&failure)),
            };
            Ok(Transition::applied(SessionState {
                source: state.source.clone(),
                output,
            }))
        }

        Action::Reset => {
            let Some(runtime) = runtime else {
                return Ok(Transition::ignored(state));
            };
            let output = match runtime.reset_state() {
                Ok(()) => Output::default(),
                Err(failure) => Output::Error(ErrorReport::from(&failure)),
            };
            Ok(Transition::applied(SessionState {
                source: state.source.clone(),
                output,
            }))
        }
    }
}

/// Binds session transitions to a runtime handle it does not own
#[derive(Default)]
pub struct SessionController {
    state: SessionState,
    handle: Option<SharedHandle>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// True once a ready handle has been attached
    pub fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    /// Attach the handle of a ready loader
    pub fn attach(&mut self, handle: SharedHandle) {
        self.handle = Some(handle);
    }

    pub fn dispatch(&mut self, action: Action) -> Result<Outcome, SessionError> {
        debug!(?action, "Dispatching session action");

        let next = match (&self.handle, action.needs_runtime()) {
            (Some(handle), true) => match handle.try_lock() {
                Ok(mut guard) => transition(&self.state, action, Some(&mut **guard))?,
                Err(TryLockError::Poisoned(poisoned)) => {
                    warn!("Runtime lock was poisoned by a panicking call, continuing");
                    let mut guard = poisoned.into_inner();
                    transition(&self.state, action, Some(&mut **guard))?
                }
                Err(TryLockError::WouldBlock) => {
                    warn!(?action, "Runtime is busy, ignoring action");
                    return Ok(Outcome::Busy);
                }
            },
            _ => transition(&self.state, action, None)?,
        };

        if next.outcome == Outcome::Ignored {
            debug!("Runtime not ready, action ignored");
        }
        self.state = next.state;
        Ok(next.outcome)
    }

    pub fn edit(&mut self, source: impl Into<String>) -> Outcome {
        self.dispatch(Action::Edit(source.into()))
            .unwrap_or(Outcome::Ignored)
    }

    pub fn load_example(&mut self, index: usize) -> Result<Outcome, SessionError> {
        self.dispatch(Action::LoadExample(index))
    }

    pub fn run(&mut self) -> Outcome {
        self.dispatch(Action::Run).unwrap_or(Outcome::Ignored)
    }

    pub fn reset(&mut self) -> Outcome {
        self.dispatch(Action::Reset).unwrap_or(Outcome::Ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::share;
    use crate::test_helpers::{CallLog, FakeRuntime};

    fn ready_controller(runtime: FakeRuntime) -> SessionController {
        let mut controller = SessionController::new();
        controller.attach(share(Box::new(runtime)));
        controller
    }

    #[test]
    fn test_run_without_runtime_is_noop() {
        let state = SessionState {
            source: "print(1);".to_string(),
            output: Output::Text("previous".to_string()),
        };

        let next = transition(&state, Action::Run, None).unwrap();

        assert_eq!(next.outcome, Outcome::Ignored);
        assert_eq!(next.state, state);
    }

    #[test]
    fn test_reset_without_runtime_is_noop() {
        let state = SessionState {
            source: "print(1);".to_string(),
            output: Output::Text("previous".to_string()),
        };

        let next = transition(&state, Action::Reset, None).unwrap();

        assert_eq!(next.outcome, Outcome::Ignored);
        assert_eq!(next.state, state);
    }

    #[test]
    fn test_unattached_controller_never_calls_runtime() {
        let calls = CallLog::default();
        // Runtime exists but was never attached
        let _runtime = FakeRuntime::echo(calls.clone());
        let mut controller = SessionController::new();
        controller.edit("print(1);");

        assert_eq!(controller.run(), Outcome::Ignored);
        assert_eq!(controller.reset(), Outcome::Ignored);
        assert_eq!(controller.state().output, Output::default());
        assert!(calls.is_empty());
    }

    #[test]
    fn test_run_output_is_verbatim() {
        let state = SessionState {
            source: "anything".to_string(),
            output: Output::default(),
        };
        let mut runtime = FakeRuntime::new(CallLog::default(), |_| Ok("  7\n\t".to_string()));
        let runtime: &mut dyn RuntimeHandle = &mut runtime;

        let next = transition(&state, Action::Run, Some(runtime)).unwrap();

        assert_eq!(next.outcome, Outcome::Applied);
        assert_eq!(next.state.output, Output::Text("  7\n\t".to_string()));
    }

    #[test]
    fn test_run_failure_is_prefixed() {
        let mut controller = ready_controller(FakeRuntime::throwing(
            CallLog::default(),
            "undefined variable: y",
        ));
        controller.edit("print(y);");

        assert_eq!(controller.run(), Outcome::Applied);
        assert_eq!(
            controller.state().output.as_str(),
            "Error: undefined variable: y"
        );
        assert!(controller.state().output.is_error());
        // Still usable afterwards
        assert_eq!(controller.reset(), Outcome::Applied);
    }

    #[test]
    fn test_run_executes_current_source() {
        let calls = CallLog::default();
        let mut controller = ready_controller(FakeRuntime::echo(calls.clone()));
        controller.edit("");

        controller.run();

        assert_eq!(calls.entries(), vec!["execute:".to_string()]);
        assert_eq!(controller.state().output, Output::Text(String::new()));
    }

    #[test]
    fn test_reset_clears_output_keeps_source() {
        let calls = CallLog::default();
        let mut controller = ready_controller(FakeRuntime::echo(calls.clone()));
        controller.edit("print(1);");
        controller.run();
        assert_eq!(controller.state().output.as_str(), "print(1);");

        assert_eq!(controller.reset(), Outcome::Applied);

        assert_eq!(controller.state().output.as_str(), "");
        assert_eq!(controller.state().source, "print(1);");
        assert_eq!(
            calls.entries(),
            vec!["execute:print(1);".to_string(), "reset".to_string()]
        );
    }

    #[test]
    fn test_reset_clears_error_output() {
        let mut controller =
            ready_controller(FakeRuntime::throwing(CallLog::default(), "boom"));
        controller.run();
        assert!(controller.state().output.is_error());

        controller.reset();

        assert_eq!(controller.state().output, Output::default());
    }

    #[test]
    fn test_reset_failure_is_reported() {
        let mut controller = ready_controller(
            FakeRuntime::echo(CallLog::default()).with_reset_failure("reset exploded"),
        );

        controller.reset();

        assert_eq!(controller.state().output.as_str(), "Error: reset exploded");
    }

    #[test]
    fn test_load_example_without_runtime() {
        let mut controller = SessionController::new();

        let outcome = controller.load_example(0).unwrap();

        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(controller.state().source, "let x = 5;\nprint(x + 2);");
    }

    #[test]
    fn test_load_example_keeps_output() {
        let mut controller = ready_controller(FakeRuntime::echo(CallLog::default()));
        controller.edit("hello");
        controller.run();

        controller.load_example(1).unwrap();

        assert_eq!(controller.state().source, snippets::EXAMPLES[1]);
        assert_eq!(controller.state().output.as_str(), "hello");
    }

    #[test]
    fn test_load_example_out_of_range() {
        let mut controller = SessionController::new();
        controller.edit("keep me");

        let err = controller.load_example(99).unwrap_err();

        assert_eq!(
            err,
            SessionError::ExampleOutOfRange {
                index: 99,
                len: snippets::EXAMPLES.len()
            }
        );
        assert_eq!(controller.state().source, "keep me");
    }

    #[test]
    fn test_busy_runtime_is_not_invoked() {
        let calls = CallLog::default();
        let handle = share(Box::new(FakeRuntime::echo(calls.clone())));
        let mut controller = SessionController::new();
        controller.attach(handle.clone());
        controller.edit("print(1);");

        let _held = handle.lock().unwrap();
        assert_eq!(controller.run(), Outcome::Busy);
        assert_eq!(controller.reset(), Outcome::Busy);

        assert!(calls.is_empty());
        assert_eq!(controller.state().output, Output::default());
    }
}
