//! WebAssembly interpreter artifact
//!
//! Loads the interpreter from a `.wasm` file with wasmtime. The artifact
//! talks to the host through a small ABI:
//!
//! - `memory` and `allocate(len) -> ptr` for passing source text in
//! - the factory entry point (`create_interpreter` by default), called
//!   once right after instantiation
//! - `run_code(ptr, len) -> u64` returning `(ptr << 32) | len` of the
//!   UTF-8 output
//! - `reset_interpreter()`
//! - optionally `last_error() -> u64`, a packed pointer/length that is
//!   non-empty when the previous call threw
//!
//! A trap inside the artifact is also reported as a thrown failure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use wasmtime::{Engine, Instance, Memory, Module, Store, TypedFunc};

use crate::loader::LoadError;
use crate::runtime::{RuntimeFactory, RuntimeFailure, RuntimeHandle};

pub const DEFAULT_ENTRY_POINT: &str = "create_interpreter";

/// Reads and instantiates the artifact at a fixed location
pub struct WasmFactory {
    engine: Engine,
    location: PathBuf,
    entry_point: String,
}

impl WasmFactory {
    pub fn new(location: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        Self {
            engine: Engine::default(),
            location: location.into(),
            entry_point: entry_point.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

#[async_trait]
impl RuntimeFactory for WasmFactory {
    fn describe(&self) -> String {
        self.location.display().to_string()
    }

    async fn create(&self) -> Result<Box<dyn RuntimeHandle>, LoadError> {
        let bytes = tokio::fs::read(&self.location)
            .await
            .map_err(|e| LoadError::Fetch(format!("{}: {}", self.location.display(), e)))?;
        debug!(bytes = bytes.len(), "Fetched interpreter artifact");

        // Compilation is CPU bound
        let engine = self.engine.clone();
        let entry_point = self.entry_point.clone();
        let runtime = tokio::task::spawn_blocking(move || {
            WasmRuntime::instantiate(&engine, &bytes, &entry_point)
        })
        .await
        .map_err(|e| LoadError::Instantiate(format!("instantiation task failed: {e}")))??;

        Ok(Box::new(runtime))
    }
}

/// An instantiated interpreter artifact
pub struct WasmRuntime {
    store: Store<()>,
    memory: Memory,
    allocate: TypedFunc<u32, u32>,
    run_code: TypedFunc<(u32, u32), u64>,
    reset_interpreter: TypedFunc<(), ()>,
    last_error: Option<TypedFunc<(), u64>>,
}

impl WasmRuntime {
    pub fn instantiate(
        engine: &Engine,
        bytes: &[u8],
        entry_point: &str,
    ) -> Result<Self, LoadError> {
        let module = Module::new(engine, bytes)
            .map_err(|e| LoadError::Instantiate(format!("failed to compile: {e}")))?;
        let mut store = Store::new(engine, ());

        // The artifact gets no imports from the host
        let instance = Instance::new(&mut store, &module, &[])
            .map_err(|e| LoadError::Instantiate(format!("failed to instantiate: {e}")))?;

        let factory = instance
            .get_func(&mut store, entry_point)
            .ok_or_else(|| LoadError::EntryPointMissing(entry_point.to_string()))?
            .typed::<(), ()>(&store)
            .map_err(|e| {
                LoadError::Instantiate(format!("entry point '{entry_point}' has the wrong type: {e}"))
            })?;
        factory
            .call(&mut store, ())
            .map_err(|e| LoadError::Instantiate(format!("entry point '{entry_point}' failed: {e:#}")))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| LoadError::Instantiate("artifact must export 'memory'".to_string()))?;
        let allocate = required_func(&instance, &mut store, "allocate")?;
        let run_code = required_func(&instance, &mut store, "run_code")?;
        let reset_interpreter = required_func(&instance, &mut store, "reset_interpreter")?;
        let last_error = match instance.get_func(&mut store, "last_error") {
            Some(func) => Some(func.typed::<(), u64>(&store).map_err(|e| {
                LoadError::Instantiate(format!("'last_error' has the wrong type: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            store,
            memory,
            allocate,
            run_code,
            reset_interpreter,
            last_error,
        })
    }

    fn write_input(&mut self, input: &[u8]) -> Result<u32, RuntimeFailure> {
        let len = u32::try_from(input.len())
            .map_err(|_| RuntimeFailure::new("source text is too large"))?;
        let ptr = self.allocate.call(&mut self.store, len).map_err(trapped)?;
        self.memory
            .write(&mut self.store, ptr as usize, input)
            .map_err(|e| RuntimeFailure::new(format!("failed to write source: {e}")))?;
        Ok(ptr)
    }

    fn read_packed(&self, packed: u64) -> Result<Vec<u8>, RuntimeFailure> {
        let ptr = (packed >> 32) as usize;
        let len = (packed & 0xffff_ffff) as usize;
        let data = self.memory.data(&self.store);
        let bytes = ptr
            .checked_add(len)
            .and_then(|end| data.get(ptr..end))
            .ok_or_else(|| {
                RuntimeFailure::new(format!(
                    "result at {ptr}+{len} is outside guest memory ({} bytes)",
                    data.len()
                ))
            })?;
        Ok(bytes.to_vec())
    }

    /// Surface a failure the artifact recorded during the previous call
    fn check_last_error(&mut self) -> Result<(), RuntimeFailure> {
        let Some(last_error) = self.last_error.as_ref() else {
            return Ok(());
        };
        let packed = last_error.call(&mut self.store, ()).map_err(trapped)?;
        if packed & 0xffff_ffff == 0 {
            return Ok(());
        }
        let message = self.read_packed(packed)?;
        Err(RuntimeFailure::new(String::from_utf8_lossy(&message)))
    }
}

impl RuntimeHandle for WasmRuntime {
    fn execute(&mut self, source: &str) -> Result<String, RuntimeFailure> {
        let ptr = self.write_input(source.as_bytes())?;
        let packed = self
            .run_code
            .call(&mut self.store, (ptr, source.len() as u32))
            .map_err(trapped)?;
        self.check_last_error()?;

        let output = self.read_packed(packed)?;
        String::from_utf8(output)
            .map_err(|e| RuntimeFailure::new(format!("output is not valid UTF-8: {e}")))
    }

    fn reset_state(&mut self) -> Result<(), RuntimeFailure> {
        self.reset_interpreter
            .call(&mut self.store, ())
            .map_err(trapped)?;
        self.check_last_error()
    }
}

fn required_func<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &str,
) -> Result<TypedFunc<P, R>, LoadError>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|e| LoadError::Instantiate(format!("'{name}' function not found: {e}")))
}

fn trapped(err: wasmtime::Error) -> RuntimeFailure {
    RuntimeFailure::new(format!("{err:#}"))
}
