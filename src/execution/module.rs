//! Dynamic shared-module execution.
//!
//! A [`DynamicModuleExecutor`] loads one shared library at `init` and runs
//! jobs by calling functions it exports. OS loader primitives stay behind the
//! [`ModuleLoader`] / [`LoadedModule`] traits; [`LibraryLoader`] is the
//! `libloading` implementation.
//!
//! Exported functions use the C ABI:
//!
//! ```c
//! int entry(const char *argument); /* 0 = success */
//! ```

use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use libloading::Library;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use super::job::{Job, JobContext, JobOutcome};
use super::strategy::{ProcessingStrategy, StrategyError};

const MODULE_STRATEGY: &str = "dynamic-module";

/// Signature every callable module export must have.
pub type ModuleEntryPoint = unsafe extern "C" fn(argument: *const c_char) -> c_int;

/// Module loading and symbol resolution failures.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load module {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    #[error("Symbol '{symbol}' not found in module: {reason}")]
    SymbolNotFound { symbol: String, reason: String },
}

impl ModuleError {
    /// The module itself could not be opened.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::LoadFailed { .. })
    }

    pub fn is_symbol_error(&self) -> bool {
        matches!(self, Self::SymbolNotFound { .. })
    }
}

/// An open module. Dropping it closes the underlying handle.
pub trait LoadedModule: Send + Sync {
    fn path(&self) -> &Path;

    /// Look up an exported function by name.
    fn resolve(&self, symbol: &str) -> Result<ModuleEntryPoint, ModuleError>;
}

/// Opens modules by path.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, ModuleError>;
}

/// [`ModuleLoader`] backed by the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

struct LibraryModule {
    path: PathBuf,
    library: Library,
}

impl ModuleLoader for LibraryLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, ModuleError> {
        if !path.exists() {
            return Err(ModuleError::NotFound(path.to_path_buf()));
        }
        // SAFETY: loading runs the module's initialisers; modules are trusted
        // deployment artefacts configured by the operator.
        let library = unsafe { Library::new(path) }.map_err(|e| ModuleError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(LibraryModule {
            path: path.to_path_buf(),
            library,
        }))
    }
}

impl LoadedModule for LibraryModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, symbol: &str) -> Result<ModuleEntryPoint, ModuleError> {
        // SAFETY: the export is required to match `ModuleEntryPoint`. The copied
        // pointer is only used while `library` stays loaded.
        let entry = unsafe { self.library.get::<ModuleEntryPoint>(symbol.as_bytes()) }
            .map_err(|e| ModuleError::SymbolNotFound {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;
        Ok(*entry)
    }
}

/// An open module together with the symbols resolved from it. Both live and
/// die under the same lock, so a cached entry never outlives its library.
struct ModuleState {
    module: Box<dyn LoadedModule>,
    resolved: Mutex<HashMap<String, ModuleEntryPoint>>,
}

impl ModuleState {
    fn new(module: Box<dyn LoadedModule>) -> Self {
        Self {
            module,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_cached(&self, symbol: &str) -> Result<ModuleEntryPoint, ModuleError> {
        if let Some(entry) = self.resolved.lock().get(symbol) {
            return Ok(*entry);
        }
        let entry = self.module.resolve(symbol)?;
        self.resolved.lock().insert(symbol.to_string(), entry);
        Ok(entry)
    }
}

/// Registers the current thread as running a job on the executor until
/// dropped.
struct CallerGuard<'a> {
    callers: &'a Mutex<Vec<ThreadId>>,
    thread: ThreadId,
}

impl<'a> CallerGuard<'a> {
    fn enter(callers: &'a Mutex<Vec<ThreadId>>) -> Self {
        let thread = thread::current().id();
        callers.lock().push(thread);
        Self { callers, thread }
    }
}

impl Drop for CallerGuard<'_> {
    fn drop(&mut self) {
        let mut callers = self.callers.lock();
        if let Some(pos) = callers.iter().position(|t| *t == self.thread) {
            callers.swap_remove(pos);
        }
    }
}

/// Runs jobs through functions exported by a dynamically loaded module.
///
/// The module stays loaded from a successful `init` until `stop` (or drop),
/// which unloads it exactly once. Calls hold a read lock on the handle and
/// the unload takes the write lock, so no call can reach an unloaded module.
///
/// A job that stops its own executor does not wait for itself: the executor
/// stops accepting work at once and the module is unloaded when that job
/// returns.
pub struct DynamicModuleExecutor {
    path: RwLock<PathBuf>,
    entry_point: Option<String>,
    loader: Box<dyn ModuleLoader>,
    state: RwLock<Option<ModuleState>>,
    closing: AtomicBool,
    callers: Mutex<Vec<ThreadId>>,
}

impl DynamicModuleExecutor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_loader(path, LibraryLoader)
    }

    pub fn with_loader(path: impl Into<PathBuf>, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            path: RwLock::new(path.into()),
            entry_point: None,
            loader: Box::new(loader),
            state: RwLock::new(None),
            closing: AtomicBool::new(false),
            callers: Mutex::new(Vec::new()),
        }
    }

    /// Function called by module-call jobs that name no symbol.
    pub fn with_entry_point(mut self, symbol: impl Into<String>) -> Self {
        self.entry_point = Some(symbol.into());
        self
    }

    pub fn module_path(&self) -> PathBuf {
        self.path.read().clone()
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    /// Point the executor at a different module, e.g. after a failed `init`.
    pub fn set_module_path(&self, path: impl Into<PathBuf>) -> Result<(), StrategyError> {
        if self.state.read().is_some() {
            return Err(StrategyError::AlreadyInitialized {
                strategy: MODULE_STRATEGY,
            });
        }
        *self.path.write() = path.into();
        Ok(())
    }

    /// Resolve an exported function of the loaded module.
    pub fn resolve_symbol(&self, symbol: &str) -> Result<ModuleEntryPoint, StrategyError> {
        let guard = self.state.read();
        let state = self.open_state(&guard)?;
        Ok(state.resolve_cached(symbol)?)
    }

    fn open_state<'g>(
        &self,
        guard: &'g Option<ModuleState>,
    ) -> Result<&'g ModuleState, StrategyError> {
        match guard.as_ref() {
            Some(state) if !self.closing.load(Ordering::SeqCst) => Ok(state),
            _ => Err(StrategyError::NotInitialized {
                strategy: MODULE_STRATEGY,
            }),
        }
    }

    fn is_caller(&self) -> bool {
        let current = thread::current().id();
        self.callers.lock().contains(&current)
    }

    fn target_symbol(&self, symbol: String) -> Result<String, StrategyError> {
        if !symbol.is_empty() {
            return Ok(symbol);
        }
        self.entry_point
            .clone()
            .ok_or_else(|| StrategyError::InvalidJob("module call names no symbol".to_string()))
    }

    fn call(&self, state: &ModuleState, symbol: &str, argument: &str) -> Result<(), StrategyError> {
        let entry = state.resolve_cached(symbol)?;
        let argument = CString::new(argument).map_err(|_| {
            StrategyError::InvalidJob(format!("argument for '{}' contains a NUL byte", symbol))
        })?;

        // SAFETY: `entry` was resolved from `state.module`, which the caller
        // keeps loaded via the read guard; the argument outlives the call.
        let code = unsafe { entry(argument.as_ptr()) };
        if code != 0 {
            return Err(StrategyError::InvocationFailed {
                symbol: symbol.to_string(),
                code,
            });
        }
        Ok(())
    }

    fn dispatch(&self, state: &ModuleState, mut job: Job) -> Result<(), StrategyError> {
        let Some((symbol, argument)) = job.take_module_call() else {
            let outcome = job.run(&JobContext::for_module(MODULE_STRATEGY, state.module.as_ref()));
            if !outcome.is_success() {
                tracing::warn!(outcome = outcome.as_str(), "module job did not complete");
            }
            return Ok(());
        };

        let result = self
            .target_symbol(symbol)
            .and_then(|symbol| self.call(state, &symbol, &argument));
        match &result {
            Ok(()) => job.finish(JobOutcome::Completed),
            Err(e) => {
                tracing::warn!(error = %e, "module call failed");
                job.finish(JobOutcome::Failed(e.to_string()));
            }
        }
        result
    }

    /// Drop the module and its symbol cache under the write lock.
    fn unload(&self) {
        let mut guard = self.state.write();
        self.closing.store(false, Ordering::SeqCst);
        if let Some(state) = guard.take() {
            tracing::info!(path = %state.module.path().display(), "module unloaded");
            drop(state);
        }
    }
}

impl ProcessingStrategy for DynamicModuleExecutor {
    fn name(&self) -> &'static str {
        MODULE_STRATEGY
    }

    /// Open the module. A failure leaves the executor uninitialized, so a
    /// retry (possibly after [`set_module_path`](Self::set_module_path)) is
    /// allowed.
    fn init(&self) -> Result<(), StrategyError> {
        let mut guard = self.state.write();
        if self.closing.swap(false, Ordering::SeqCst) {
            // A stop deferred by a running job; finish it before reopening.
            guard.take();
        }
        if guard.is_some() {
            return Err(StrategyError::AlreadyInitialized {
                strategy: MODULE_STRATEGY,
            });
        }

        let path = self.module_path();
        match self.loader.open(&path) {
            Ok(loaded) => {
                tracing::info!(path = %path.display(), "module loaded");
                *guard = Some(ModuleState::new(loaded));
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "module load failed");
                Err(e.into())
            }
        }
    }

    /// Module calls run synchronously; their failures come back both through
    /// the job and as the returned error. Closure jobs run inline with access
    /// to the module through [`JobContext::module`].
    fn process(&self, job: Job) -> Result<(), StrategyError> {
        let guard = self.state.read();
        let state = self.open_state(&guard)?;

        let caller = CallerGuard::enter(&self.callers);
        let result = self.dispatch(state, job);
        drop(caller);
        drop(guard);

        if self.closing.load(Ordering::SeqCst) && !self.is_caller() {
            self.unload();
        }
        result
    }

    fn stop(&self) {
        if self.is_caller() {
            // Called from a job this executor is running: the read guard is
            // ours, so unload once the job returns.
            self.closing.store(true, Ordering::SeqCst);
            tracing::debug!("module stop deferred until the running job returns");
            return;
        }
        self.unload();
    }

    fn is_running(&self) -> bool {
        self.state.read().is_some() && !self.closing.load(Ordering::SeqCst)
    }
}

impl Drop for DynamicModuleExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DynamicModuleExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicModuleExecutor")
            .field("path", &*self.path.read())
            .field("entry_point", &self.entry_point)
            .field("loaded", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
