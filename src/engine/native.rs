//! Native IR generator entry point
//!
//! The IR generator is called directly rather than spawned: it is a routine
//! `(source, output, log) -> status` exported from a shared library. Where the
//! library lives is an explicit [`NativeInit`] value handed to the routine,
//! not a process-wide search path.

use std::ffi::{c_char, c_int, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use libloading::{Library, Symbol};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::error::RunnerError;

type GenerateFn = unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> c_int;

/// Location and entry point of the native generator library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeInit {
    /// Directory the library is loaded from
    pub dir: PathBuf,
    /// Base name, e.g. `Generator` for `Generator.dll` / `libGenerator.so`
    pub name: String,
    /// Exported symbol
    pub symbol: String,
}

fn default_library_dir() -> PathBuf {
    if cfg!(debug_assertions) {
        PathBuf::from("bin/x64/Debug")
    } else {
        PathBuf::from("bin/x64/Release")
    }
}

impl Default for NativeInit {
    fn default() -> Self {
        Self {
            dir: default_library_dir(),
            name: "Generator".to_string(),
            symbol: "GenIR".to_string(),
        }
    }
}

impl NativeInit {
    /// Platform-specific file name of the library inside `dir`
    pub fn library_path(&self) -> PathBuf {
        self.dir.join(libloading::library_filename(&self.name))
    }
}

/// A status-returning routine; zero means success
pub trait NativeRoutine: Send + Sync {
    fn invoke(&self, source: &Path, output: &Path, log: Option<&Path>) -> Result<i32, RunnerError>;

    /// Name used in logs and diagnostics
    fn describe(&self) -> String;
}

/// Generator exported from a shared library, loaded on first use
pub struct SharedLibraryRoutine {
    init: NativeInit,
    library: Mutex<Option<Library>>,
}

impl SharedLibraryRoutine {
    pub fn new(init: NativeInit) -> Self {
        Self {
            init,
            library: Mutex::new(None),
        }
    }

    pub fn init(&self) -> &NativeInit {
        &self.init
    }

    fn c_path(&self, path: &Path) -> Result<CString, RunnerError> {
        CString::new(path.to_string_lossy().into_owned()).map_err(|_| {
            RunnerError::InvalidArgument {
                program: self.describe(),
                message: format!("path contains a NUL byte: {}", path.display()),
            }
        })
    }
}

impl fmt::Debug for SharedLibraryRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLibraryRoutine")
            .field("init", &self.init)
            .finish_non_exhaustive()
    }
}

impl NativeRoutine for SharedLibraryRoutine {
    fn invoke(&self, source: &Path, output: &Path, log: Option<&Path>) -> Result<i32, RunnerError> {
        let source = self.c_path(source)?;
        let output = self.c_path(output)?;
        let log = log.map(|p| self.c_path(p)).transpose()?;

        // The generator keeps global state, so calls are serialized by this lock.
        let mut guard = self
            .library
            .lock()
            .map_err(|_| RunnerError::NativeLoad("generator lock poisoned".to_string()))?;

        if guard.is_none() {
            let path = self.init.library_path();
            info!(library = %path.display(), "Loading native generator");
            // SAFETY: runs the library's initialisers.
            let library = unsafe { Library::new(&path) }.map_err(|e| {
                RunnerError::NativeLoad(format!("cannot load {}: {}", path.display(), e))
            })?;
            *guard = Some(library);
        }

        let Some(library) = guard.as_ref() else {
            return Err(RunnerError::NativeLoad("generator library not loaded".to_string()));
        };

        // SAFETY: the exported symbol has the `GenerateFn` signature.
        let entry: Symbol<GenerateFn> = unsafe { library.get(self.init.symbol.as_bytes()) }
            .map_err(|e| {
                RunnerError::NativeLoad(format!("missing symbol '{}': {}", self.init.symbol, e))
            })?;

        debug!(symbol = %self.init.symbol, "Calling native generator");
        // SAFETY: all pointers are valid NUL-terminated strings for the duration of the call.
        let status = unsafe {
            entry(
                source.as_ptr(),
                output.as_ptr(),
                log.as_ref().map_or(std::ptr::null(), |l| l.as_ptr()),
            )
        };

        Ok(status)
    }

    fn describe(&self) -> String {
        format!("{}!{}", self.init.library_path().display(), self.init.symbol)
    }
}

/// A routine backed by a Rust closure
pub struct FnRoutine<F> {
    name: String,
    f: F,
}

impl<F> FnRoutine<F>
where
    F: Fn(&Path, &Path, Option<&Path>) -> i32 + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> NativeRoutine for FnRoutine<F>
where
    F: Fn(&Path, &Path, Option<&Path>) -> i32 + Send + Sync,
{
    fn invoke(&self, source: &Path, output: &Path, log: Option<&Path>) -> Result<i32, RunnerError> {
        Ok((self.f)(source, output, log))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
