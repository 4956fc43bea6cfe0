//! Extern function linkage.
//!
//! An extern is resolved once, before `Main` runs. Host functions registered
//! by the embedder win; otherwise the library is opened with `libloading`
//! and the symbol looked up in it. Opened libraries stay cached in the
//! [`Linker`] so resolved pointers remain valid for the VM's lifetime.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, warn};

use crate::error::{VmError, VmResult};
use crate::value::Value;

/// Registers `r1..r10` passed to every native call.
pub const NATIVE_ARG_COUNT: usize = 10;

/// Arguments of a native call, `r1` first.
pub type NativeArgs = [Value; NATIVE_ARG_COUNT];

/// C signature every extern is called through. Surplus integer arguments
/// are ignored by callees on the supported ABIs.
pub type RawNative =
    unsafe extern "C" fn(u64, u64, u64, u64, u64, u64, u64, u64, u64, u64) -> u64;

type HostFn = dyn Fn(&NativeArgs) -> Value + Send + Sync;

/// Rust functions an embedder exposes to bytecode as externs.
#[derive(Default, Clone)]
pub struct HostFunctions {
    functions: HashMap<(String, String), Arc<HostFn>>,
}

impl HostFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `@extern("library", "symbol")` with `f`.
    pub fn register(
        &mut self,
        library: impl Into<String>,
        symbol: impl Into<String>,
        f: impl Fn(&NativeArgs) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.functions
            .insert((library.into(), symbol.into()), Arc::new(f));
        self
    }

    fn lookup(&self, library: &str, symbol: &str) -> Option<Arc<HostFn>> {
        self.functions
            .get(&(library.to_string(), symbol.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for HostFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

/// A resolved extern.
#[derive(Clone)]
pub enum NativeFn {
    Host(Arc<HostFn>),
    Dynamic(RawNative),
}

impl NativeFn {
    pub fn call(&self, args: &NativeArgs) -> Value {
        match self {
            NativeFn::Host(f) => f(args),
            NativeFn::Dynamic(f) => {
                let a = args.map(Value::bits);
                // SAFETY: the pointer came from a library the linker keeps
                // loaded, and the extern declaration is the caller's contract
                // for its signature.
                let ret = unsafe { f(a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7], a[8], a[9]) };
                Value::from_bits(ret)
            }
        }
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeFn::Host(_) => f.write_str("NativeFn::Host"),
            NativeFn::Dynamic(ptr) => write!(f, "NativeFn::Dynamic({:p})", *ptr as *const ()),
        }
    }
}

/// Resolves externs and owns the libraries it opened.
#[derive(Default)]
pub struct Linker {
    search_paths: Vec<PathBuf>,
    libraries: HashMap<String, Library>,
}

impl Linker {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            libraries: HashMap::new(),
        }
    }

    #[tracing::instrument(skip(self, host))]
    pub fn resolve(
        &mut self,
        host: &HostFunctions,
        library: &str,
        symbol: &str,
    ) -> VmResult<NativeFn> {
        if let Some(f) = host.lookup(library, symbol) {
            debug!("bound to host function");
            return Ok(NativeFn::Host(f));
        }

        let lib = self.open(library, symbol)?;
        // SAFETY: the symbol is only ever called through `RawNative`; the
        // library outlives the pointer because the linker caches it.
        let raw = unsafe { lib.get::<RawNative>(symbol.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|e| link_error(library, symbol, e.to_string()))?;
        debug!("bound to dynamic symbol");
        Ok(NativeFn::Dynamic(raw))
    }

    /// Open `library` by its platform file name, trying the search paths
    /// before the system loader's own search.
    fn open(&mut self, library: &str, symbol: &str) -> VmResult<&Library> {
        if !self.libraries.contains_key(library) {
            let file_name = libloading::library_filename(library);
            let mut candidates: Vec<PathBuf> = self
                .search_paths
                .iter()
                .map(|dir| dir.join(&file_name))
                .filter(|p| p.exists())
                .collect();
            candidates.push(PathBuf::from(&file_name));

            let mut last_error = String::from("no candidate paths");
            let mut opened = None;
            for path in candidates {
                // SAFETY: loading runs the library's initialisers; externs
                // name libraries the program was written against.
                match unsafe { Library::new(&path) } {
                    Ok(lib) => {
                        debug!(path = %path.display(), "library opened");
                        opened = Some(lib);
                        break;
                    }
                    Err(e) => last_error = e.to_string(),
                }
            }
            let Some(lib) = opened else {
                warn!(library, "library could not be opened");
                return Err(link_error(library, symbol, last_error));
            };
            self.libraries.insert(library.to_string(), lib);
        }
        self.libraries
            .get(library)
            .ok_or_else(|| link_error(library, symbol, "library cache miss".into()))
    }

    pub fn loaded_libraries(&self) -> usize {
        self.libraries.len()
    }
}

fn link_error(library: &str, symbol: &str, reason: String) -> VmError {
    VmError::Link {
        library: library.to_string(),
        symbol: symbol.to_string(),
        reason,
    }
}
