//! Dynamic library loading and symbol resolution
//!
//! Cross-platform loading via `libloading` with two success-only caches:
//! libraries keyed by normalized path, resolved symbols keyed by
//! (normalized path, symbol name). Failed loads and failed resolutions
//! are never cached, so a retry after the environment changes can
//! succeed.
//!
//! # Safety
//!
//! Loading a library executes its initialization code in-process; callers
//! must trust what they load. Resolved code pointers are kept valid by
//! co-owning the library inside every `FunctionHandle`.

use libloading::Library;
use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Library loading errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Library file not found in search paths
    #[error("library not found: {0}")]
    NotFound(String),
    /// The system loader rejected the library
    #[error("failed to load library '{path}': {message}")]
    LoadFailed { path: String, message: String },
}

/// Symbol resolution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolError {
    /// Symbol absent from the (successfully loaded) library
    #[error("symbol '{symbol}' not found in library '{library}'")]
    NotFound { library: String, symbol: String },
    /// Symbol name not representable as a C string
    #[error("invalid symbol name: {0}")]
    InvalidName(String),
    /// The owning library could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Cheap-clone handle to a loaded library.
///
/// Equality is cache identity: two loads of the same normalized path
/// yield handles that compare equal.
#[derive(Clone)]
pub struct LibraryHandle {
    library: Arc<Library>,
    path: Arc<str>,
}

impl LibraryHandle {
    /// Normalized path this library was cached under.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PartialEq for LibraryHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.library, &other.library)
    }
}

impl std::fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .finish()
    }
}

/// A resolved symbol: the code pointer plus an owning reference to the
/// library it came from, so the pointer can never outlive the loaded
/// image.
#[derive(Clone)]
pub struct FunctionHandle {
    code: *const c_void,
    symbol: Arc<str>,
    _library: Arc<Library>,
}

// The code pointer addresses immutable loaded text and the library is
// kept alive by the Arc, so handles may cross threads.
unsafe impl Send for FunctionHandle {}
unsafe impl Sync for FunctionHandle {}

impl FunctionHandle {
    /// Raw code pointer for this symbol.
    pub fn code_ptr(&self) -> *const c_void {
        self.code
    }

    /// Symbol name this handle was resolved from.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl std::fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("symbol", &self.symbol)
            .field("code", &self.code)
            .finish()
    }
}

struct CacheInner {
    /// Loaded libraries by normalized path; success-only
    libraries: HashMap<String, Arc<Library>>,
    /// Resolved symbols by (normalized path, symbol); success-only
    symbols: HashMap<(String, String), FunctionHandle>,
    /// Library search paths, highest priority first
    search_paths: Vec<PathBuf>,
    /// Actual native loads performed (cache hits excluded)
    loads: u64,
}

/// Process-shared library and symbol cache.
///
/// All state lives behind one mutex; no lock is held while a resolved
/// function is being invoked.
pub struct LibraryCache {
    inner: Mutex<CacheInner>,
}

impl LibraryCache {
    /// Create a cache with the platform's default search paths.
    pub fn new() -> Self {
        Self::with_search_paths(Self::default_search_paths())
    }

    /// Create a cache with an explicit search path list (highest priority
    /// first).
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                libraries: HashMap::new(),
                symbols: HashMap::new(),
                search_paths,
                loads: 0,
            }),
        }
    }

    /// Platform-specific default search paths.
    ///
    /// - Linux: /usr/lib, /usr/local/lib, /lib (plus lib64 variants)
    /// - macOS: /usr/lib, /usr/local/lib, /opt/homebrew/lib
    /// - Windows: System32
    /// - All platforms: current working directory first
    pub fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/lib"));

            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
                paths.push(PathBuf::from("/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            paths.push(PathBuf::from("C:\\Windows\\System32"));
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.insert(0, cwd);
        }

        paths
    }

    /// Prepend a search path (takes priority over existing entries).
    pub fn add_search_path(&self, path: PathBuf) {
        self.lock().search_paths.insert(0, path);
    }

    /// Load a library by name or path.
    ///
    /// Idempotent: repeated calls with the same normalized path return
    /// the identical cached handle and perform no redundant native load.
    /// Only successful loads are cached; a failed load may be retried.
    pub fn load(&self, name: &str) -> Result<LibraryHandle, LoadError> {
        let mut inner = self.lock();
        let key = resolve_key(name, &inner.search_paths)?;

        if let Some(library) = inner.libraries.get(&key) {
            return Ok(LibraryHandle {
                library: Arc::clone(library),
                path: Arc::from(key.as_str()),
            });
        }

        let library = unsafe { Library::new(&key) }.map_err(|e| LoadError::LoadFailed {
            path: key.clone(),
            message: e.to_string(),
        })?;

        log::debug!("loaded native library {}", key);
        let library = Arc::new(library);
        inner.libraries.insert(key.clone(), Arc::clone(&library));
        inner.loads += 1;

        Ok(LibraryHandle {
            library,
            path: Arc::from(key.as_str()),
        })
    }

    /// Resolve a symbol, loading the library first if needed.
    ///
    /// Cached per (normalized path, symbol) on success only; a failed
    /// resolution is not cached and may be retried.
    pub fn resolve(&self, name: &str, symbol: &str) -> Result<FunctionHandle, SymbolError> {
        let c_name = CString::new(symbol)
            .map_err(|_| SymbolError::InvalidName(symbol.to_string()))?;

        let handle = self.load(name)?;
        let key = (handle.path().to_string(), symbol.to_string());

        let mut inner = self.lock();
        if let Some(cached) = inner.symbols.get(&key) {
            return Ok(cached.clone());
        }

        let code: *const c_void = unsafe {
            let sym: libloading::Symbol<'_, unsafe extern "C" fn()> = handle
                .library
                .get(c_name.as_bytes_with_nul())
                .map_err(|_| SymbolError::NotFound {
                    library: handle.path().to_string(),
                    symbol: symbol.to_string(),
                })?;
            (*sym) as *const c_void
        };

        log::debug!("resolved symbol {}::{}", handle.path(), symbol);
        let resolved = FunctionHandle {
            code,
            symbol: Arc::from(symbol),
            _library: Arc::clone(&handle.library),
        };
        inner.symbols.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Drop a library and its cached symbols from the cache.
    ///
    /// Returns whether an entry was removed. Outstanding handles co-own
    /// the library and remain usable; the next `load` performs a fresh
    /// native load.
    pub fn unload(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Ok(key) = resolve_key(name, &inner.search_paths) else {
            return false;
        };
        let removed = inner.libraries.remove(&key).is_some();
        if removed {
            inner.symbols.retain(|(path, _), _| path != &key);
            log::debug!("unloaded native library {}", key);
        }
        removed
    }

    /// Number of libraries currently cached.
    pub fn loaded_count(&self) -> usize {
        self.lock().libraries.len()
    }

    /// Number of symbols currently cached.
    pub fn resolved_count(&self) -> usize {
        self.lock().symbols.len()
    }

    /// Total native loads performed (cache hits excluded).
    pub fn load_count(&self) -> u64 {
        self.lock().loads
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // A poisoned cache is still structurally sound: entries are
        // inserted atomically under the lock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LibraryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a library name to its cache key.
///
/// Path-like names must exist and canonicalize; bare names are searched
/// through the configured paths with platform prefix/extension variants,
/// falling back to a platform file name handed to the system loader's own
/// search.
fn resolve_key(name: &str, search_paths: &[PathBuf]) -> Result<String, LoadError> {
    let path = Path::new(name);
    let path_like = path.is_absolute() || name.contains('/') || name.contains('\\');

    if path_like {
        return match std::fs::canonicalize(path) {
            Ok(normalized) => Ok(normalized.to_string_lossy().into_owned()),
            Err(_) => Err(LoadError::NotFound(name.to_string())),
        };
    }

    // Exact file name in each search path
    for search_path in search_paths {
        let candidate = search_path.join(name);
        if candidate.exists() {
            if let Ok(normalized) = std::fs::canonicalize(&candidate) {
                return Ok(normalized.to_string_lossy().into_owned());
            }
        }
    }

    // Platform prefix/extension matrix
    let extensions: &[&str] = if cfg!(target_os = "windows") {
        &["dll"]
    } else if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else {
        &["so"]
    };
    let prefixes: &[&str] = if cfg!(target_os = "windows") {
        &["", "lib"]
    } else {
        &["lib", ""]
    };

    for search_path in search_paths {
        for prefix in prefixes {
            for ext in extensions {
                let candidate = search_path.join(format!("{}{}.{}", prefix, name, ext));
                if candidate.exists() {
                    if let Ok(normalized) = std::fs::canonicalize(&candidate) {
                        return Ok(normalized.to_string_lossy().into_owned());
                    }
                }
            }
        }
    }

    // Let the system loader search its own paths under a platform file
    // name; the name itself is the cache key, so idempotence holds.
    if has_library_affix(name) {
        Ok(name.to_string())
    } else {
        Ok(platform_file_name(name))
    }
}

fn has_library_affix(name: &str) -> bool {
    name.contains(".so") || name.ends_with(".dylib") || name.ends_with(".dll")
}

/// Platform file name for a bare library name.
fn platform_file_name(name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{}.dll", name)
    }
    #[cfg(target_os = "macos")]
    {
        format!("lib{}.dylib", name)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        format!("lib{}.so", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_search_paths_not_empty() {
        let paths = LibraryCache::default_search_paths();
        assert!(!paths.is_empty());

        if let Ok(cwd) = std::env::current_dir() {
            assert_eq!(paths[0], cwd);
        }
    }

    #[test]
    fn platform_specific_paths_present() {
        let paths = LibraryCache::default_search_paths();

        #[cfg(target_os = "linux")]
        assert!(paths.iter().any(|p| p == Path::new("/usr/lib")));

        #[cfg(target_os = "macos")]
        assert!(paths.iter().any(|p| p == Path::new("/usr/lib")));

        #[cfg(target_os = "windows")]
        assert!(paths
            .iter()
            .any(|p| p.to_string_lossy().contains("System32")));
    }

    #[test]
    fn missing_path_like_library_is_not_found() {
        let cache = LibraryCache::new();
        let result = cache.load("/no/such/dir/libnothing_xyz.so");
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = LibraryCache::new();
        assert!(cache.load("nonexistent_library_xyz").is_err());
        assert!(cache.load("nonexistent_library_xyz").is_err());
        assert_eq!(cache.loaded_count(), 0);
        assert_eq!(cache.load_count(), 0);
    }

    #[test]
    fn failed_resolution_is_not_cached() {
        let cache = LibraryCache::new();
        let result = cache.resolve("nonexistent_library_xyz", "some_symbol");
        assert!(matches!(result, Err(SymbolError::Load(_))));
        assert_eq!(cache.resolved_count(), 0);
    }

    #[test]
    fn invalid_symbol_name_rejected_before_loading() {
        let cache = LibraryCache::new();
        let result = cache.resolve("whatever", "bad\0name");
        assert!(matches!(result, Err(SymbolError::InvalidName(_))));
    }

    #[test]
    fn add_search_path_takes_priority() {
        let cache = LibraryCache::new();
        let custom = PathBuf::from("/custom/path");
        cache.add_search_path(custom.clone());
        assert_eq!(cache.lock().search_paths[0], custom);
    }

    #[test]
    fn unload_of_unknown_library_is_false() {
        let cache = LibraryCache::new();
        assert!(!cache.unload("nonexistent_library_xyz"));
    }

    #[test]
    fn bare_name_key_is_stable() {
        // Same bare name resolves to the same cache key both times, even
        // when nothing on disk matches.
        let paths = vec![PathBuf::from("/definitely/not/here")];
        let a = resolve_key("m", &paths).unwrap();
        let b = resolve_key("m", &paths).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn soname_with_affix_passes_through() {
        let paths: Vec<PathBuf> = Vec::new();
        let key = resolve_key("libm.so.6", &paths).unwrap();
        assert_eq!(key, "libm.so.6");
    }
}
