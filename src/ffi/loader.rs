//! Dynamic Library Loader
//!
//! Thin layer over libloading: image handles that can be passed across the
//! boundary as plain pointers, and a loaded-library wrapper with a symbol
//! cache.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::{Library, Symbol};
use parking_lot::Mutex;

use crate::error::{BridgeError, BridgeResult};

#[cfg(unix)]
use libloading::os::unix::Library as OsLibrary;
#[cfg(windows)]
use libloading::os::windows::Library as OsLibrary;

/// Handle of a loaded image (`dlopen` handle or `HMODULE`)
///
/// Copying the handle does not reload or retain the image; it is only a
/// reference to an image somebody else keeps loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ImageHandle(NonNull<c_void>);

// Image handles are process-global references, valid from any thread.
unsafe impl Send for ImageHandle {}
unsafe impl Sync for ImageHandle {}

impl ImageHandle {
    /// Wrap a raw handle; `None` for null
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    /// The raw handle, for passing across the boundary
    pub fn as_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Handle of the running executable
    pub fn current_process() -> BridgeResult<Self> {
        #[cfg(unix)]
        let lib = OsLibrary::this();
        #[cfg(windows)]
        let lib = OsLibrary::this().map_err(|e| BridgeError::LoadError {
            library: "<current process>".to_string(),
            reason: e.to_string(),
        })?;

        Self::from_raw(lib.into_raw() as *mut c_void).ok_or_else(|| BridgeError::LoadError {
            library: "<current process>".to_string(),
            reason: "null image handle".to_string(),
        })
    }

    /// Load `name` with the platform's default search rules and keep it
    /// loaded for the rest of the process
    pub fn open(name: &str) -> BridgeResult<Self> {
        let lib = unsafe {
            OsLibrary::new(name).map_err(|e| BridgeError::LoadError {
                library: name.to_string(),
                reason: e.to_string(),
            })?
        };
        Self::from_raw(lib.into_raw() as *mut c_void).ok_or_else(|| BridgeError::LoadError {
            library: name.to_string(),
            reason: "null image handle".to_string(),
        })
    }

    /// Address of `name` inside this image
    pub fn symbol(self, name: &str) -> BridgeResult<*const c_void> {
        let c_name = CString::new(name)
            .map_err(|_| BridgeError::UnresolvedSymbol(format!("invalid symbol name: {}", name)))?;

        // Borrow the image without taking over its lifetime.
        let lib = ManuallyDrop::new(unsafe { OsLibrary::from_raw(self.as_raw() as _) });
        let addr = unsafe {
            let symbol = lib
                .get::<*const c_void>(c_name.as_bytes_with_nul())
                .map_err(|e| BridgeError::UnresolvedSymbol(format!("{}: {}", name, e)))?;
            *symbol
        };

        if addr.is_null() {
            return Err(BridgeError::UnresolvedSymbol(name.to_string()));
        }
        Ok(addr)
    }
}

/// A dynamically loaded library, owned by this process
pub struct DynamicLibrary {
    /// Path to the library
    path: PathBuf,
    /// The loaded library handle
    library: Library,
    /// Cached symbol addresses
    symbols: Mutex<HashMap<String, usize>>,
}

impl DynamicLibrary {
    /// Load a library from the given path
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Loading runs the library's initialisers; the path is trusted.
        let library = unsafe {
            Library::new(&path).map_err(|e| BridgeError::LoadError {
                library: path.display().to_string(),
                reason: e.to_string(),
            })?
        };
        tracing::debug!(path = %path.display(), "loaded library");

        Ok(Self {
            path,
            library,
            symbols: Mutex::new(HashMap::new()),
        })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Address of a symbol, cached after the first lookup
    pub fn get_symbol(&self, name: &str) -> BridgeResult<*const c_void> {
        if let Some(&addr) = self.symbols.lock().get(name) {
            return Ok(addr as *const c_void);
        }

        let c_name = CString::new(name)
            .map_err(|_| BridgeError::UnresolvedSymbol(format!("invalid symbol name: {}", name)))?;

        let symbol: Symbol<*const c_void> = unsafe {
            self.library.get(c_name.as_bytes_with_nul()).map_err(|e| {
                BridgeError::UnresolvedSymbol(format!(
                    "'{}' in '{}': {}",
                    name,
                    self.path.display(),
                    e
                ))
            })?
        };

        let addr = *symbol;
        if addr.is_null() {
            return Err(BridgeError::UnresolvedSymbol(name.to_string()));
        }
        self.symbols.lock().insert(name.to_string(), addr as usize);
        Ok(addr)
    }

    /// Look up an exported function as the function pointer type `F`.
    ///
    /// # Safety
    ///
    /// The export must have been built with exactly the signature `F`, and
    /// the returned pointer must not outlive this library.
    pub unsafe fn function<F: Copy>(&self, name: &str) -> BridgeResult<F> {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*const c_void>()
        );
        let addr = self.get_symbol(name)?;
        Ok(std::mem::transmute_copy::<*const c_void, F>(&addr))
    }
}

/// Find a library file on a list of search paths
pub fn find_library(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    // If it's already a path, check if it exists
    let path = Path::new(name);
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    let lib_name = library_filename(name);
    search_paths
        .iter()
        .map(|dir| dir.join(&lib_name))
        .find(|candidate| candidate.is_file())
}

/// Default search paths for modules: the executable's directory, the current
/// directory, then the platform library path variable
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir);
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    let var = "LD_LIBRARY_PATH";
    #[cfg(target_os = "macos")]
    let var = "DYLD_LIBRARY_PATH";
    #[cfg(windows)]
    let var = "PATH";
    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    let var = "LD_LIBRARY_PATH";

    if let Some(value) = std::env::var_os(var) {
        paths.extend(std::env::split_paths(&value));
    }

    paths
}

/// Construct the platform-specific library filename
pub fn library_filename(name: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        if name.starts_with("lib") && name.ends_with(".dylib") {
            name.to_string()
        } else {
            format!("lib{}.dylib", name)
        }
    }

    #[cfg(target_os = "windows")]
    {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        if name.starts_with("lib") && name.contains(".so") {
            name.to_string()
        } else {
            format!("lib{}.so", name)
        }
    }
}
