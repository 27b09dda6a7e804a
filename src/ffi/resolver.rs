//! Symbol Resolver
//!
//! Resolves library names to image handles for the module's calls back into
//! the host. Resolution walks an ordered chain of [`ResolveStrategy`]s and
//! caches the first hit per name; a cached handle is never replaced.
//!
//! The default chain puts [`SentinelStrategy`] first, which maps
//! [`SENTINEL_LIBRARY`] to the host's own image instead of loading anything,
//! and [`DefaultLoadStrategy`] second.
//!
//! Process-wide state is two init-once slots: the host image handle
//! ([`install_host_image_handle`]) and the resolver hook ([`install_resolver`]).

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use super::loader::ImageHandle;
use crate::error::{BridgeError, BridgeResult};

/// Reserved library name meaning "the host image that loaded this module"
pub const SENTINEL_LIBRARY: &str = "__Internal";

static HOST_IMAGE: OnceCell<ImageHandle> = OnceCell::new();
static RESOLVER: ResolverHook = ResolverHook::new();

/// Record the host image handle. Set once per process.
///
/// Installing the same handle again is accepted; a different one fails with
/// [`BridgeError::HostImageConflict`].
pub fn install_host_image_handle(handle: ImageHandle) -> BridgeResult<()> {
    let installed = HOST_IMAGE.get_or_init(|| {
        tracing::debug!(?handle, "host image handle installed");
        handle
    });
    if *installed == handle {
        Ok(())
    } else {
        Err(BridgeError::HostImageConflict)
    }
}

/// The installed host image handle, if any
pub fn host_image() -> Option<ImageHandle> {
    HOST_IMAGE.get().copied()
}

/// Install the process-wide resolver with the default chain
pub fn install_resolver() -> &'static SymbolResolver {
    RESOLVER.install(SymbolResolver::with_default_chain)
}

/// The process-wide resolver, if installed
pub fn installed_resolver() -> Option<&'static SymbolResolver> {
    RESOLVER.get()
}

/// Resolve a library name through the process-wide resolver
pub fn resolve(name: &str) -> BridgeResult<ImageHandle> {
    RESOLVER.resolve(name)
}

/// Resolve `symbol` inside `library` through the process-wide resolver
pub fn resolve_symbol(library: &str, symbol: &str) -> BridgeResult<*const c_void> {
    RESOLVER.resolve_symbol(library, symbol)
}

/// One way of turning a library name into an image handle
pub trait ResolveStrategy: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &str;

    /// Resolve `library`, or `None` to let the next strategy try
    fn resolve(&self, library: &str) -> Option<ImageHandle>;
}

/// Where the sentinel strategy finds the host image
#[derive(Debug, Clone, Copy)]
enum HostImageSource {
    Installed,
    Fixed(ImageHandle),
}

/// Maps [`SENTINEL_LIBRARY`] to the host image; never loads a library
#[derive(Debug, Clone, Copy)]
pub struct SentinelStrategy {
    source: HostImageSource,
}

impl SentinelStrategy {
    /// Use the handle recorded by [`install_host_image_handle`]
    pub fn installed() -> Self {
        Self {
            source: HostImageSource::Installed,
        }
    }

    /// Use a fixed handle
    pub fn with_handle(handle: ImageHandle) -> Self {
        Self {
            source: HostImageSource::Fixed(handle),
        }
    }
}

impl ResolveStrategy for SentinelStrategy {
    fn name(&self) -> &str {
        "sentinel"
    }

    fn resolve(&self, library: &str) -> Option<ImageHandle> {
        if library != SENTINEL_LIBRARY {
            return None;
        }
        match self.source {
            HostImageSource::Installed => host_image(),
            HostImageSource::Fixed(handle) => Some(handle),
        }
    }
}

/// Loads the library with the platform's default search rules
///
/// Clones share one load counter, so a caller can keep a clone to watch a
/// strategy it pushed into a chain.
#[derive(Debug, Clone, Default)]
pub struct DefaultLoadStrategy {
    loads: Arc<AtomicUsize>,
}

impl DefaultLoadStrategy {
    /// Create a new loading strategy
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful loads performed
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl ResolveStrategy for DefaultLoadStrategy {
    fn name(&self) -> &str {
        "default-load"
    }

    fn resolve(&self, library: &str) -> Option<ImageHandle> {
        if library == SENTINEL_LIBRARY {
            return None;
        }
        match ImageHandle::open(library) {
            Ok(handle) => {
                self.loads.fetch_add(1, Ordering::Relaxed);
                Some(handle)
            }
            Err(e) => {
                tracing::debug!(library, error = %e, "default load failed");
                None
            }
        }
    }
}

/// Ordered strategy chain plus the per-name cache
pub struct SymbolResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
    table: RwLock<HashMap<String, ImageHandle>>,
}

impl SymbolResolver {
    /// An empty chain; nothing resolves until strategies are pushed
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Sentinel strategy first, default loading second
    pub fn with_default_chain() -> Self {
        let mut resolver = Self::new();
        resolver.push_strategy(SentinelStrategy::installed());
        resolver.push_strategy(DefaultLoadStrategy::new());
        resolver
    }

    /// Append a strategy to the end of the chain
    pub fn push_strategy(&mut self, strategy: impl ResolveStrategy + 'static) {
        self.strategies.push(Box::new(strategy));
    }

    /// Names of the strategies in chain order
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve a library name, consulting the cache first
    pub fn resolve(&self, library: &str) -> BridgeResult<ImageHandle> {
        if let Some(&handle) = self.table.read().get(library) {
            return Ok(handle);
        }

        for strategy in &self.strategies {
            if let Some(handle) = strategy.resolve(library) {
                tracing::debug!(library, strategy = strategy.name(), ?handle, "resolved");
                // A concurrent first resolution may have won; keep its handle.
                let mut table = self.table.write();
                return Ok(*table.entry(library.to_string()).or_insert(handle));
            }
        }

        Err(BridgeError::UnresolvedSymbol(format!(
            "library '{}' not resolved by any strategy",
            library
        )))
    }

    /// Resolve `library`, then the address of `symbol` inside it
    pub fn resolve_symbol(&self, library: &str, symbol: &str) -> BridgeResult<*const c_void> {
        self.resolve(library)?.symbol(symbol)
    }

    /// Library names cached so far
    pub fn cached_libraries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for SymbolResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Init-once slot holding a resolver
///
/// Resolution before installation fails with
/// [`BridgeError::UnresolvedSymbol`].
pub struct ResolverHook {
    cell: OnceCell<SymbolResolver>,
}

impl ResolverHook {
    /// An empty slot
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Install the resolver built by `init`, unless one is already installed
    pub fn install(&self, init: impl FnOnce() -> SymbolResolver) -> &SymbolResolver {
        self.cell.get_or_init(|| {
            let resolver = init();
            tracing::debug!(chain = ?resolver.strategy_names(), "resolver installed");
            resolver
        })
    }

    /// The installed resolver, if any
    pub fn get(&self) -> Option<&SymbolResolver> {
        self.cell.get()
    }

    /// Whether a resolver is installed
    pub fn is_installed(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Resolve through the installed resolver
    pub fn resolve(&self, library: &str) -> BridgeResult<ImageHandle> {
        self.installed(library)?.resolve(library)
    }

    /// Resolve a symbol through the installed resolver
    pub fn resolve_symbol(&self, library: &str, symbol: &str) -> BridgeResult<*const c_void> {
        self.installed(library)?.resolve_symbol(library, symbol)
    }

    fn installed(&self, library: &str) -> BridgeResult<&SymbolResolver> {
        self.cell.get().ok_or_else(|| {
            BridgeError::UnresolvedSymbol(format!(
                "resolver not installed while resolving '{}'",
                library
            ))
        })
    }
}

impl Default for ResolverHook {
    fn default() -> Self {
        Self::new()
    }
}
