//! FFI Layer for the host/module boundary
//!
//! # Architecture
//!
//! ```text
//! Host executable                         Module (cdylib)
//!       │  dlopen(module)                       │
//!       ├──────────────────────────────────────▶│
//!       │  hl_bootstrap(host image)             │
//!       ├──────────────────────────────────────▶│ install_host_image_handle
//!       │                                       │ install_resolver
//!       │  hl_host_probe()  (via "__Internal")  │
//!       │◀──────────────────────────────────────┤ resolve_symbol
//!       │  hl_invoke_with_bool(callback)        │
//!       ├──────────────────────────────────────▶│
//!       │  callback(true)                       │
//!       │◀──────────────────────────────────────┤ invoke_bool
//! ```
//!
//! - [`types`]: signatures as data
//! - [`callback`]: the agreed callback shapes and their call sites
//! - [`loader`]: image handles and loaded libraries
//! - [`resolver`]: library-name resolution with the sentinel redirect

pub mod callback;
mod loader;
pub mod resolver;
mod types;

pub use callback::{BoolCallback, CallbackShape, HostProbe, StringCallback};
pub use loader::{
    default_search_paths, find_library, library_filename, DynamicLibrary, ImageHandle,
};
pub use resolver::{
    install_host_image_handle, install_resolver, resolve, resolve_symbol, ResolveStrategy,
    ResolverHook, SymbolResolver, SENTINEL_LIBRARY,
};
pub use types::{BoundaryType, CallbackKind, Signature};

#[cfg(test)]
mod tests;
