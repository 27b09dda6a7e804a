//! Hostlink - C-ABI boundary between a host process and a loaded module
//!
//! A host executable and a dynamically loaded module exchange calls in both
//! directions and UTF-8 text across a raw C ABI:
//!
//! - **Boundary strings** ([`boundary`]): NUL-terminated buffers on the shared
//!   C heap, owned by exactly one side at a time.
//! - **Symbol resolution** ([`ffi::resolver`]): the module reaches back into
//!   the host through the reserved library name `"__Internal"`, which maps to
//!   the host's already-loaded image instead of a fresh load.
//! - **Callbacks** ([`ffi::callback`]): bare function addresses called through
//!   a closed set of agreed shapes.
//! - **Entry points** ([`module`]): the fixed `extern "C"` operations this
//!   library exports when built as a `cdylib`.
//! - **Host API** ([`host`]): loading a module and calling it with the
//!   ownership rules applied.
//!
//! # Example
//!
//! ```rust
//! use hostlink::host::ModuleApi;
//!
//! let module = ModuleApi::in_process().unwrap();
//! let reply = module.echo_string("abc").unwrap();
//! assert_eq!(reply, "module reply: abc");
//! ```
//!
//! # Ownership
//!
//! ```text
//! host                          module
//!  from_text("abc") ─borrow──▶  hl_echo_string
//!                   ◀─owned───  from_text("module reply: abc")
//!  dispose(input)
//!  dispose(reply)
//! ```

#![warn(clippy::all)]

#[cfg(all(feature = "bootstrap", feature = "direct"))]
compile_error!("features `bootstrap` and `direct` are mutually exclusive");

#[cfg(not(any(feature = "bootstrap", feature = "direct")))]
compile_error!("enable exactly one of the features `bootstrap` or `direct`");

pub mod boundary;
pub mod config;
pub mod error;
pub mod ffi;
pub mod host;
pub mod module;

// Re-export commonly used types
pub use boundary::{BoundaryRef, BoundaryString, LedgerReport};
pub use config::{ConfigError, HostlinkConfig};
pub use error::{BridgeError, BridgeResult};
pub use ffi::{
    BoolCallback, BoundaryType, CallbackKind, ImageHandle, Signature, StringCallback,
    SENTINEL_LIBRARY,
};
pub use host::ModuleApi;
pub use module::registry::{Variant, ABI_VERSION};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
