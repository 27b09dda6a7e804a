//! Boundary Error Types
//!
//! Recoverable failures of the host/module boundary. Ownership-protocol and
//! signature-contract violations (double disposal, calling a callback through
//! the wrong shape) are undefined behaviour and have no variant here: they are
//! excluded by construction, see [`crate::boundary`] and [`crate::ffi::callback`].

use thiserror::Error;

/// Error type for boundary operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The shared heap could not satisfy an allocation
    #[error("Shared heap exhausted allocating {0} bytes")]
    AllocationFailure(usize),

    /// A null or malformed value was passed where a boundary value was expected
    #[error("Invalid boundary value: {0}")]
    InvalidBoundaryValue(String),

    /// A library or symbol name could not be resolved
    #[error("Unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// A library failed to load
    #[error("Failed to load '{library}': {reason}")]
    LoadError { library: String, reason: String },

    /// The module was built against a different boundary ABI
    #[error("ABI version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The module advertises a different signature for an entry point
    #[error("Entry point '{entry}' disagrees on signature: expected `{expected}`, found `{found}`")]
    SignatureDisagreement {
        entry: String,
        expected: String,
        found: String,
    },

    /// A different host image handle was already installed
    #[error("Host image handle already installed with a different value")]
    HostImageConflict,

    /// An entry point failed inside the module; `message` is what the module
    /// reported through `hl_last_error`
    #[error("Module entry '{entry}' failed: {message}")]
    ModuleFailure { entry: String, message: String },

    /// The entry point does not exist in this deployment variant
    #[error("Entry point '{0}' is not available in this module variant")]
    VariantUnavailable(String),
}

/// Result type for boundary operations
pub type BridgeResult<T> = Result<T, BridgeError>;
