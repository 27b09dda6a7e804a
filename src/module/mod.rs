//! Module side of the boundary.
//!
//! The operations here are what the `extern "C"` exports in [`exports`] run.
//! They take and return boundary values and report recoverable failures as
//! [`BridgeError`]s; the exports turn those into log lines and null handles.
//!
//! Ownership per operation:
//!
//! | Operation | String argument | String result |
//! |---|---|---|
//! | [`print`] | borrowed | none |
//! | [`echo_string`] | borrowed | owned by the caller |
//! | [`produce_string`] | none | owned by the caller |
//! | [`invoke_with_string`] | lent to the callback, disposed here afterwards | none |

pub mod exports;
pub mod registry;
pub mod transcript;

use crate::boundary::{BoundaryRef, BoundaryString};
use crate::error::{BridgeError, BridgeResult};
use crate::ffi::callback::{invoke_bool, invoke_string};
use crate::ffi::{BoolCallback, StringCallback};

#[cfg(feature = "bootstrap")]
use crate::ffi::{
    callback::{cast_address, invoke_probe},
    install_host_image_handle, install_resolver, resolve_symbol, HostProbe, ImageHandle,
    SENTINEL_LIBRARY,
};

/// Symbol the module calls in the host during bootstrap
pub const HOST_PROBE_SYMBOL: &str = "hl_host_probe";

/// Text returned by [`produce_string`]
pub const PRODUCE_REPLY: &str = "module replied!";

/// Annotation [`echo_string`] puts in front of its input
pub const ECHO_PREFIX: &str = "module reply: ";

/// Text lent to the callback by [`invoke_with_string`]
pub const LENT_TEXT: &str = "xyz";

/// Record the host image, install the resolver, then probe the host once.
///
/// A missing image handle leaves the sentinel unbound, so the probe fails
/// with [`BridgeError::UnresolvedSymbol`] unless a handle was installed
/// earlier.
#[cfg(feature = "bootstrap")]
pub fn bootstrap(image: Option<ImageHandle>) -> BridgeResult<()> {
    if let Some(image) = image {
        install_host_image_handle(image)?;
    }
    install_resolver();

    let addr = resolve_symbol(SENTINEL_LIBRARY, HOST_PROBE_SYMBOL)?;
    let probe = unsafe { cast_address::<HostProbe>(addr) }
        .ok_or_else(|| BridgeError::UnresolvedSymbol(HOST_PROBE_SYMBOL.to_string()))?;
    invoke_probe(probe);
    Ok(())
}

/// Seed the host image from the current process and install the resolver,
/// once. Runs at the start of every entry point in the `direct` variant.
#[cfg(feature = "direct")]
pub fn ensure_installed() -> BridgeResult<()> {
    use crate::ffi::{install_host_image_handle, install_resolver, resolver, ImageHandle};

    if resolver::installed_resolver().is_none() {
        if resolver::host_image().is_none() {
            install_host_image_handle(ImageHandle::current_process()?)?;
        }
        install_resolver();
    }
    Ok(())
}

/// Surface `message` without taking ownership of it
pub fn print(message: BoundaryRef<'_>) -> BridgeResult<()> {
    let text = message.to_str()?;
    transcript::emit(format!("module print: {}", text));
    Ok(())
}

/// Call `callback` once with `true`
pub fn invoke_with_bool(callback: Option<BoolCallback>) -> BridgeResult<()> {
    let callback = callback.ok_or_else(|| null_callback("invoke_with_bool"))?;
    invoke_bool(callback, true);
    Ok(())
}

/// Lend a fresh string to `callback` for one call, then dispose it
pub fn invoke_with_string(callback: Option<StringCallback>) -> BridgeResult<()> {
    let callback = callback.ok_or_else(|| null_callback("invoke_with_string"))?;
    let text = BoundaryString::from_text(LENT_TEXT)?;
    invoke_string(callback, text.borrowed());
    text.dispose();
    Ok(())
}

/// A fresh string owned by the caller
pub fn produce_string() -> BridgeResult<BoundaryString> {
    BoundaryString::from_text(PRODUCE_REPLY)
}

/// A fresh string `ECHO_PREFIX + input`, owned by the caller; `input` is borrowed
pub fn echo_string(input: BoundaryRef<'_>) -> BridgeResult<BoundaryString> {
    let text = input.to_str()?;
    transcript::emit(format!("module print: {}", text));
    BoundaryString::from_text(&format!("{}{}", ECHO_PREFIX, text))
}

fn null_callback(entry: &str) -> BridgeError {
    BridgeError::InvalidBoundaryValue(format!("null callback passed to {}", entry))
}
