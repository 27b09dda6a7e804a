//! `extern "C"` exports of the module.
//!
//! `Result` cannot cross the ABI. A failing entry point records its error in
//! a per-thread slot that the caller drains with `hl_last_error`, the way
//! `errno` or `dlerror` work; string-returning entries also hand back the
//! null handle. Failures are logged to the module's own stderr subscriber
//! too, since a loaded `cdylib` does not share the host's.

use std::cell::RefCell;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::boundary::{BoundaryRef, BoundaryString};
use crate::error::BridgeResult;
use crate::ffi::{BoolCallback, StringCallback};

use super::registry::{self, EntryPointTable};

#[cfg(feature = "bootstrap")]
use std::ffi::c_void;

#[cfg(feature = "bootstrap")]
use crate::ffi::ImageHandle;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

static LOGGING: OnceCell<()> = OnceCell::new();

/// Install a stderr subscriber for this image unless one is already set.
/// `RUST_LOG` applies; the default shows warnings.
fn init_logging() {
    LOGGING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Run the per-call prologue of the active variant
fn enter(entry: &str) -> BridgeResult<()> {
    init_logging();
    tracing::trace!(entry, "entry point called");
    #[cfg(feature = "direct")]
    super::ensure_installed()?;
    Ok(())
}

/// Record the outcome of an entry point call; every call overwrites the slot
fn record(entry: &str, error: Option<String>) {
    if let Some(message) = &error {
        tracing::warn!(entry, error = %message, "entry point failed");
    }
    LAST_ERROR.with(|slot| *slot.borrow_mut() = error);
}

fn report(entry: &str, result: BridgeResult<()>) {
    record(entry, result.err().map(|e| e.to_string()));
}

fn report_string(entry: &str, result: BridgeResult<BoundaryString>) -> BoundaryString {
    match result {
        Ok(reply) => {
            record(entry, None);
            reply
        }
        Err(e) => {
            record(entry, Some(e.to_string()));
            BoundaryString::null()
        }
    }
}

/// `void hl_bootstrap(ptr)`
#[cfg(feature = "bootstrap")]
#[no_mangle]
pub extern "C" fn hl_bootstrap(image: *mut c_void) {
    report(
        registry::BOOTSTRAP,
        enter(registry::BOOTSTRAP).and_then(|()| super::bootstrap(ImageHandle::from_raw(image))),
    );
}

/// `void hl_print(string)`
#[no_mangle]
pub extern "C" fn hl_print(message: BoundaryRef<'_>) {
    report(
        registry::PRINT,
        enter(registry::PRINT).and_then(|()| super::print(message)),
    );
}

/// `void hl_invoke_with_bool(fn(bool))`
#[no_mangle]
pub extern "C" fn hl_invoke_with_bool(callback: Option<BoolCallback>) {
    report(
        registry::INVOKE_WITH_BOOL,
        enter(registry::INVOKE_WITH_BOOL).and_then(|()| super::invoke_with_bool(callback)),
    );
}

/// `void hl_invoke_with_string(fn(string))`
#[no_mangle]
pub extern "C" fn hl_invoke_with_string(callback: Option<StringCallback>) {
    report(
        registry::INVOKE_WITH_STRING,
        enter(registry::INVOKE_WITH_STRING).and_then(|()| super::invoke_with_string(callback)),
    );
}

/// `string hl_produce_string()`
#[no_mangle]
pub extern "C" fn hl_produce_string() -> BoundaryString {
    report_string(
        registry::PRODUCE_STRING,
        enter(registry::PRODUCE_STRING).and_then(|()| super::produce_string()),
    )
}

/// `string hl_echo_string(string)`
#[no_mangle]
pub extern "C" fn hl_echo_string(input: BoundaryRef<'_>) -> BoundaryString {
    report_string(
        registry::ECHO_STRING,
        enter(registry::ECHO_STRING).and_then(|()| super::echo_string(input)),
    )
}

/// Entry table read by the host before calling anything else
#[no_mangle]
pub extern "C" fn hl_module_entries() -> EntryPointTable {
    registry::entry_table()
}

/// `string hl_last_error()`: the failure of the previous entry point call on
/// this thread, owned by the caller, or null if it succeeded. Reading clears
/// the slot.
#[no_mangle]
pub extern "C" fn hl_last_error() -> BoundaryString {
    LAST_ERROR
        .with(|slot| slot.borrow_mut().take())
        .and_then(|message| BoundaryString::from_text(&message).ok())
        .unwrap_or_else(BoundaryString::null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain() -> Option<String> {
        let reply = hl_last_error();
        let text = reply.to_text().ok();
        reply.dispose();
        text
    }

    #[test]
    fn test_failure_is_recorded_until_read() {
        hl_print(BoundaryRef::null());
        let message = drain().unwrap();
        assert!(message.contains("null string handle"), "{}", message);
        assert_eq!(drain(), None);
    }

    #[test]
    fn test_success_clears_previous_failure() {
        hl_invoke_with_bool(None);
        hl_produce_string().dispose();
        assert_eq!(drain(), None);
    }

    #[test]
    fn test_null_callback_is_recorded() {
        hl_invoke_with_string(None);
        assert!(drain().unwrap().contains("invoke_with_string"));
    }
}
