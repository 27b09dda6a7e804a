//! Host side of the boundary.
//!
//! [`ModuleApi`] holds typed pointers to a module's entry points, either from
//! a loaded `cdylib` ([`ModuleApi::load`]) or from the exports linked into
//! this process ([`ModuleApi::in_process`]). Its string methods apply the
//! ownership rules for the host: strings it allocates for arguments are
//! disposed after the call, strings the module returns are decoded and
//! disposed here. After every call they drain `hl_last_error` and turn a
//! reported failure into [`BridgeError::ModuleFailure`].

use std::ffi::c_void;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::boundary::{BoundaryRef, BoundaryString};
use crate::error::{BridgeError, BridgeResult};
use crate::ffi::{find_library, BoolCallback, DynamicLibrary, ImageHandle, StringCallback};
use crate::module::exports;
use crate::module::registry::{self, EntryPointTable, Variant};

pub type BootstrapFn = extern "C" fn(*mut c_void);
pub type PrintFn = extern "C" fn(BoundaryRef<'_>);
pub type InvokeBoolFn = extern "C" fn(Option<BoolCallback>);
pub type InvokeStringFn = extern "C" fn(Option<StringCallback>);
pub type ProduceFn = extern "C" fn() -> BoundaryString;
pub type EchoFn = extern "C" fn(BoundaryRef<'_>) -> BoundaryString;
pub type EntriesFn = extern "C" fn() -> EntryPointTable;
pub type LastErrorFn = extern "C" fn() -> BoundaryString;

/// Typed entry points of one module
pub struct ModuleApi {
    /// Keeps the module mapped while the pointers below are in use
    library: Option<Arc<DynamicLibrary>>,
    variant: Variant,
    entries: Vec<registry::AdvertisedEntry>,
    bootstrap: Option<BootstrapFn>,
    print: PrintFn,
    invoke_with_bool: InvokeBoolFn,
    invoke_with_string: InvokeStringFn,
    produce_string: ProduceFn,
    echo_string: EchoFn,
    last_error: LastErrorFn,
}

impl ModuleApi {
    /// The module exports linked into this process
    pub fn in_process() -> BridgeResult<Self> {
        let table = exports::hl_module_entries();
        let entries = unsafe { table.decode()? };

        #[cfg(feature = "bootstrap")]
        let bootstrap: Option<BootstrapFn> = Some(exports::hl_bootstrap);
        #[cfg(feature = "direct")]
        let bootstrap: Option<BootstrapFn> = None;

        Ok(Self {
            library: None,
            variant: Variant::ACTIVE,
            entries,
            bootstrap,
            print: exports::hl_print,
            invoke_with_bool: exports::hl_invoke_with_bool,
            invoke_with_string: exports::hl_invoke_with_string,
            produce_string: exports::hl_produce_string,
            echo_string: exports::hl_echo_string,
            last_error: exports::hl_last_error,
        })
    }

    /// Load a module library, verify its entry table and bind its entry points
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let library = Arc::new(DynamicLibrary::load(path)?);

        let entries_fn: EntriesFn = unsafe { library.function(registry::ENTRY_TABLE_SYMBOL)? };
        let table = entries_fn();
        let entries = unsafe { table.decode()? };
        let variant = registry::verify(table.version, table.variant, &entries)?;
        tracing::debug!(
            path = %library.path().display(),
            %variant,
            entries = entries.len(),
            "module verified"
        );

        // Signatures were checked against the table above.
        unsafe {
            let bootstrap = match variant {
                Variant::Bootstrap => Some(library.function::<BootstrapFn>(registry::BOOTSTRAP)?),
                Variant::Direct => None,
            };
            Ok(Self {
                bootstrap,
                print: library.function(registry::PRINT)?,
                invoke_with_bool: library.function(registry::INVOKE_WITH_BOOL)?,
                invoke_with_string: library.function(registry::INVOKE_WITH_STRING)?,
                produce_string: library.function(registry::PRODUCE_STRING)?,
                echo_string: library.function(registry::ECHO_STRING)?,
                last_error: library.function(registry::LAST_ERROR)?,
                variant,
                entries,
                library: Some(library),
            })
        }
    }

    /// Deployment variant of the module
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Entries the module advertised in its table
    pub fn entries(&self) -> &[registry::AdvertisedEntry] {
        &self.entries
    }

    /// Path of the loaded library; `None` for the in-process module
    pub fn path(&self) -> Option<&Path> {
        self.library.as_deref().map(DynamicLibrary::path)
    }

    /// Call `hl_bootstrap` with the host image handle
    pub fn bootstrap(&self, image: Option<ImageHandle>) -> BridgeResult<()> {
        let bootstrap = self
            .bootstrap
            .ok_or_else(|| BridgeError::VariantUnavailable(registry::BOOTSTRAP.to_string()))?;
        bootstrap(image.map_or(std::ptr::null_mut(), ImageHandle::as_raw));
        self.check(registry::BOOTSTRAP)
    }

    /// Print `text` through the module; the host keeps and disposes the string
    pub fn print(&self, text: &str) -> BridgeResult<()> {
        let message = BoundaryString::from_text(text)?;
        (self.print)(message.borrowed());
        message.dispose();
        self.check(registry::PRINT)
    }

    /// Echo `text` through the module and take ownership of the reply
    pub fn echo_string(&self, text: &str) -> BridgeResult<String> {
        let input = BoundaryString::from_text(text)?;
        let reply = (self.echo_string)(input.borrowed());
        input.dispose();
        if let Err(e) = self.check(registry::ECHO_STRING) {
            reply.dispose();
            return Err(e);
        }
        take_reply(reply)
    }

    /// Ask the module for a string and take ownership of it
    pub fn produce_string(&self) -> BridgeResult<String> {
        let reply = (self.produce_string)();
        if let Err(e) = self.check(registry::PRODUCE_STRING) {
            reply.dispose();
            return Err(e);
        }
        take_reply(reply)
    }

    /// Have the module call `callback(true)`
    pub fn invoke_with_bool(&self, callback: BoolCallback) -> BridgeResult<()> {
        (self.invoke_with_bool)(Some(callback));
        self.check(registry::INVOKE_WITH_BOOL)
    }

    /// Have the module lend a string to `callback`
    pub fn invoke_with_string(&self, callback: StringCallback) -> BridgeResult<()> {
        (self.invoke_with_string)(Some(callback));
        self.check(registry::INVOKE_WITH_STRING)
    }

    /// Drain the failure the module recorded for the previous call on this
    /// thread, if any. The raw methods leave it for the caller to read here.
    pub fn last_error(&self) -> Option<String> {
        let reply = (self.last_error)();
        if reply.is_null() {
            return None;
        }
        let message = reply.to_text().unwrap_or_else(|e| e.to_string());
        reply.dispose();
        Some(message)
    }

    fn check(&self, entry: &str) -> BridgeResult<()> {
        match self.last_error() {
            Some(message) => Err(BridgeError::ModuleFailure {
                entry: entry.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    /// `hl_print` without any ownership handling
    pub fn print_raw(&self, message: BoundaryRef<'_>) {
        (self.print)(message)
    }

    /// `hl_echo_string` without any ownership handling
    pub fn echo_raw(&self, input: BoundaryRef<'_>) -> BoundaryString {
        (self.echo_string)(input)
    }

    /// `hl_produce_string` without any ownership handling
    pub fn produce_raw(&self) -> BoundaryString {
        (self.produce_string)()
    }

    /// `hl_invoke_with_bool` with a possibly null callback
    pub fn invoke_with_bool_raw(&self, callback: Option<BoolCallback>) {
        (self.invoke_with_bool)(callback)
    }

    /// `hl_invoke_with_string` with a possibly null callback
    pub fn invoke_with_string_raw(&self, callback: Option<StringCallback>) {
        (self.invoke_with_string)(callback)
    }
}

/// Decode and dispose a string the module handed over
fn take_reply(reply: BoundaryString) -> BridgeResult<String> {
    if reply.is_null() {
        return Err(BridgeError::InvalidBoundaryValue(
            "module returned a null string".to_string(),
        ));
    }
    let text = reply.to_text();
    reply.dispose();
    text
}

/// Find the module library: an explicit path, else `name` on `search_paths`
pub fn locate_module(
    name: &str,
    explicit: Option<&Path>,
    search_paths: &[PathBuf],
) -> BridgeResult<PathBuf> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(BridgeError::LoadError {
                library: path.display().to_string(),
                reason: "no such file".to_string(),
            })
        };
    }

    find_library(name, search_paths).ok_or_else(|| BridgeError::LoadError {
        library: name.to_string(),
        reason: format!("not found in {} search paths", search_paths.len()),
    })
}

/// Host callback for `hl_invoke_with_bool`
pub extern "C" fn report_bool(value: bool) {
    let _ = writeln!(std::io::stdout().lock(), "host received bool: {}", value);
}

/// Host callback for `hl_invoke_with_string`; reads the lent string only
pub extern "C" fn report_string(value: BoundaryRef<'_>) {
    match value.to_str() {
        Ok(text) => {
            let _ = writeln!(std::io::stdout().lock(), "host received string: {}", text);
        }
        Err(e) => tracing::warn!(error = %e, "callback received an invalid string"),
    }
}
