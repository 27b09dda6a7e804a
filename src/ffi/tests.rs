//! FFI Module Tests

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::callback::{address_of, cast_address, invoke_bool, invoke_string};
use super::resolver::{DefaultLoadStrategy, SentinelStrategy};
use super::*;
use crate::boundary::{BoundaryRef, BoundaryString};
use crate::error::BridgeError;

#[test]
fn test_boundary_type_parsing() {
    assert_eq!(BoundaryType::parse("void"), Some(BoundaryType::Void));
    assert_eq!(BoundaryType::parse("int"), Some(BoundaryType::I32));
    assert_eq!(BoundaryType::parse("void*"), Some(BoundaryType::Ptr));
    assert_eq!(BoundaryType::parse("string"), Some(BoundaryType::String));
    assert_eq!(
        BoundaryType::parse("fn(bool)"),
        Some(BoundaryType::Callback(CallbackKind::Bool))
    );
    assert_eq!(
        BoundaryType::parse("fn()"),
        Some(BoundaryType::Callback(CallbackKind::Probe))
    );
    assert_eq!(BoundaryType::parse("fn(i64)"), None);
    assert_eq!(BoundaryType::parse("object"), None);
}

#[test]
fn test_boundary_type_properties() {
    assert!(BoundaryType::String.is_pointer());
    assert!(BoundaryType::Callback(CallbackKind::String).is_pointer());
    assert!(!BoundaryType::Bool.is_pointer());
    assert_eq!(BoundaryType::Bool.size(), 1);
    assert_eq!(
        BoundaryType::String.size(),
        std::mem::size_of::<BoundaryString>()
    );
}

#[test]
fn test_signature_parsing() {
    let sig = Signature::parse("string hl_echo_string(string)").unwrap();
    assert_eq!(sig.name, "hl_echo_string");
    assert_eq!(sig.return_type, BoundaryType::String);
    assert_eq!(sig.params, vec![BoundaryType::String]);

    let sig = Signature::parse("void hl_invoke_with_string(fn(string))").unwrap();
    assert_eq!(sig.return_type, BoundaryType::Void);
    assert_eq!(
        sig.params,
        vec![BoundaryType::Callback(CallbackKind::String)]
    );

    let sig = Signature::parse("string hl_produce_string()").unwrap();
    assert!(sig.params.is_empty());

    assert!(Signature::parse("hl_missing_return(bool)").is_none());
    assert!(Signature::parse("void hl_bad(object)").is_none());
}

#[test]
fn test_signature_display_parses_back() {
    let sig = Signature::new(
        "hl_invoke_with_bool",
        vec![BoundaryType::Callback(CallbackKind::Bool)],
        BoundaryType::Void,
    );
    assert_eq!(sig.to_string(), "void hl_invoke_with_bool(fn(bool))");
    assert_eq!(Signature::parse(&sig.to_string()), Some(sig));
}

static BOOL_CALLS: AtomicUsize = AtomicUsize::new(0);
static BOOL_LAST: AtomicBool = AtomicBool::new(false);

extern "C" fn record_bool(value: bool) {
    BOOL_CALLS.fetch_add(1, Ordering::SeqCst);
    BOOL_LAST.store(value, Ordering::SeqCst);
}

#[test]
fn test_callback_address_round_trip() {
    let addr = address_of::<BoolCallback>(record_bool);
    assert!(!addr.is_null());

    let callback = unsafe { cast_address::<BoolCallback>(addr) }.unwrap();
    let before = BOOL_CALLS.load(Ordering::SeqCst);
    invoke_bool(callback, true);
    assert_eq!(BOOL_CALLS.load(Ordering::SeqCst), before + 1);
    assert!(BOOL_LAST.load(Ordering::SeqCst));

    assert!(unsafe { cast_address::<BoolCallback>(std::ptr::null()) }.is_none());
}

extern "C" fn expect_lent_string(value: BoundaryRef<'_>) {
    assert_eq!(value.to_str().unwrap(), "lent");
}

#[test]
fn test_string_callback_borrows() {
    let owned = BoundaryString::from_text("lent").unwrap();
    invoke_string(expect_lent_string, owned.borrowed());
    assert_eq!(owned.to_text().unwrap(), "lent");
    owned.dispose();
}

#[test]
fn test_callback_kinds() {
    assert_eq!(<BoolCallback as CallbackShape>::KIND, CallbackKind::Bool);
    assert_eq!(<StringCallback as CallbackShape>::KIND, CallbackKind::String);
    assert_eq!(<HostProbe as CallbackShape>::KIND, CallbackKind::Probe);
    assert_eq!(CallbackKind::String.to_string(), "fn(string)");
}

/// Strategy that resolves everything to a fixed handle and counts calls
struct CountingStrategy {
    handle: ImageHandle,
    calls: Arc<AtomicUsize>,
}

impl ResolveStrategy for CountingStrategy {
    fn name(&self) -> &str {
        "counting"
    }

    fn resolve(&self, _library: &str) -> Option<ImageHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(self.handle)
    }
}

fn fake_handle(addr: usize) -> ImageHandle {
    ImageHandle::from_raw(addr as *mut c_void).unwrap()
}

#[test]
fn test_sentinel_resolves_before_chain_continues() {
    let host = fake_handle(0x1000);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut resolver = SymbolResolver::new();
    resolver.push_strategy(SentinelStrategy::with_handle(host));
    resolver.push_strategy(CountingStrategy {
        handle: fake_handle(0x2000),
        calls: Arc::clone(&calls),
    });

    let first = resolver.resolve(SENTINEL_LIBRARY).unwrap();
    let second = resolver.resolve(SENTINEL_LIBRARY).unwrap();
    assert_eq!(first, host);
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_resolution_is_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut resolver = SymbolResolver::new();
    resolver.push_strategy(CountingStrategy {
        handle: fake_handle(0x3000),
        calls: Arc::clone(&calls),
    });

    let a = resolver.resolve("libexample.so").unwrap();
    let b = resolver.resolve("libexample.so").unwrap();
    assert_eq!(a, b);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(resolver.cached_libraries(), vec!["libexample.so".to_string()]);
}

#[test]
fn test_unresolved_library() {
    let resolver = SymbolResolver::new();
    assert!(matches!(
        resolver.resolve("nothing"),
        Err(BridgeError::UnresolvedSymbol(_))
    ));

    let mut resolver = SymbolResolver::new();
    resolver.push_strategy(DefaultLoadStrategy::new());
    assert!(matches!(
        resolver.resolve("libdefinitely-not-a-real-library-hostlink.so"),
        Err(BridgeError::UnresolvedSymbol(_))
    ));
}

#[test]
fn test_sentinel_without_host_image_is_unresolved() {
    let mut resolver = SymbolResolver::new();
    resolver.push_strategy(SentinelStrategy::with_handle(fake_handle(0x4000)));
    assert!(resolver.resolve("other").is_err());
}

#[test]
fn test_hook_requires_installation() {
    let hook = ResolverHook::new();
    assert!(!hook.is_installed());
    assert!(matches!(
        hook.resolve(SENTINEL_LIBRARY),
        Err(BridgeError::UnresolvedSymbol(_))
    ));

    let host = fake_handle(0x5000);
    hook.install(|| {
        let mut resolver = SymbolResolver::new();
        resolver.push_strategy(SentinelStrategy::with_handle(host));
        resolver
    });
    assert!(hook.is_installed());
    assert_eq!(hook.resolve(SENTINEL_LIBRARY).unwrap(), host);

    // A second install keeps the first resolver
    hook.install(SymbolResolver::new);
    assert_eq!(hook.resolve(SENTINEL_LIBRARY).unwrap(), host);
}

#[test]
fn test_sentinel_never_reaches_default_loading() {
    let host = ImageHandle::current_process().unwrap();
    let loader = DefaultLoadStrategy::new();

    let mut resolver = SymbolResolver::new();
    resolver.push_strategy(SentinelStrategy::with_handle(host));
    resolver.push_strategy(loader.clone());

    assert_eq!(resolver.resolve(SENTINEL_LIBRARY).unwrap(), host);
    assert_eq!(resolver.resolve(SENTINEL_LIBRARY).unwrap(), host);
    assert_eq!(loader.loads(), 0);

    if cfg!(target_os = "linux") && resolver.resolve("libc.so.6").is_ok() {
        resolver.resolve("libc.so.6").unwrap();
        assert_eq!(loader.loads(), 1);
    }
}

#[test]
fn test_default_chain_order() {
    let resolver = SymbolResolver::with_default_chain();
    assert_eq!(resolver.strategy_names(), vec!["sentinel", "default-load"]);
}

#[test]
fn test_current_process_symbol_lookup() {
    let image = ImageHandle::current_process().unwrap();
    assert_eq!(ImageHandle::current_process().unwrap(), image);

    // malloc is reachable from the executable's global scope
    #[cfg(unix)]
    assert!(image.symbol("malloc").is_ok());
    assert!(matches!(
        image.symbol("hl_symbol_that_does_not_exist"),
        Err(BridgeError::UnresolvedSymbol(_))
    ));
}

#[test]
fn test_library_filename() {
    #[cfg(target_os = "linux")]
    {
        assert_eq!(library_filename("hostlink"), "libhostlink.so");
        assert_eq!(library_filename("libc.so.6"), "libc.so.6");
    }
    #[cfg(target_os = "windows")]
    assert_eq!(library_filename("hostlink"), "hostlink.dll");
}

#[cfg(target_os = "linux")]
#[test]
fn test_libc_loading() {
    let strategy = DefaultLoadStrategy::new();
    let mut resolver = SymbolResolver::new();
    resolver.push_strategy(strategy);

    if let Ok(handle) = resolver.resolve("libc.so.6") {
        assert_eq!(resolver.resolve("libc.so.6").unwrap(), handle);

        let addr = resolver.resolve_symbol("libc.so.6", "getpid").unwrap();
        type GetPid = extern "C" fn() -> i32;
        let getpid: GetPid = unsafe { std::mem::transmute(addr) };
        assert_eq!(getpid() as u32, std::process::id());
    }
}
