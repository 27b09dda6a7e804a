//! Resolver Integration Tests
//!
//! Exercises the process-wide resolver against the real host image: this
//! test binary plays the host, with `hl_host_probe` exported from it.

use std::sync::atomic::{AtomicUsize, Ordering};

use hostlink::ffi::{self, resolver, ImageHandle, SENTINEL_LIBRARY};
use hostlink::BridgeError;

static PROBE_CALLS: AtomicUsize = AtomicUsize::new(0);

#[no_mangle]
pub extern "C" fn hl_host_probe() {
    PROBE_CALLS.fetch_add(1, Ordering::SeqCst);
}

/// Install this process as the host image and return its handle
fn install_host() -> ImageHandle {
    let image = ImageHandle::current_process().unwrap();
    ffi::install_host_image_handle(image).unwrap();
    ffi::install_resolver();
    image
}

#[test]
fn test_sentinel_resolves_to_host_image() {
    let image = install_host();
    let first = ffi::resolve(SENTINEL_LIBRARY).unwrap();
    let second = ffi::resolve(SENTINEL_LIBRARY).unwrap();
    assert_eq!(first, image);
    assert_eq!(first, second);
    assert_eq!(resolver::host_image(), Some(image));
}

#[test]
fn test_sentinel_symbol_lookup() {
    install_host();
    // Symbols of the host's already-loaded dependencies are visible too
    let addr = ffi::resolve_symbol(SENTINEL_LIBRARY, "malloc").unwrap();
    assert!(!addr.is_null());
}

#[test]
fn test_sentinel_unknown_symbol() {
    install_host();
    let err = ffi::resolve_symbol(SENTINEL_LIBRARY, "hl_no_such_symbol_anywhere").unwrap_err();
    assert!(matches!(err, BridgeError::UnresolvedSymbol(_)));
}

#[test]
fn test_reinstalling_same_handle_is_accepted() {
    let image = install_host();
    ffi::install_host_image_handle(image).unwrap();
    ffi::install_host_image_handle(ImageHandle::current_process().unwrap()).unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_conflicting_host_image_is_rejected() {
    install_host();
    let other = ImageHandle::open("libc.so.6").unwrap();
    assert_eq!(
        ffi::install_host_image_handle(other),
        Err(BridgeError::HostImageConflict)
    );
}

#[test]
fn test_unknown_library_is_unresolved() {
    install_host();
    let err = ffi::resolve("libhostlink_does_not_exist.so").unwrap_err();
    assert!(matches!(err, BridgeError::UnresolvedSymbol(_)));
    let resolver = resolver::installed_resolver().unwrap();
    assert!(!resolver
        .cached_libraries()
        .contains(&"libhostlink_does_not_exist.so".to_string()));
}

#[test]
fn test_resolver_installs_once() {
    let a = ffi::install_resolver() as *const _;
    let b = ffi::install_resolver() as *const _;
    assert_eq!(a, b);
    assert_eq!(
        resolver::installed_resolver().unwrap().strategy_names(),
        vec!["sentinel", "default-load"]
    );
}

#[cfg(feature = "bootstrap")]
#[test]
fn test_bootstrap_probes_host() {
    let image = install_host();
    let before = PROBE_CALLS.load(Ordering::SeqCst);

    // The probe is only reachable when the linker exported it from this binary
    let exported = ffi::resolve_symbol(SENTINEL_LIBRARY, hostlink::module::HOST_PROBE_SYMBOL);
    let result = hostlink::module::bootstrap(Some(image));

    match exported {
        Ok(addr) => {
            assert!(!addr.is_null());
            result.unwrap();
            assert!(PROBE_CALLS.load(Ordering::SeqCst) > before);
        }
        Err(_) => {
            assert!(matches!(result, Err(BridgeError::UnresolvedSymbol(_))));
            // Keep the probe linked in
            hl_host_probe();
        }
    }
}

#[cfg(feature = "bootstrap")]
#[test]
fn test_bootstrap_without_handle_uses_installed_image() {
    install_host();
    let result = hostlink::module::bootstrap(None);
    let exported = ffi::resolve_symbol(SENTINEL_LIBRARY, hostlink::module::HOST_PROBE_SYMBOL);
    assert_eq!(result.is_ok(), exported.is_ok());
}

#[cfg(feature = "direct")]
#[test]
fn test_direct_variant_installs_on_first_call() {
    hostlink::module::ensure_installed().unwrap();
    assert!(resolver::installed_resolver().is_some());
    assert!(ffi::resolve(SENTINEL_LIBRARY).is_ok());
}
