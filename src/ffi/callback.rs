//! Callback Invoker
//!
//! A callback crosses the boundary as a bare code address. Its signature is
//! not carried with it: both sides compile against the closed list of shapes
//! below, and an address is only ever called through one of them.
//!
//! Calling an address through a shape it was not built with is undefined
//! behaviour. Nothing here checks for it at runtime; the sealed
//! [`CallbackShape`] trait keeps the set of shapes fixed.

use std::ffi::c_void;

use super::types::CallbackKind;
use crate::boundary::BoundaryRef;

/// `void (*)(bool)`
pub type BoolCallback = extern "C" fn(bool);

/// `void (*)(string)`; the string is lent, the callback must not dispose it
pub type StringCallback = extern "C" fn(BoundaryRef<'_>);

/// `void (*)(void)`; the host's sanity probe
pub type HostProbe = extern "C" fn();

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::BoolCallback {}
    impl Sealed for super::StringCallback {}
    impl Sealed for super::HostProbe {}
}

/// One of the agreed callback shapes.
///
/// # Safety
///
/// Implementors are `extern "C"` function pointer types, the same size as a
/// data pointer.
pub unsafe trait CallbackShape: sealed::Sealed + Copy + 'static {
    /// Which agreed shape this is
    const KIND: CallbackKind;
}

unsafe impl CallbackShape for BoolCallback {
    const KIND: CallbackKind = CallbackKind::Bool;
}

unsafe impl CallbackShape for StringCallback {
    const KIND: CallbackKind = CallbackKind::String;
}

unsafe impl CallbackShape for HostProbe {
    const KIND: CallbackKind = CallbackKind::Probe;
}

/// Treat a code address as a callback of shape `F`. Returns `None` for null.
///
/// # Safety
///
/// `addr` must be the address of a function built with exactly the shape `F`,
/// and its image must stay loaded while the result is used.
pub unsafe fn cast_address<F: CallbackShape>(addr: *const c_void) -> Option<F> {
    debug_assert_eq!(
        std::mem::size_of::<F>(),
        std::mem::size_of::<*const c_void>()
    );
    if addr.is_null() {
        return None;
    }
    Some(std::mem::transmute_copy::<*const c_void, F>(&addr))
}

/// Code address of a callback, for handing across the boundary
pub fn address_of<F: CallbackShape>(callback: F) -> *const c_void {
    unsafe { std::mem::transmute_copy::<F, *const c_void>(&callback) }
}

/// Call a `fn(bool)` callback once, synchronously
pub fn invoke_bool(callback: BoolCallback, value: bool) {
    tracing::debug!(shape = %CallbackKind::Bool, value, "invoking callback");
    callback(value)
}

/// Lend `value` to a `fn(string)` callback for one synchronous call
pub fn invoke_string(callback: StringCallback, value: BoundaryRef<'_>) {
    tracing::debug!(shape = %CallbackKind::String, "invoking callback");
    callback(value)
}

/// Call the host's sanity probe
pub fn invoke_probe(probe: HostProbe) {
    tracing::debug!(shape = %CallbackKind::Probe, "invoking host probe");
    probe()
}
