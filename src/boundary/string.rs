//! Boundary Strings
//!
//! A [`BoundaryString`] is one pointer-sized handle to a NUL-terminated UTF-8
//! buffer on the shared heap. Whoever holds the handle owns the buffer:
//!
//! - passing a `BoundaryString` by value hands the buffer to the callee;
//! - returning one hands it to the caller;
//! - passing a [`BoundaryRef`] lends it for the duration of the call.
//!
//! `BoundaryString` is neither `Copy` nor `Clone` and is released only by the
//! consuming [`BoundaryString::dispose`], so a second disposal of the same
//! value does not compile.

use std::ffi::{c_char, CStr};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use super::heap;
use crate::error::{BridgeError, BridgeResult};

/// Owned handle to a shared-heap UTF-8 buffer
#[repr(transparent)]
pub struct BoundaryString {
    raw: *mut c_char,
}

// The buffer is exclusively owned by the holder of the handle.
unsafe impl Send for BoundaryString {}

impl BoundaryString {
    /// The null handle, returned by entry points that failed to produce a string
    pub const fn null() -> Self {
        Self {
            raw: ptr::null_mut(),
        }
    }

    /// Allocate a buffer on the shared heap holding `text` plus a terminating zero.
    ///
    /// Text containing a NUL byte is rejected: the wire format could not
    /// carry it past the first zero.
    pub fn from_text(text: &str) -> BridgeResult<Self> {
        let bytes = text.as_bytes();
        if let Some(pos) = bytes.iter().position(|&b| b == 0) {
            return Err(BridgeError::InvalidBoundaryValue(format!(
                "text contains a NUL byte at offset {}",
                pos
            )));
        }

        let len = bytes.len();
        let buf = heap::allocate(len + 1)?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), buf.as_ptr(), len);
            *buf.as_ptr().add(len) = 0;
        }

        Ok(Self {
            raw: buf.as_ptr() as *mut c_char,
        })
    }

    /// Take ownership of a raw handle received from foreign code.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a NUL-terminated buffer from the C heap that the
    /// caller owns and that nobody else will release.
    pub unsafe fn from_raw(raw: *mut c_char) -> Self {
        Self { raw }
    }

    /// Give up ownership of the handle without releasing the buffer
    pub fn into_raw(self) -> *mut c_char {
        self.raw
    }

    /// Raw pointer to the buffer
    pub fn as_ptr(&self) -> *const c_char {
        self.raw
    }

    /// Whether this is the null handle
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Lend the buffer without transferring ownership
    pub fn borrowed(&self) -> BoundaryRef<'_> {
        BoundaryRef {
            raw: self.raw,
            _owner: PhantomData,
        }
    }

    /// Decode the buffer; does not consume the handle
    pub fn to_text(&self) -> BridgeResult<String> {
        self.borrowed().to_text()
    }

    /// Release the buffer. Disposing the null handle does nothing.
    pub fn dispose(self) {
        if let Some(buf) = NonNull::new(self.raw as *mut u8) {
            unsafe { heap::release(buf) };
        }
    }
}

impl fmt::Debug for BoundaryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundaryString").field(&self.raw).finish()
    }
}

/// Borrowed view of a boundary buffer, ABI-identical to [`BoundaryString`]
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct BoundaryRef<'a> {
    raw: *const c_char,
    _owner: PhantomData<&'a BoundaryString>,
}

impl<'a> BoundaryRef<'a> {
    /// A null view
    pub const fn null() -> Self {
        Self {
            raw: ptr::null(),
            _owner: PhantomData,
        }
    }

    /// View a raw NUL-terminated buffer.
    ///
    /// # Safety
    ///
    /// `raw` must be null or stay valid and unmodified for `'a`.
    pub unsafe fn from_ptr(raw: *const c_char) -> Self {
        Self {
            raw,
            _owner: PhantomData,
        }
    }

    /// Raw pointer to the buffer
    pub fn as_ptr(&self) -> *const c_char {
        self.raw
    }

    /// Whether this view is null
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Decode the buffer as UTF-8 without copying
    pub fn to_str(&self) -> BridgeResult<&'a str> {
        if self.raw.is_null() {
            return Err(BridgeError::InvalidBoundaryValue(
                "null string handle".to_string(),
            ));
        }
        let c_str = unsafe { CStr::from_ptr(self.raw) };
        c_str
            .to_str()
            .map_err(|e| BridgeError::InvalidBoundaryValue(format!("not valid UTF-8: {}", e)))
    }

    /// Decode the buffer into an owned `String`
    pub fn to_text(&self) -> BridgeResult<String> {
        self.to_str().map(str::to_owned)
    }
}

impl fmt::Debug for BoundaryRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundaryRef").field(&self.raw).finish()
    }
}
