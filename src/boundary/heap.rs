//! Shared Heap
//!
//! Boundary buffers live on the platform C heap so that whichever side owns a
//! handle can release it, no matter which side allocated it. Both the host and
//! every loaded module allocate with `malloc` and release with `free`.
//!
//! The heap also carries a thread-local allocation ledger. While a [`track`]
//! scope is open on the current thread, every allocation and disposal is
//! recorded and summarised in a [`LedgerReport`]. Boundary calls are
//! synchronous, so a scope sees every nested callback on the same thread.

use std::cell::RefCell;
use std::collections::HashSet;
use std::ptr::NonNull;

use crate::error::{BridgeError, BridgeResult};

/// Summary of the shared-heap traffic observed inside a [`track`] scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerReport {
    /// Buffers allocated inside the scope
    pub allocations: usize,
    /// Buffers released inside the scope (double disposals excluded)
    pub disposals: usize,
    /// Buffers allocated inside the scope and never released
    pub leaked: usize,
    /// Releases of a buffer that was already released inside the scope
    pub double_disposals: usize,
    /// Releases of a buffer the scope never saw allocated
    pub foreign_disposals: usize,
}

impl LedgerReport {
    /// Every allocation was disposed exactly once, by someone who owned it
    pub fn is_balanced(&self) -> bool {
        self.leaked == 0 && self.double_disposals == 0 && self.foreign_disposals == 0
    }
}

#[derive(Default)]
struct Ledger {
    live: HashSet<usize>,
    released: HashSet<usize>,
    report: LedgerReport,
}

impl Ledger {
    fn record_release(&mut self, addr: usize) -> Release {
        if self.live.remove(&addr) {
            self.released.insert(addr);
            self.report.disposals += 1;
            Release::Free
        } else if self.released.contains(&addr) {
            self.report.double_disposals += 1;
            Release::Skip
        } else {
            self.report.foreign_disposals += 1;
            Release::Free
        }
    }
}

#[derive(PartialEq, Eq)]
enum Release {
    Free,
    Skip,
}

thread_local! {
    // Open scopes on this thread, innermost last
    static LEDGERS: RefCell<Vec<Ledger>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with an allocation ledger open on the current thread.
///
/// Scopes nest, and every open scope records the traffic: an outer report
/// includes what happened inside its inner scopes. A release that any open
/// scope has already seen released is counted as a double disposal and the
/// `free` is skipped, so a test can observe the violation without corrupting
/// the heap.
pub fn track<R>(f: impl FnOnce() -> R) -> (R, LedgerReport) {
    LEDGERS.with(|cell| cell.borrow_mut().push(Ledger::default()));
    let result = f();
    let ledger = LEDGERS.with(|cell| cell.borrow_mut().pop());

    let report = ledger
        .map(|l| LedgerReport {
            leaked: l.live.len(),
            ..l.report
        })
        .unwrap_or_default();
    (result, report)
}

/// Allocate `len` bytes on the shared heap.
pub(crate) fn allocate(len: usize) -> BridgeResult<NonNull<u8>> {
    // malloc(0) may legally return null
    let ptr = unsafe { libc::malloc(len.max(1)) } as *mut u8;
    let ptr = NonNull::new(ptr).ok_or(BridgeError::AllocationFailure(len))?;

    let addr = ptr.as_ptr() as usize;
    LEDGERS.with(|cell| {
        for ledger in cell.borrow_mut().iter_mut() {
            ledger.released.remove(&addr);
            ledger.live.insert(addr);
            ledger.report.allocations += 1;
        }
    });
    tracing::trace!(len, addr = ?ptr, "shared heap allocation");

    Ok(ptr)
}

/// Release a buffer obtained from [`allocate`] (here or in another image).
///
/// # Safety
///
/// `ptr` must come from the C heap and must not have been released already.
/// The caller must be the current owner of the buffer.
pub(crate) unsafe fn release(ptr: NonNull<u8>) {
    let addr = ptr.as_ptr() as usize;
    let action = LEDGERS.with(|cell| {
        cell.borrow_mut()
            .iter_mut()
            .map(|ledger| ledger.record_release(addr))
            .fold(Release::Free, |acc, r| {
                if r == Release::Skip {
                    Release::Skip
                } else {
                    acc
                }
            })
    });

    match action {
        Release::Free => {
            tracing::trace!(addr = ?ptr, "shared heap release");
            libc::free(ptr.as_ptr() as *mut libc::c_void);
        }
        Release::Skip => {
            tracing::warn!(addr = ?ptr, "double disposal of a boundary buffer suppressed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_scope() {
        let ((), report) = track(|| {
            let ptr = allocate(16).unwrap();
            unsafe { release(ptr) };
        });
        assert_eq!(report.allocations, 1);
        assert_eq!(report.disposals, 1);
        assert!(report.is_balanced());
    }

    #[test]
    fn test_leak_detected() {
        let (ptr, report) = track(|| allocate(8).unwrap());
        assert_eq!(report.leaked, 1);
        assert!(!report.is_balanced());
        unsafe { release(ptr) };
    }

    #[test]
    fn test_double_disposal_detected() {
        let ((), report) = track(|| {
            let ptr = allocate(8).unwrap();
            unsafe {
                release(ptr);
                release(ptr);
            }
        });
        assert_eq!(report.disposals, 1);
        assert_eq!(report.double_disposals, 1);
        assert!(!report.is_balanced());
    }

    #[test]
    fn test_foreign_disposal_detected() {
        let ptr = allocate(8).unwrap();
        let ((), report) = track(|| unsafe { release(ptr) });
        assert_eq!(report.foreign_disposals, 1);
        assert_eq!(report.allocations, 0);
    }

    #[test]
    fn test_outer_scope_sees_nested_traffic() {
        let (inner, outer) = track(|| {
            let outer_ptr = allocate(4).unwrap();
            let ((), inner) = track(|| {
                let p = allocate(4).unwrap();
                unsafe { release(p) };
            });
            unsafe { release(outer_ptr) };
            inner
        });
        assert_eq!(inner.allocations, 1);
        assert_eq!(outer.allocations, 2);
        assert_eq!(outer.disposals, 2);
        assert!(inner.is_balanced());
        assert!(outer.is_balanced());
    }

    #[test]
    fn test_release_in_inner_scope_then_outer_is_double() {
        let ((), outer) = track(|| {
            let ptr = allocate(4).unwrap();
            let ((), inner) = track(|| unsafe { release(ptr) });
            assert_eq!(inner.foreign_disposals, 1);
            // Already freed inside the inner scope; this free must be skipped
            unsafe { release(ptr) };
        });
        assert_eq!(outer.disposals, 1);
        assert_eq!(outer.double_disposals, 1);
        assert_eq!(outer.leaked, 0);
    }

    #[test]
    fn test_no_scope_open_after_track() {
        let _ = track(|| ());
        LEDGERS.with(|cell| assert!(cell.borrow().is_empty()));
    }

    #[test]
    fn test_zero_length_allocation() {
        let ptr = allocate(0).unwrap();
        unsafe { release(ptr) };
    }
}
