//! Observable output of the module.
//!
//! Lines go to stdout unless a [`capture`] scope is open on the calling
//! thread, in which case they are collected instead.

use std::cell::RefCell;
use std::io::Write;

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Run `f` and collect every line the module emits on this thread meanwhile
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let outer = CAPTURE.with(|cell| cell.borrow_mut().replace(Vec::new()));
    let result = f();
    let lines = CAPTURE.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), outer));
    (result, lines.unwrap_or_default())
}

pub(crate) fn emit(line: String) {
    tracing::debug!(target: "hostlink::module", "{}", line);

    let line = CAPTURE.with(|cell| match cell.borrow_mut().as_mut() {
        Some(lines) => {
            lines.push(line);
            None
        }
        None => Some(line),
    });

    if let Some(line) = line {
        // stdout may be closed; output is best effort
        let _ = writeln!(std::io::stdout().lock(), "{}", line);
    }
}
