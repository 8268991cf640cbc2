//! Runtime error handling
//!
//! Two disjoint error channels, matching how failures are classified:
//!
//! - **Recoverable resource errors** (table exhaustion, memory pressure) go
//!   through thread-local error state so FFI functions can report them
//!   without unwinding across the FFI boundary. Callers poll with
//!   `patch_tabor_has_error` and retrieve with `patch_tabor_take_error`.
//! - **Invariant violations** (descriptor corruption, scheduling deadlock)
//!   are a mismatch between generated code and the runtime it was linked
//!   against; they panic with a descriptive message and are never caught.
//!
//! Ordinary logical failure (a tabled call with no solutions) is not an
//! error at all and never passes through this module.

use std::cell::RefCell;
use std::ffi::CString;
use std::ptr;

thread_local! {
    /// Thread-local storage for the last recoverable runtime error
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };

    /// Cached C string for FFI access (avoids allocation on every get)
    static ERROR_CSTRING: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last recoverable runtime error.
///
/// Note: This clears any cached CString to prevent stale pointer access.
pub fn set_runtime_error(msg: impl Into<String>) {
    ERROR_CSTRING.with(|cs| *cs.borrow_mut() = None);
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(msg.into());
    });
}

/// Take (and clear) the last runtime error message
pub fn take_runtime_error() -> Option<String> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Check if there's a pending runtime error
pub fn has_runtime_error() -> bool {
    LAST_ERROR.with(|e| e.borrow().is_some())
}

/// Clear any pending runtime error
pub fn clear_runtime_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
    ERROR_CSTRING.with(|e| *e.borrow_mut() = None);
}

// FFI-safe error access functions

/// Check if there's a pending runtime error (FFI-safe)
#[unsafe(no_mangle)]
pub extern "C" fn patch_tabor_has_error() -> bool {
    has_runtime_error()
}

/// Get the last error message as a C string pointer (FFI-safe)
///
/// Returns null if no error is pending.
///
/// # WARNING: Pointer Lifetime
/// The returned pointer is only valid until the next call to
/// `set_runtime_error`, `get_error`, `take_error`, or `clear_error`.
/// Callers must copy the string immediately if they need to retain it.
#[unsafe(no_mangle)]
pub extern "C" fn patch_tabor_get_error() -> *const i8 {
    LAST_ERROR.with(|e| {
        let error = e.borrow();
        match &*error {
            Some(msg) => cache_cstring(msg.clone()),
            None => ptr::null(),
        }
    })
}

/// Take (and clear) the last error, returning it as a C string (FFI-safe)
///
/// Returns null if no error is pending. Same pointer-lifetime caveat as
/// `patch_tabor_get_error`.
#[unsafe(no_mangle)]
pub extern "C" fn patch_tabor_take_error() -> *const i8 {
    match take_runtime_error() {
        Some(msg) => cache_cstring(msg),
        None => ptr::null(),
    }
}

/// Clear any pending error (FFI-safe)
#[unsafe(no_mangle)]
pub extern "C" fn patch_tabor_clear_error() {
    clear_runtime_error();
}

/// Cache a message as a CString so the returned pointer stays valid until
/// the next error-state mutation. Null bytes are replaced to preserve the
/// rest of the message.
fn cache_cstring(msg: String) -> *const i8 {
    ERROR_CSTRING.with(|cs| {
        let safe_msg: String = msg.chars().map(|c| if c == '\0' { '?' } else { c }).collect();
        let cstring = CString::new(safe_msg).expect("null bytes already replaced");
        let ptr = cstring.as_ptr();
        *cs.borrow_mut() = Some(cstring);
        ptr
    })
}
