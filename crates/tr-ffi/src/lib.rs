mod error;
mod handle;
mod types;

pub use error::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError};

use tracing::{info, warn};

use tr_core::{GenerationOutcome, LlmContext};
use tr_engine::Engine;

use handle::HandleTable;

static CONTEXTS: HandleTable = HandleTable::new();
static ENGINE: OnceLock<Arc<dyn Engine>> = OnceLock::new();

/// Install the model engine the C surface drives. Call once, before any
/// `tr_init`; returns false if an engine was already installed. Without an
/// installed engine every load goes through the stub engine and fails
/// cleanly with a 0 handle.
pub fn install_engine(engine: Arc<dyn Engine>) -> bool {
    ENGINE.set(engine).is_ok()
}

fn engine() -> Arc<dyn Engine> {
    ENGINE
        .get_or_init(|| Arc::new(tr_engine::stub::StubEngine))
        .clone()
}

/// Execute a closure, catching any panic and converting it into `fallback`
/// with the last error set.
fn catch_panic<T, F>(fallback: T, f: F) -> T
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(value) => value,
        Err(_) => {
            set_last_error("internal panic");
            fallback
        }
    }
}

/// Load a model and create its decode context.
///
/// Returns an opaque nonzero handle, or 0 on failure (inspect
/// `tr_last_error`). Each successful `tr_init` must be paired with one
/// `tr_release`.
#[no_mangle]
pub unsafe extern "C" fn tr_init(model_path: *const c_char, context_size: u32) -> TrHandle {
    catch_panic(0, || {
        if model_path.is_null() {
            set_last_error("model_path is null");
            return 0;
        }
        let path = match unsafe { CStr::from_ptr(model_path) }.to_str() {
            Ok(s) => s,
            Err(e) => {
                set_last_error(format!("invalid path: {}", e));
                return 0;
            }
        };
        if context_size == 0 {
            set_last_error("context_size must be nonzero");
            return 0;
        }
        match LlmContext::init(engine(), Path::new(path), context_size) {
            Ok(ctx) => CONTEXTS.insert(ctx),
            Err(e) => {
                warn!(path, %e, "init failed");
                set_last_error(e.to_string());
                0
            }
        }
    })
}

/// Generate text for a prompt against an initialized handle.
///
/// On `Ok` a heap-allocated C string is written into `*output`; free it with
/// `tr_free_string`. `OkEmpty` means the call succeeded but nothing visible
/// was generated and `*output` is untouched.
#[no_mangle]
pub unsafe extern "C" fn tr_generate(
    handle: TrHandle,
    prompt: *const c_char,
    max_tokens: u32,
    output: *mut *mut c_char,
) -> TrStatus {
    catch_panic(TrStatus::ErrorInternal, || {
        if prompt.is_null() || output.is_null() {
            set_last_error("null argument");
            return TrStatus::ErrorInvalidArgument;
        }
        let prompt = match unsafe { CStr::from_ptr(prompt) }.to_str() {
            Ok(s) => s,
            Err(e) => {
                set_last_error(format!("invalid prompt: {}", e));
                return TrStatus::ErrorInvalidArgument;
            }
        };
        let ctx = match CONTEXTS.resolve(handle) {
            Some(ctx) => ctx,
            None => {
                set_last_error("invalid or stale handle");
                return TrStatus::ErrorInvalidHandle;
            }
        };
        let mut ctx = ctx.lock().unwrap_or_else(PoisonError::into_inner);

        match ctx.generate(prompt, max_tokens as usize) {
            Ok(GenerationOutcome::Text(result)) => match CString::new(result.text) {
                Ok(text) => {
                    unsafe { *output = text.into_raw() };
                    TrStatus::Ok
                }
                Err(e) => {
                    set_last_error(format!("output encoding error: {}", e));
                    TrStatus::ErrorGenerate
                }
            },
            Ok(GenerationOutcome::Empty) => TrStatus::OkEmpty,
            Err(e) => {
                set_last_error(e.to_string());
                TrStatus::ErrorGenerate
            }
        }
    })
}

/// Release a handle previously returned by `tr_init`.
///
/// A 0 handle is a no-op. Releasing a stale or already-released handle
/// returns `ErrorInvalidHandle` without touching any live context.
#[no_mangle]
pub extern "C" fn tr_release(handle: TrHandle) -> TrStatus {
    catch_panic(TrStatus::ErrorInternal, || {
        if handle == 0 {
            return TrStatus::Ok;
        }
        match CONTEXTS.remove(handle) {
            Some(ctx) => {
                // Frees immediately unless a call is still in flight, in
                // which case the last reference drops when it finishes.
                drop(ctx);
                info!(handle, "context released");
                TrStatus::Ok
            }
            None => {
                set_last_error("invalid or stale handle");
                TrStatus::ErrorInvalidHandle
            }
        }
    })
}

/// Retrieve the last error message for the calling thread, or null if none.
/// Free the returned string with `tr_free_string`.
#[no_mangle]
pub extern "C" fn tr_last_error() -> *const c_char {
    match take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `tr_generate` or `tr_last_error`.
#[no_mangle]
pub unsafe extern "C" fn tr_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
