//! C-ABI wrapper around `erply-core`.
//!
//! # Overview
//! Exposes a session-aware Erply client through `extern "C"` functions so
//! any language with a C FFI can make API calls without reimplementing the
//! session key handling.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Parameters go in as a JSON object string; responses come back as JSON
//!   text inside a single `FfiApiResult` envelope whose `kind` says how to
//!   read it.
//! - The C caller owns all returned pointers and must call the matching
//!   `erply_free_*` / `erply_client_free` function to release them.
//! - Unlike the core's `Transport` seam, the handle always talks HTTP itself
//!   through ureq; the client keeps session state between calls, so the host
//!   cannot drive the I/O one request at a time.

pub mod types;

use std::ffi::{CStr, CString};
use std::str::Utf8Error;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use erply_core::{ApiClient, ClientConfig, Params, Value};

use types::*;

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client for one Erply account.
///
/// Any string may be null, meaning unset. A client without `url` can be
/// created but every send fails with `Configuration`. Timeouts of 0 mean
/// no limit. Returns null if a string is not valid UTF-8 or an internal
/// panic occurs.
/// The caller must free the returned pointer with `erply_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn erply_client_new(
    url: *const c_char,
    client_code: *const c_char,
    username: *const c_char,
    password: *const c_char,
    connect_timeout_secs: u32,
    execution_timeout_secs: u32,
) -> *mut FfiErplyClient {
    catch_unwind(AssertUnwindSafe(|| {
        let (Ok(url), Ok(client_code), Ok(username), Ok(password)) = (
            opt_str(url),
            opt_str(client_code),
            opt_str(username),
            opt_str(password),
        ) else {
            tracing::warn!("erply_client_new: argument is not valid UTF-8");
            return std::ptr::null_mut();
        };

        let mut builder = ClientConfig::builder();
        if let Some(url) = url {
            builder = builder.url(&url);
        }
        if let Some(code) = client_code {
            builder = builder.client_code(code);
        }
        if let Some(username) = username {
            builder = builder.username(username);
        }
        if let Some(password) = password {
            builder = builder.password(password);
        }
        if connect_timeout_secs > 0 {
            builder = builder.connection_timeout(Duration::from_secs(connect_timeout_secs.into()));
        }
        if execution_timeout_secs > 0 {
            builder = builder.execution_timeout(Duration::from_secs(execution_timeout_secs.into()));
        }
        let client = ApiClient::from_config(builder.build());
        Box::into_raw(Box::new(FfiErplyClient { inner: client }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `erply_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn erply_client_free(client: *mut FfiErplyClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Seed a previously obtained session key, valid until `expires_at`
/// (unix seconds). Returns false if `client` or `key` is null, or `key` is
/// not valid UTF-8.
#[unsafe(no_mangle)]
pub extern "C" fn erply_client_seed_session(
    client: *const FfiErplyClient,
    key: *const c_char,
    expires_at: i64,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || key.is_null() {
            return false;
        }
        let Ok(key) = c_str(key) else {
            return false;
        };
        let client = unsafe { &*client };
        client.inner.seed_session(key, expires_at);
        true
    }))
    .unwrap_or(false)
}

/// The cached session key, or null if none. Free with `erply_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn erply_client_session_key(client: *const FfiErplyClient) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        client
            .inner
            .session_key()
            .map_or(std::ptr::null_mut(), into_c_string)
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Expiry of the cached session key in unix seconds, or 0 if unset.
#[unsafe(no_mangle)]
pub extern "C" fn erply_client_expiry_timestamp(client: *const FfiErplyClient) -> i64 {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return 0;
        }
        let client = unsafe { &*client };
        client.inner.expiry_timestamp().unwrap_or(0)
    }))
    .unwrap_or(0)
}

/// HTTP status of the last exchange: 0 if it could not be completed,
/// -1 if nothing was sent yet or `client` is null.
#[unsafe(no_mangle)]
pub extern "C" fn erply_client_last_status(client: *const FfiErplyClient) -> i32 {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return -1;
        }
        let client = unsafe { &*client };
        client.inner.last_status().map_or(-1, i32::from)
    }))
    .unwrap_or(-1)
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Send API call `call` with `params_json`, a JSON object of input
/// parameters (null or empty for none).
///
/// Never returns null. Free the result with `erply_free_result`.
#[unsafe(no_mangle)]
pub extern "C" fn erply_client_send(
    client: *const FfiErplyClient,
    call: *const c_char,
    params_json: *const c_char,
) -> *mut FfiApiResult {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return FfiApiResult::null_arg("client");
        }
        if call.is_null() {
            return FfiApiResult::null_arg("call");
        }
        let client = unsafe { &*client };
        let Ok(call) = c_str(call) else {
            return FfiApiResult::invalid_params("call is not valid UTF-8");
        };
        let params = match parse_params(params_json) {
            Ok(params) => params,
            Err(msg) => return FfiApiResult::invalid_params(&msg),
        };
        match client.inner.send(&call, params) {
            Ok(result) => FfiApiResult::from_result(result),
            Err(e) => FfiApiResult::from_error(e),
        }
    }))
    .unwrap_or_else(|_| {
        tracing::error!("panic in erply_client_send");
        FfiApiResult::panic("panic in erply_client_send")
    })
}

fn parse_params(params_json: *const c_char) -> Result<Params, String> {
    let text = opt_str(params_json).map_err(|e| format!("params are not valid UTF-8: {e}"))?;
    let Some(text) = text else {
        return Ok(Params::new());
    };
    if text.trim().is_empty() {
        return Ok(Params::new());
    }
    let value: Value =
        serde_json::from_str(&text).map_err(|e| format!("params are not valid JSON: {e}"))?;
    Params::try_from(value).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiApiResult` returned by `erply_client_send`. Safe to call with
/// null.
#[unsafe(no_mangle)]
pub extern "C" fn erply_free_result(result: *mut FfiApiResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { CString::from_raw(result.error_message) });
        }
        if !result.body_json.is_null() {
            drop(unsafe { CString::from_raw(result.body_json) });
        }
    }));
}

/// Free a string returned by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn erply_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { CString::from_raw(s) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Copy a non-null C string. Invalid UTF-8 is an error, never replaced.
fn c_str(ptr: *const c_char) -> Result<String, Utf8Error> {
    unsafe { CStr::from_ptr(ptr) }.to_str().map(str::to_owned)
}

fn opt_str(ptr: *const c_char) -> Result<Option<String>, Utf8Error> {
    if ptr.is_null() {
        Ok(None)
    } else {
        c_str(ptr).map(Some)
    }
}
