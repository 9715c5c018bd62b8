//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! The decoded response crosses the boundary as JSON text rather than as a
//! mirrored C struct tree: every Erply call has its own record shape, and C
//! callers already need a JSON parser for them. Conversion helpers live here
//! to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::CString;
use std::os::raw::c_char;

use erply_core::{ApiError, ApiResult, TransportError, UreqTransport};

/// Opaque handle to an `ApiClient`. C callers receive a pointer to this
/// and pass it back into every FFI function.
pub struct FfiErplyClient {
    pub(crate) inner: erply_core::ApiClient<UreqTransport>,
}

/// Outcome category of `erply_client_send`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResultKind {
    /// `body_json` holds the decoded response. Check `status.errorCode`.
    Ok = 0,
    /// `verifyUser` yielded no session key; `body_json` holds its response.
    AuthFailure = 1,
    Configuration = 2,
    Transport = 3,
    Decode = 4,
    Encode = 5,
    NullArg = 6,
    InvalidParams = 7,
    Panic = 8,
}

/// Result envelope for `erply_client_send`.
///
/// `body_json` is set for `Ok` and `AuthFailure`; `error_message` for every
/// other kind. `transport_code` is non-zero only for transport failures and
/// `http_status` only for status failures.
#[repr(C)]
pub struct FfiApiResult {
    pub kind: FfiResultKind,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub transport_code: i32,
    pub body_json: *mut c_char,
}

impl FfiApiResult {
    pub(crate) fn from_result(result: ApiResult) -> *mut Self {
        let kind = if result.is_auth_failure() {
            FfiResultKind::AuthFailure
        } else {
            FfiResultKind::Ok
        };
        Self::boxed(FfiApiResult {
            kind,
            error_message: std::ptr::null_mut(),
            http_status: 0,
            transport_code: 0,
            body_json: into_c_string(result.value().to_string()),
        })
    }

    pub(crate) fn from_error(err: ApiError) -> *mut Self {
        let (kind, http_status, transport_code) = match &err {
            ApiError::Configuration(_) => (FfiResultKind::Configuration, 0, 0),
            ApiError::Transport(TransportError::Exchange { code, .. }) => {
                (FfiResultKind::Transport, 0, *code)
            }
            ApiError::Transport(TransportError::Status(status)) => {
                (FfiResultKind::Transport, *status, 0)
            }
            ApiError::Decode(_) => (FfiResultKind::Decode, 0, 0),
            ApiError::Encode(_) => (FfiResultKind::Encode, 0, 0),
        };
        Self::failure(kind, &err.to_string(), http_status, transport_code)
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::failure(FfiResultKind::NullArg, &format!("null argument: {name}"), 0, 0)
    }

    pub(crate) fn invalid_params(msg: &str) -> *mut Self {
        Self::failure(FfiResultKind::InvalidParams, msg, 0, 0)
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::failure(FfiResultKind::Panic, msg, 0, 0)
    }

    fn failure(kind: FfiResultKind, msg: &str, http_status: u16, transport_code: i32) -> *mut Self {
        Self::boxed(FfiApiResult {
            kind,
            error_message: into_c_string(msg.to_string()),
            http_status,
            transport_code,
            body_json: std::ptr::null_mut(),
        })
    }

    fn boxed(result: FfiApiResult) -> *mut Self {
        Box::into_raw(Box::new(result))
    }
}

/// Hand a Rust string to C. Interior NULs cannot be represented and are
/// dropped.
pub(crate) fn into_c_string(s: String) -> *mut c_char {
    let s = if s.contains('\0') { s.replace('\0', "") } else { s };
    CString::new(s).unwrap_or_default().into_raw()
}
