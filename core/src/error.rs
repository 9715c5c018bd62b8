//! Error types for the Erply API client.
//!
//! # Design
//! Only failures the caller cannot branch on as data are errors here. A
//! `verifyUser` call that completes but yields no session key is not an
//! error: it comes back as `ApiResult::AuthFailure` with the remote payload
//! intact. Everything in this module is raised from `ApiClient::send`.

/// Errors returned by `ApiClient::send`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Required configuration is missing. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The exchange could not be completed or returned a non-200 status.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The body of a 200 response is not valid JSON.
    #[error("cannot decode API response: {0}")]
    Decode(String),

    /// The parameter set could not be form-encoded.
    #[error("cannot encode request parameters: {0}")]
    Encode(String),
}

/// Failure of a single physical exchange.
///
/// `Exchange` wins over `Status` when both could apply: a transport that
/// gave up mid-flight reports status 0, which is never inspected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport could not complete the exchange (refused, timed out, ...).
    #[error("transport error {code}: {message}")]
    Exchange { code: i32, message: String },

    /// The exchange completed with a status other than 200.
    #[error("HTTP status code {0}")]
    Status(u16),
}
