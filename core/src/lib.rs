//! Blocking client core for the Erply API.
//!
//! # Overview
//! Every Erply call is a form POST to one account URL, naming the call in a
//! `request` field. `ApiClient::send` adds the account code and a session
//! key, obtaining the key from `verifyUser` on first use and again shortly
//! before the server would expire it, then decodes the JSON response.
//!
//! # Design
//! - `ClientConfig` is built once; the URL always ends in `/`.
//! - The physical exchange sits behind the `Transport` trait. `UreqTransport`
//!   (feature `ureq`, on by default) is the stock implementation; tests and
//!   FFI hosts can supply their own.
//! - `SessionManager` owns the key cache and serializes refreshes, so one
//!   client can be shared across threads without duplicate `verifyUser`
//!   calls.
//! - Transport failures, non-200 statuses and undecodable bodies are
//!   `ApiError`s. A rejected `verifyUser` is not: it is returned as
//!   `ApiResult::AuthFailure` carrying the server's answer.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod params;
pub mod session;
#[cfg(feature = "ureq")]
pub mod transport;
pub mod types;

pub use client::ApiClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ApiError, TransportError};
pub use http::{HttpRequest, Transport, TransportOutcome};
pub use params::Params;
pub use session::{Clock, SessionManager, SessionState, SystemClock};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use types::{ApiResult, ResponseStatus, SessionRecord};

pub use serde_json::{json, Value};
