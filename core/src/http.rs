//! HTTP exchange types and the `Transport` seam.
//!
//! # Design
//! The client describes each call as a plain-data `HttpRequest` and hands it
//! to a `Transport`, which reports back a `TransportOutcome`. The transport
//! never interprets status codes or bodies; classification happens in
//! `TransportOutcome::check`, so any transport (ureq, a test double, a host
//! language across FFI) gets the same error semantics.
//!
//! All fields use owned types so values can cross FFI boundaries without
//! lifetime concerns.

use std::sync::Arc;

use crate::error::{ApiError, TransportError};
use crate::params::Params;

/// The only status code treated as a completed exchange.
pub const SUCCESS_STATUS: u16 = 200;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A form POST described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// Build a form-encoded POST of `params` to `url`.
    pub fn form_post(url: &str, params: &Params) -> Result<Self, ApiError> {
        Ok(Self {
            url: url.to_string(),
            headers: vec![("content-type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body: params.to_form()?,
        })
    }
}

/// Result of one physical exchange.
///
/// `error_code` is set only when the transport could not complete the
/// exchange; `status` is 0 in that case and `body` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOutcome {
    pub body: Vec<u8>,
    pub error_code: Option<i32>,
    pub error_text: Option<String>,
    pub status: u16,
}

impl TransportOutcome {
    /// An exchange that completed with `status`.
    pub fn completed(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            error_code: None,
            error_text: None,
            status,
        }
    }

    /// An exchange the transport could not complete.
    pub fn failed(code: i32, text: impl Into<String>) -> Self {
        Self {
            body: Vec::new(),
            error_code: Some(code),
            error_text: Some(text.into()),
            status: 0,
        }
    }

    /// Classify the outcome. A transport error takes precedence over the
    /// status code; a non-200 status never exposes its body.
    pub fn check(&self) -> Result<&[u8], TransportError> {
        if let Some(code) = self.error_code.filter(|code| *code != 0) {
            return Err(TransportError::Exchange {
                code,
                message: self.error_text.clone().unwrap_or_default(),
            });
        }
        if self.status != SUCCESS_STATUS {
            return Err(TransportError::Status(self.status));
        }
        Ok(&self.body)
    }
}

/// Performs a single blocking POST.
///
/// Implementations must return the raw, undecoded body on completion and
/// must not retry.
pub trait Transport {
    fn post(&self, request: &HttpRequest) -> TransportOutcome;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post(&self, request: &HttpRequest) -> TransportOutcome {
        (**self).post(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post(&self, request: &HttpRequest) -> TransportOutcome {
        (**self).post(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn post(&self, request: &HttpRequest) -> TransportOutcome {
        (**self).post(request)
    }
}
