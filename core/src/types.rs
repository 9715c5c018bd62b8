//! Response DTOs for the Erply API.
//!
//! # Design
//! `ApiResult` keeps the decoded document as an untyped `serde_json::Value`:
//! every call returns its own record shape and the client does not interpret
//! it. The typed views here (`ResponseStatus`, `SessionRecord`) cover only
//! the envelope every call shares and the `verifyUser` record the client
//! needs for itself.

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// Outcome of a successful `ApiClient::send`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult {
    /// Decoded response of the requested call. The API reports
    /// application-level errors inside it (`status.errorCode`).
    Response(Value),

    /// `verifyUser` completed but yielded no session key; carries its
    /// decoded response verbatim. The requested call was not sent.
    AuthFailure(Value),
}

impl ApiResult {
    pub fn value(&self) -> &Value {
        match self {
            ApiResult::Response(value) | ApiResult::AuthFailure(value) => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ApiResult::Response(value) | ApiResult::AuthFailure(value) => value,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiResult::AuthFailure(_))
    }

    /// The `status` envelope, if present and well-formed.
    pub fn status(&self) -> Option<ResponseStatus> {
        ResponseStatus::from_response(self.value())
    }

    /// `status.errorCode`; 0 means the call succeeded.
    pub fn error_code(&self) -> Option<i64> {
        self.status().map(|status| status.error_code)
    }

    /// The `records` array, empty when absent.
    pub fn records(&self) -> &[Value] {
        self.value()
            .get("records")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// The `status` object every response carries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseStatus {
    pub request: Option<String>,
    pub request_unix_time: Option<i64>,
    pub response_status: Option<String>,
    pub error_code: i64,
    pub error_field: Option<String>,
    pub generation_time: Option<f64>,
    pub records_total: Option<u64>,
    pub records_in_response: Option<u64>,
}

impl ResponseStatus {
    pub fn from_response(response: &Value) -> Option<Self> {
        let status = response.get("status")?;
        serde_json::from_value(status.clone()).ok()
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == 0
    }
}

/// First record of a successful `verifyUser` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_key: String,
    /// Lifetime in seconds as declared by the server.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub session_length: i64,
}

impl SessionRecord {
    /// Read `records[0]`. Returns `None` when the record is missing,
    /// malformed, or carries an empty key (`""` or `"0"`, the same values
    /// `Params::is_supplied` rejects).
    pub fn from_response(response: &Value) -> Option<Self> {
        let record = response.get("records")?.get(0)?;
        let record: SessionRecord = serde_json::from_value(record.clone()).ok()?;
        let key = record.session_key.as_str();
        (!key.is_empty() && key != "0").then_some(record)
    }
}

/// Accept `3600`, `3600.0` or `"3600"`; `null` reads as 0.
fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| de::Error::custom(format!("invalid session length {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid session length {s:?}"))),
        other => Err(de::Error::custom(format!("invalid session length {other}"))),
    }
}
