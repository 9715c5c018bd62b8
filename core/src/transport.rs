//! Blocking `Transport` backed by ureq.
//!
//! # Design
//! ureq's status-as-error behavior is disabled so every completed exchange
//! comes back as a `TransportOutcome` with its status, and only failures to
//! complete the exchange become transport errors. Those are reported with
//! libcurl's numeric codes, which Erply's own client libraries expose too.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::http::{HttpRequest, Transport, TransportOutcome};

/// Generic failure.
pub const ERR_FAILED: i32 = 2;
pub const ERR_URL_MALFORMAT: i32 = 3;
pub const ERR_COULDNT_RESOLVE_HOST: i32 = 6;
pub const ERR_COULDNT_CONNECT: i32 = 7;
pub const ERR_OPERATION_TIMEDOUT: i32 = 28;
pub const ERR_RECV_ERROR: i32 = 56;

#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(connection_timeout: Option<Duration>, execution_timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(connection_timeout)
            .timeout_global(execution_timeout)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Honor the timeouts configured in `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.connection_timeout(), config.execution_timeout())
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl Transport for UreqTransport {
    fn post(&self, request: &HttpRequest) -> TransportOutcome {
        let mut builder = self.agent.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = match builder.send(request.body.as_bytes()) {
            Ok(response) => response,
            Err(e) => return failure(&e),
        };
        let status = response.status().as_u16();
        // Large list calls can exceed ureq's default 10 MiB body cap.
        match response.body_mut().with_config().limit(u64::MAX).read_to_vec() {
            Ok(body) => TransportOutcome::completed(status, body),
            Err(e) => failure(&e),
        }
    }
}

fn failure(err: &ureq::Error) -> TransportOutcome {
    let code = match err {
        ureq::Error::Timeout(_) => ERR_OPERATION_TIMEDOUT,
        ureq::Error::HostNotFound => ERR_COULDNT_RESOLVE_HOST,
        ureq::Error::BadUri(_) => ERR_URL_MALFORMAT,
        ureq::Error::Io(e) => match e.kind() {
            io::ErrorKind::ConnectionRefused => ERR_COULDNT_CONNECT,
            io::ErrorKind::TimedOut => ERR_OPERATION_TIMEDOUT,
            _ => ERR_RECV_ERROR,
        },
        _ => ERR_FAILED,
    };
    tracing::warn!(code, error = %err, "transport failed");
    TransportOutcome::failed(code, err.to_string())
}
