//! Shared blocking HTTP plumbing: client setup and status classification.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::{Deserialize, DeserializeOwned};
use tracing::trace;

use crate::infrastructure::error::{InfraError, InfraResult, RemoteError, RemoteResult};

pub const USER_AGENT: &str = concat!("cladesync/", env!("CARGO_PKG_VERSION"));

pub fn build_client(user_agent: &str, timeout: Duration) -> InfraResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| InfraError::Http {
            message: e.to_string(),
        })
}

/// Map transport failures and non-success statuses onto [`RemoteError`].
pub fn classify(result: reqwest::Result<Response>) -> RemoteResult<Response> {
    let response = result.map_err(|e| RemoteError::Transient(e.to_string()))?;
    let status = response.status();
    trace!("{} {}", status, response.url());

    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(RemoteError::Throttled { retry_after });
    }

    let body = response.text().unwrap_or_default();
    if status.is_server_error() {
        Err(RemoteError::Transient(format!("{status}: {body}")))
    } else {
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }
}

pub fn read_json<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    response
        .json::<T>()
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Raw response body; a connection dropped mid-body is transient.
pub fn read_bytes(response: Response) -> RemoteResult<Vec<u8>> {
    response
        .bytes()
        .map(|body| body.to_vec())
        .map_err(|e| RemoteError::Transient(e.to_string()))
}

/// Decode without a nesting limit; the stack grows on demand instead.
pub fn decode_deep<T: DeserializeOwned>(body: &[u8]) -> RemoteResult<T> {
    let mut json = serde_json::Deserializer::from_slice(body);
    json.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut json))
        .map_err(|e| RemoteError::Decode(e.to_string()))?;
    json.end().map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(value)
}
