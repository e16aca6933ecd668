//! Shared reqwest plumbing for the hand-rolled HTTP providers.

use std::time::Duration;

use crate::error::LlmError;

/// Per-request timeout for classification calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client(provider: &str) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: format!("Failed to build HTTP client: {e}"),
        })
}

pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: err.to_string(),
    }
}

/// Turn a non-2xx response into the matching `LlmError`.
pub(crate) async fn check_status(
    provider: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(LlmError::AuthFailed {
            provider: provider.to_string(),
        });
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        });
    }

    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
    })
}
