//! Error types for the provider clients.

use thiserror::Error;

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for provider operations.
///
/// Rate limiting is its own variant, not a generic API error: callers are
/// expected to branch on it and continue with whatever other sources they
/// have rather than failing the whole request.
#[derive(Error, Debug)]
pub enum Error {
    /// The provider's request quota was exceeded (HTTP 429).
    #[error("provider rate limit exceeded")]
    RateLimited {
        /// Seconds to wait, from the Retry-After header when present.
        retry_after_secs: Option<u64>,
    },

    /// Non-success response from the provider.
    #[error("provider error: http {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connect, TLS, timeout).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed response body.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }
}

/// Maximum number of body bytes carried into an [`Error::Api`] message.
const MAX_ERROR_BODY: usize = 512;

/// Convert a non-success response into the matching error variant,
/// consuming the body for the human-readable cause.
pub(crate) async fn error_for_response(response: reqwest::Response) -> Error {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Error::RateLimited { retry_after_secs };
    }

    let mut message = response.text().await.unwrap_or_default();
    message.truncate(MAX_ERROR_BODY);
    Error::Api {
        status: status.as_u16(),
        message,
    }
}
