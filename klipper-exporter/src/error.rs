//! Errors raised while talking to a Moonraker upstream.

use thiserror::Error;

/// A failed upstream fetch.
///
/// Every variant is recoverable: the collector logs it and skips the
/// affected module.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The target could not be turned into a request URL.
    #[error("invalid upstream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connection, timeout or body read failure.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The body was not the JSON document we expected.
    #[error("unable to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Short error class used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } | FetchError::Request { .. } => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Decode { .. } => "decode",
        }
    }

    /// The URL of the failed request.
    pub fn url(&self) -> &str {
        match self {
            FetchError::InvalidUrl { url, .. }
            | FetchError::Request { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Decode { url, .. } => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_and_url() {
        let err = FetchError::Status {
            url: "http://printer:7125/server/spoolman/status".to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        };
        assert_eq!(err.kind(), "status");
        assert_eq!(err.url(), "http://printer:7125/server/spoolman/status");
        assert!(err.to_string().contains("404"));

        let source = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = FetchError::Decode {
            url: "http://printer/machine/proc_stats".to_string(),
            source,
        };
        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().starts_with("unable to decode response from"));
    }
}
