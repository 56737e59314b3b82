// ABOUTME: Error types for Git provider operations
// ABOUTME: Separates rejected credentials from other API failures

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to a Git hosting provider.
#[derive(Debug, Error)]
pub enum GitError {
    /// The access token was rejected (missing, expired, or lacking scope).
    #[error("{provider} rejected the access token ({status}): {body}")]
    Auth {
        provider: String,
        status: StatusCode,
        body: String,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: StatusCode,
        body: String,
    },

    /// The request never produced a response.
    #[error("request to {provider} failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// A success response did not have the documented shape.
    #[error("unexpected response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// No registered provider matches the selector.
    #[error("unknown git provider: {0}")]
    UnknownProvider(String),

    /// An API base URL could not be parsed.
    #[error("invalid API base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Result type alias using GitError.
pub type Result<T> = std::result::Result<T, GitError>;

impl GitError {
    /// Map a non-success HTTP status to `Auth` or `Api`.
    pub(crate) fn from_status(provider: &str, status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GitError::Auth {
                provider: provider.to_string(),
                status,
                body,
            },
            _ => GitError::Api {
                provider: provider.to_string(),
                status,
                body,
            },
        }
    }

    /// True when retrying with the same token cannot succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, GitError::Auth { .. })
    }
}
