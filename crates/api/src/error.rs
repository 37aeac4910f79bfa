use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by aggregator clients.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("aggregator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Structured error body (`statusCode`, `error`, `description`).
    #[error("aggregator returned {status} {error}: {description}")]
    Api {
        status: u16,
        error: String,
        description: String,
    },

    /// Non-success status with a body that is not a structured error.
    #[error("aggregator returned HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("invalid aggregator response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid {field} in aggregator response: {value}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(default)]
    error: String,
    #[serde(default)]
    description: String,
}

impl AggregatorError {
    /// Build the error for a non-success response.
    pub fn from_response(status: StatusCode, body: String) -> Self {
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(parsed) => AggregatorError::Api {
                status: parsed.status_code,
                error: parsed.error,
                description: parsed.description,
            },
            Err(_) => AggregatorError::Http { status, body },
        }
    }

    /// True for errors worth trying again on the next run.
    pub fn is_transient(&self) -> bool {
        match self {
            AggregatorError::Transport(_) => true,
            AggregatorError::Api { status, .. } => *status >= 500 || *status == 429,
            AggregatorError::Http { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}
