//! Error types for the inference pipelines.

use thiserror::Error;

/// Startup-time configuration problems (malformed env values or flags).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: `{value}` ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures of the single outbound call to the inference service.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Required credential is absent. Raised before any network I/O.
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("OpenAI error: {status} {body}")]
    Upstream { status: u16, body: String },

    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("failed to reach inference service at {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("inference service returned invalid JSON: {0}")]
    InvalidResponse(String),
}

/// No usable structured payload in a completion.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid {field} response from AI")]
    NoPayload { field: &'static str },

    #[error("Invalid {field} response from AI: {reason}")]
    Malformed { field: &'static str, reason: String },
}

/// Anything that can stop a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// A worker task failed to complete (panicked or was cancelled).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP status the boundary should answer with.
    ///
    /// A missing credential is caller-actionable, so it maps to 400 like bad input.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::InvalidInput(_) => 400,
            PipelineError::Invoke(InvokeError::NotConfigured(_)) => 400,
            PipelineError::Invoke(_) | PipelineError::Extract(_) | PipelineError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        assert_eq!(PipelineError::InvalidInput("Missing query".into()).status_code(), 400);
        assert_eq!(
            PipelineError::from(InvokeError::NotConfigured("OPENAI_API_KEY")).status_code(),
            400
        );
        assert_eq!(
            PipelineError::from(InvokeError::Upstream {
                status: 429,
                body: "slow down".into()
            })
            .status_code(),
            500
        );
        assert_eq!(
            PipelineError::from(ExtractError::NoPayload { field: "layout" }).status_code(),
            500
        );
        assert_eq!(PipelineError::Internal("task panicked".into()).status_code(), 500);
    }

    #[test]
    fn messages_carry_upstream_details() {
        let err = PipelineError::from(InvokeError::Upstream {
            status: 401,
            body: "bad key".into(),
        });
        assert_eq!(err.to_string(), "OpenAI error: 401 bad key");

        let err = PipelineError::from(InvokeError::NotConfigured("OPENAI_API_KEY"));
        assert_eq!(err.to_string(), "OPENAI_API_KEY not configured");
    }
}
