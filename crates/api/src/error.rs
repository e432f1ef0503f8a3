use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use extract::ExtractError;
use resolve::{PipelineError, ResolveError};
use serde::Serialize;
use std::time::Duration;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    Timeout(Duration),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_draft: Option<String>,
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(PipelineError::Generation(ExtractError::GenerationExhausted {
                ..
            })) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Pipeline(PipelineError::Resolution(ResolveError::NoCandidate { .. })) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorBody {
    fn message(error: String) -> Self {
        Self {
            error,
            attempts: None,
            last_draft: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Pipeline(PipelineError::Generation(ExtractError::GenerationExhausted {
                attempts,
                last_draft,
                message,
            })) => ErrorBody {
                error: format!("generation failed after {attempts} attempt(s): {message}"),
                attempts: Some(attempts),
                last_draft: Some(last_draft),
            },
            ApiError::Timeout(limit) => {
                ErrorBody::message(format!("request exceeded {}s", limit.as_secs()))
            }
            ApiError::Pipeline(e) => ErrorBody::message(format!("{e:#}")),
            ApiError::Internal(e) => ErrorBody::message(format!("{e:#}")),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %body.error, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let exhausted = ApiError::Pipeline(PipelineError::Generation(
            ExtractError::GenerationExhausted {
                attempts: 3,
                last_draft: String::new(),
                message: "bad".to_string(),
            },
        ));
        assert_eq!(exhausted.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let no_candidate = ApiError::Pipeline(PipelineError::Resolution(
            ResolveError::NoCandidate {
                text: "Ada".to_string(),
            },
        ));
        assert_eq!(no_candidate.status(), StatusCode::NOT_FOUND);

        let unresolved = ApiError::Pipeline(PipelineError::Resolution(
            ResolveError::UnresolvedPlaceholder {
                id: "X".to_string(),
            },
        ));
        assert_eq!(unresolved.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
