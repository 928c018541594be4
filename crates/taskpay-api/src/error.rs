use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Payment(#[from] taskpay_core::Error),

    #[error(transparent)]
    Provider(#[from] taskpay_providers::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        use taskpay_core::Error as E;

        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Payment(err) => match err {
                E::TaskNotFound(_) | E::ProfileNotFound(_) | E::ProviderNotConfigured(_) => {
                    StatusCode::NOT_FOUND
                }
                E::InvalidTaskState(_) | E::PayoutInProgress(_) => StatusCode::CONFLICT,
                E::Validation(_) | E::MalformedPayload(_) | E::Json(_) => StatusCode::BAD_REQUEST,
                E::InvalidSignature => StatusCode::UNAUTHORIZED,
                E::ProviderApi { .. } | E::Provider(_) => StatusCode::BAD_GATEWAY,
                E::Storage(_) | E::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Provider(err) => match err {
                taskpay_providers::Error::ApiError { .. }
                | taskpay_providers::Error::Request(_)
                | taskpay_providers::Error::AuthError(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::UNAUTHORIZED => "invalid_signature",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::CONFLICT => "invalid_state",
            StatusCode::BAD_GATEWAY => "provider_error",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (taskpay_core::Error::TaskNotFound("t".into()), StatusCode::NOT_FOUND),
            (taskpay_core::Error::InvalidTaskState("t".into()), StatusCode::CONFLICT),
            (taskpay_core::Error::PayoutInProgress("t".into()), StatusCode::CONFLICT),
            (taskpay_core::Error::Validation("t".into()), StatusCode::BAD_REQUEST),
            (taskpay_core::Error::InvalidSignature, StatusCode::UNAUTHORIZED),
            (taskpay_core::Error::Provider("t".into()), StatusCode::BAD_GATEWAY),
            (taskpay_core::Error::Storage("t".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }
}
