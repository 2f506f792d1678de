use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::error::RateError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

/// Error returned to HTTP callers as `{ "code", "message" }`.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    /// Maps an engine failure, using `code` for everything that is not a
    /// plain validation error.
    pub fn from_rate_error(err: RateError, code: &'static str) -> Self {
        match err {
            RateError::Validation(message) => Self::validation(message),
            other => Self::new(StatusCode::BAD_REQUEST, code, other.to_string()),
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(ErrorBody {
            code: self.code,
            message: &self.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_error_mapping() {
        let err = ApiError::from_rate_error(RateError::Unavailable, "rates_unavailable");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "rates_unavailable");
        assert_eq!(err.to_string(), "rates_unavailable: rates are not available yet");

        let err = ApiError::from_rate_error(
            RateError::Validation("amount must be non-negative".to_string()),
            "conversion_failed",
        );
        assert_eq!(err.code(), "validation_error");
    }
}
