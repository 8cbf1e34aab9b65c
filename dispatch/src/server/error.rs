//! Error type for HTTP handlers.
//!
//! Bridges [`DispatchError`] and HTTP responses, implementing Axum's
//! `IntoResponse` trait.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn get_ride(Path(id): Path<Uuid>) -> Result<Json<Ride>, AppError> {
//!     let ride = engine.get_ride(&actor, RideId::from_uuid(id)).await?;
//!     Ok(Json(ride))
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ride_dispatch_core::error::DispatchError;
use serde::Serialize;
use std::fmt;

/// Application error type for HTTP handlers.
///
/// Carries the HTTP status, a client-facing message, a machine-readable code
/// and optionally the underlying error for logging.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            message.into(),
            "UNAUTHORIZED".to_string(),
        )
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            message.into(),
            "FORBIDDEN".to_string(),
        )
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// 410 Gone, for lapsed offers.
    #[must_use]
    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, message.into(), "EXPIRED".to_string())
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::NotFound { resource, id } => Self::not_found(resource, id),
            DispatchError::Forbidden(_) => Self::forbidden(message),
            DispatchError::InvalidTransition { .. } => Self::new(
                StatusCode::CONFLICT,
                message,
                "INVALID_TRANSITION".to_string(),
            ),
            DispatchError::Expired { .. } => Self::gone(message),
            DispatchError::NotEligible { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                message,
                "PAYMENT_SETUP_REQUIRED".to_string(),
            ),
            DispatchError::InvalidInput(_) => Self::bad_request(message),
            DispatchError::Unavailable(_) => Self::unavailable("Storage temporarily unavailable")
                .with_source(anyhow::Error::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ride_dispatch_core::identity::{RideId, UserId};
    use ride_dispatch_core::ride::RideStatus;

    #[test]
    fn display_includes_code() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn dispatch_errors_map_to_statuses() {
        let cases = [
            (DispatchError::ride_not_found(RideId::new()), StatusCode::NOT_FOUND),
            (DispatchError::Forbidden("no".to_string()), StatusCode::FORBIDDEN),
            (
                DispatchError::InvalidTransition {
                    from: RideStatus::Offered,
                    action: "start",
                },
                StatusCode::CONFLICT,
            ),
            (DispatchError::Expired { ride_id: RideId::new() }, StatusCode::GONE),
            (
                DispatchError::NotEligible {
                    driver_id: UserId::new(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (DispatchError::InvalidInput("lat".to_string()), StatusCode::BAD_REQUEST),
            (
                DispatchError::Unavailable("pool".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn unavailable_keeps_source_for_logging() {
        use std::error::Error as _;

        let err = AppError::from(DispatchError::Unavailable("pool timed out".to_string()));
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
        let source = err.source().map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("Service unavailable: pool timed out")
        );
    }

    #[test]
    fn payment_refusal_has_its_own_code() {
        let err = AppError::from(DispatchError::NotEligible {
            driver_id: UserId::new(),
        });
        assert_eq!(err.code(), "PAYMENT_SETUP_REQUIRED");
    }
}
