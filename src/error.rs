use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    bus::BusError,
    dao::storage::StorageError,
    gateway::GatewayError,
    state::state_machine::InvalidTransition,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable or a concurrent save won the race.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Requestor is not allowed to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested round or participant was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A cross-context lookup was not answered in time.
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// The message bus could not be reached.
    #[error("transport failure")]
    Transport(#[source] BusError),
}

impl ServiceError {
    /// Whether retrying the same command can never succeed.
    ///
    /// Permanent failures are acknowledged at the message boundary; the
    /// others are rejected so the bus redelivers them.
    pub fn is_permanent(&self) -> bool {
        match self {
            ServiceError::InvalidInput(_)
            | ServiceError::InvalidState(_)
            | ServiceError::NotFound(_)
            | ServiceError::Unauthorized(_) => true,
            ServiceError::Unavailable(_) | ServiceError::Timeout(_) | ServiceError::Transport(_) => {
                false
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => ServiceError::NotFound(format!("round {id}")),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<BusError> for ServiceError {
    fn from(err: BusError) -> Self {
        ServiceError::Transport(err)
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(source) => ServiceError::Transport(source),
            GatewayError::Closed { .. } => ServiceError::Transport(BusError::Closed),
            unanswered @ (GatewayError::Timeout { .. } | GatewayError::Decode { .. }) => {
                ServiceError::Timeout(unanswered.to_string())
            }
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A dependency did not answer in time.
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Transport(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout(message) => AppError::GatewayTimeout(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        round::RoundId,
        state_machine::{RoundPhase, RoundTrigger},
    };

    #[test]
    fn permanence_drives_redelivery() {
        assert!(ServiceError::InvalidInput("title".into()).is_permanent());
        assert!(
            ServiceError::from(InvalidTransition {
                from: RoundPhase::Deleted,
                trigger: RoundTrigger::Join,
            })
            .is_permanent()
        );
        assert!(!ServiceError::Transport(BusError::Closed).is_permanent());
        assert!(
            !ServiceError::from(StorageError::VersionConflict {
                id: RoundId(1),
                expected: 1,
                actual: 2,
            })
            .is_permanent()
        );
    }

    #[test]
    fn missing_round_in_storage_is_not_found() {
        let err = ServiceError::from(StorageError::NotFound { id: RoundId(4) });
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::InvalidState("x".into()), StatusCode::CONFLICT),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (
                ServiceError::Transport(BusError::Closed),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
