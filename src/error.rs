use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError, dto::ws::close_code, services::token_service::TokenError,
    state::game::GameError,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Missing or broken server-side configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Close code sent when a websocket handshake fails with this error.
    pub fn close_code(&self) -> u16 {
        match self {
            ServiceError::Unauthorized(_) => close_code::UNAUTHORIZED,
            ServiceError::InvalidInput(_)
            | ServiceError::InvalidState(_)
            | ServiceError::NotFound(_) => close_code::BAD_REQUEST,
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Config(_) => {
                close_code::SERVER_ERROR
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<GameError> for ServiceError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            GameError::InvalidInput(message) => ServiceError::InvalidInput(message),
            GameError::Full
            | GameError::InvalidPhase { .. }
            | GameError::NotEligible(_)
            | GameError::Paused
            | GameError::Transition(_) => ServiceError::InvalidState(err.to_string()),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingKey(_) | TokenError::InvalidKey(_) | TokenError::Sign(_) => {
                ServiceError::Config(err.to_string())
            }
            TokenError::Invalid(_) => {
                ServiceError::Unauthorized("invalid authentication credentials".into())
            }
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
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
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Config(message) => AppError::Internal(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
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
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
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
    use crate::state::state_machine::GamePhase;

    #[test]
    fn game_errors_map_to_handshake_codes() {
        let full: ServiceError = GameError::Full.into();
        assert!(matches!(full, ServiceError::InvalidState(_)));
        assert_eq!(full.close_code(), close_code::BAD_REQUEST);

        let stale: ServiceError = GameError::InvalidPhase {
            expected: GamePhase::PreGame,
            got: GamePhase::RecvPick,
        }
        .into();
        assert_eq!(stale.close_code(), close_code::BAD_REQUEST);

        let unknown: ServiceError = GameError::NotFound("p9".into()).into();
        assert!(matches!(unknown, ServiceError::NotFound(_)));
        assert_eq!(ServiceError::Degraded.close_code(), close_code::SERVER_ERROR);
    }

    #[test]
    fn service_errors_pick_http_statuses() {
        let response =
            AppError::from(ServiceError::Unauthorized("bad token".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AppError::from(ServiceError::Config("no keys".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response =
            AppError::from(ServiceError::InvalidState("game is full".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
