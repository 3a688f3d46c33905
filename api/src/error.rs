use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use engine::EngineError;
use serde_json::json;
use thiserror::Error;

/// HTTP-facing wrapper around the core's error kinds.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("request processing was interrupted")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        let ApiError::Engine(err) = self else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match err {
            EngineError::InvalidSymbol(_)
            | EngineError::InvalidSide(_)
            | EngineError::InvalidOrderType(_)
            | EngineError::InvalidAmount(_)
            | EngineError::MissingPrice(_)
            | EngineError::InvalidTriggerCondition(_)
            | EngineError::InvalidRecipient
            | EngineError::InvalidEmail(_)
            | EngineError::InvalidStatus(_)
            | EngineError::InsufficientFunds { .. }
            | EngineError::InsufficientLocked { .. }
            | EngineError::TickerUnavailable(_)
            | EngineError::PriceUnavailable { .. } => StatusCode::BAD_REQUEST,
            EngineError::NotOwner => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyExists(_) | EngineError::IllegalTransition(_) => {
                StatusCode::CONFLICT
            }
            EngineError::Feed(_) | EngineError::Persistence(_) | EngineError::Pool(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.status_code().is_server_error() {
            // Internals stay in the logs, not on the wire.
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_mapping() {
        let cases: Vec<(EngineError, StatusCode)> = vec![
            (
                EngineError::InvalidAmount("amount must be positive".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::InsufficientFunds {
                    asset: "USDT".into(),
                    available: dec!(1),
                    required: dec!(2),
                },
                StatusCode::BAD_REQUEST,
            ),
            (EngineError::NotOwner, StatusCode::FORBIDDEN),
            (EngineError::NotFound("order"), StatusCode::NOT_FOUND),
            (
                EngineError::IllegalTransition("filled".into()),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::Feed("connect timeout".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn server_errors_are_not_leaked() {
        let err = ApiError::from(EngineError::Feed("secret dsn".into()));
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
