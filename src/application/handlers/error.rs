use crate::domain::errors::{ErrorSeverity, TradingError};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code, e.g. `INSUFFICIENT_FUNDS`
    pub error: String,
    pub message: String,
}

/// A domain error on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub TradingError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TradingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TradingError::UserNotFound(_) | TradingError::SymbolNotFound(_) => StatusCode::NOT_FOUND,
            TradingError::SymbolDisabled(_)
            | TradingError::DuplicateUser(_)
            | TradingError::ConcurrentModification(_) => StatusCode::CONFLICT,
            TradingError::InsufficientFunds { .. } | TradingError::InsufficientShares { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TradingError::PriceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TradingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TradingError> for ApiError {
    fn from(err: TradingError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TradingError::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(TradingError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0.severity() {
            ErrorSeverity::Critical => tracing::error!("{} ({})", self.0, status),
            _ => tracing::debug!("{} ({})", self.0, status),
        }

        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
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
            (TradingError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (TradingError::UserNotFound(1), StatusCode::NOT_FOUND),
            (TradingError::SymbolNotFound("ZZZ".into()), StatusCode::NOT_FOUND),
            (TradingError::SymbolDisabled("MSFT".into()), StatusCode::CONFLICT),
            (TradingError::DuplicateUser("bob".into()), StatusCode::CONFLICT),
            (TradingError::ConcurrentModification(1), StatusCode::CONFLICT),
            (
                TradingError::InsufficientFunds {
                    required: 10.0,
                    available: 1.0,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                TradingError::PriceUnavailable {
                    symbol: "AAPL".into(),
                    reason: "down".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (TradingError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_body_carries_code_and_message() {
        let response = ApiError(TradingError::UserNotFound(7)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "USER_NOT_FOUND");
        assert!(body.message.contains('7'));
    }
}
