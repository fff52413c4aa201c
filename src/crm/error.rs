use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;

use crate::security::validation::{ValidationError, ValidationResult};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("validation failed")]
    Validation(Vec<ValidationError>),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CrmError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(vec![ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

impl From<ValidationResult> for CrmError {
    fn from(result: ValidationResult) -> Self {
        Self::Validation(result.into_errors())
    }
}

impl From<ValidationError> for CrmError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(vec![err])
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(errors) => {
                let errors: Vec<_> = errors
                    .iter()
                    .map(|e| json!({ "field": e.field(), "message": e.message() }))
                    .collect();
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "message": "Validation failed", "errors": errors }),
                )
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "message": "Unauthorized" }),
            ),
            Self::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "message": self.to_string() }),
            ),
            Self::InvalidTransition { entity, from, to } => (
                StatusCode::CONFLICT,
                json!({
                    "message": self.to_string(),
                    "error": "invalid_transition",
                    "entity": entity,
                    "from": from,
                    "to": to,
                }),
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, json!({ "message": msg })),
            Self::Storage(e) => {
                error!("Storage failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal server error" }),
                )
            }
            Self::Internal(msg) => {
                error!("Internal failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(err: CrmError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let err = CrmError::Validation(vec![ValidationError::Required("name".to_string())]);
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "name");
        assert_eq!(body["errors"][0]["message"], "is required");
    }

    #[tokio::test]
    async fn test_storage_detail_is_not_leaked() {
        let err = CrmError::Storage(StoreError::Corrupt("status 'bogus' in leads".to_string()));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_invalid_transition_is_conflict() {
        let err = CrmError::InvalidTransition {
            entity: "deal",
            from: "handover".to_string(),
            to: "offer".to_string(),
        };
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "invalid_transition");
        assert_eq!(body["from"], "handover");
    }

    #[tokio::test]
    async fn test_unauthorized_shape() {
        let (status, body) = body_of(CrmError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "message": "Unauthorized" }));
    }
}
