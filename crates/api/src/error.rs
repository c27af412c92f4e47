//! HTTP error mapping
//!
//! Translates the shared taxonomy into responses with a stable JSON body:
//! `{"error": {"kind": ..., "message": ..., "field"?: ...}}`. Internal
//! errors log a correlation id and return a generic message; the id is the
//! only thing the caller sees of them.
//!
//! These responses are produced inside the router, beneath the CORS layer,
//! so cross-origin callers can read error bodies too.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use dukapo_billing::BillingError;
use dukapo_shared::AppError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        ApiError(AppError::from(e))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError(AppError::Database(e))
    }
}

fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
        AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AppError::Identity(e) => match e {
            dukapo_shared::IdentityError::UnknownTenant => StatusCode::NOT_FOUND,
            _ => StatusCode::UNAUTHORIZED,
        },
        AppError::Forbidden => StatusCode::FORBIDDEN,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) | AppError::Insufficient { .. } => StatusCode::CONFLICT,
        AppError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
        AppError::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
        AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let kind = self.0.kind();

        let body = match &self.0 {
            AppError::Database(e) => {
                let correlation_id = Uuid::new_v4();
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Internal database error"
                );
                json!({
                    "error": {
                        "kind": kind,
                        "message": "internal error",
                        "correlation_id": correlation_id,
                    }
                })
            }
            AppError::Internal(e) => {
                let correlation_id = Uuid::new_v4();
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Internal error"
                );
                json!({
                    "error": {
                        "kind": kind,
                        "message": "internal error",
                        "correlation_id": correlation_id,
                    }
                })
            }
            AppError::Identity(_) => json!({
                // One opaque shape for every identity failure.
                "error": { "kind": kind, "message": "authentication failed" }
            }),
            AppError::InvalidArgument { field, message } => json!({
                "error": { "kind": kind, "message": message, "field": field }
            }),
            AppError::Insufficient { product } => json!({
                "error": { "kind": kind, "message": self.0.to_string(), "product": product }
            }),
            AppError::PreconditionFailed { action } => json!({
                "error": { "kind": kind, "message": self.0.to_string(), "action": action }
            }),
            other => json!({
                "error": { "kind": kind, "message": other.to_string() }
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dukapo_shared::IdentityError;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            status_for(&AppError::invalid_argument("sku", "empty")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&AppError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AppError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AppError::not_found("sale")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AppError::conflict("sku")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&AppError::Insufficient { product: "x".into() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&AppError::precondition_failed("sale.create")),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            status_for(&AppError::DeadlineExceeded),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            status_for(&AppError::GatewayUnavailable("down".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn unknown_tenant_is_observable_the_rest_are_not() {
        assert_eq!(
            status_for(&AppError::Identity(IdentityError::UnknownTenant)),
            StatusCode::NOT_FOUND
        );
        for e in [
            IdentityError::InvalidCredentials,
            IdentityError::NotAMember,
            IdentityError::Inactive,
        ] {
            assert_eq!(status_for(&AppError::Identity(e)), StatusCode::UNAUTHORIZED);
        }
    }
}
