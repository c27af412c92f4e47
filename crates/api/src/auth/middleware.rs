//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;

use dukapo_shared::AppError;

use crate::auth::identity::IdentityService;
use crate::auth::jwt::JwtManager;
use crate::error::ApiError;

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub pool: PgPool,
}

impl AuthState {
    fn identity(&self) -> IdentityService {
        IdentityService::new(self.pool.clone(), self.jwt_manager.clone())
    }
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware that requires authentication.
///
/// Resolves the bearer token to a `Principal` (role type recomputed from
/// the live membership row) and injects it as a request extension.
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::debug!(path = %path, "require_auth: no bearer token");
        return ApiError(AppError::Unauthenticated).into_response();
    };

    match auth_state.identity().resolve(&token).await {
        Ok(principal) => {
            tracing::debug!(
                path = %path,
                user_id = %principal.user_id,
                tenant_id = %principal.tenant_id,
                role = principal.role_type.as_str(),
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!(path = %path, error = %err, "require_auth: authentication failed");
            ApiError(err).into_response()
        }
    }
}
