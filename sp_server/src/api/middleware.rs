//! Authentication middleware for protected endpoints.
//!
//! Extracts the JWT access token from the `Authorization: Bearer <token>`
//! header, validates it, and injects the decoded [`Claims`] into request
//! extensions for downstream handlers:
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use sp_server::api::auth::Claims;
//!
//! async fn protected_handler(Extension(claims): Extension<Claims>) -> String {
//!     format!("Authenticated as user {}", claims.sub)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use super::AppState;
use super::auth::Claims;

/// Validate the bearer token and inject [`Claims`] into request extensions.
///
/// Missing header, malformed header, and invalid or expired tokens all
/// return `401 Unauthorized`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match auth_header {
        Some(t) => t,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    match state.tokens.verify_access_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Reject requests whose token does not carry a partner or admin role.
///
/// Layered after [`auth_middleware`], so the claims extension is present.
pub async fn require_partner(request: Request, next: Next) -> Result<Response, StatusCode> {
    let is_partner = request
        .extensions()
        .get::<Claims>()
        .is_some_and(|claims| claims.role.is_partner());

    if is_partner {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}
