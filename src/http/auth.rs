use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::observability;

use super::{ApiError, AppState};

/// Operator endpoints sit behind a single bearer token; this is a one-person
/// tool, not a multi-user system.
pub(super) async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(t) if !state.admin_token.is_empty() && t == &*state.admin_token => {
            Ok(next.run(req).await)
        }
        _ => {
            metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
            Err(ApiError::Unauthorized)
        }
    }
}
