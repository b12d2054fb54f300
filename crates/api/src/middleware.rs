use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};

use hms_auth::{ACCESS_COOKIE, PermissionCache, SessionManager, cookie_value};

use crate::app::errors;

#[derive(Clone)]
pub struct AuthState {
    pub sessions: Arc<SessionManager>,
}

/// Authenticate the request and attach the principal.
///
/// On success the request carries a `Principal`, its `PrincipalContext` and
/// an empty `PermissionCache` scoped to this request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers()) else {
        return errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "authentication required",
        );
    };

    let (principal, context) = match state.sessions.authenticate(&token).await {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!(reason = e.code(), "authentication rejected");
            return errors::auth_error_to_response(e);
        }
    };

    let extensions = req.extensions_mut();
    extensions.insert(principal);
    extensions.insert(context);
    extensions.insert(PermissionCache::new());

    next.run(req).await
}

/// Bearer header first, then the access-token cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer(headers)
        .or_else(|| extract_cookie(headers))
        .map(str::to_string)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn extract_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| cookie_value(v, ACCESS_COOKIE))
}
