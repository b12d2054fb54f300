use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use hms_auth::{
    AuthError, NewPrincipal, PrincipalUpdate, REFRESH_COOKIE, Role, TokenPair, cookie_value,
};

use crate::app::dto::{
    self, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, UpdateMeRequest,
    UserResponse,
};
use crate::app::{AppState, errors};
use crate::context::CurrentPrincipal;

/// Endpoints reachable without a session.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

/// Endpoints that need the authentication middleware.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me).put(update_me))
        .route("/auth/change-password", post(change_password))
}

fn set_cookies(cookies: [String; 2]) -> AppendHeaders<[(header::HeaderName, String); 2]> {
    let [access, refresh] = cookies;
    AppendHeaders([(header::SET_COOKIE, access), (header::SET_COOKIE, refresh)])
}

/// POST /auth/register - self-service sign-up, always as a basic user
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, Response> {
    dto::validate_name(&req.name)
        .and_then(|_| dto::validate_email(&req.email))
        .and_then(|_| dto::validate_password(&req.password))
        .map_err(errors::domain_error_to_response)?;

    let principal = state
        .store
        .insert(
            NewPrincipal {
                identifier: req.email,
                display_name: req.name,
                role: Role::User,
                tenant_id: req.hospital_id,
            },
            &req.password,
        )
        .await
        .map_err(errors::store_error_to_response)?;

    tracing::info!(principal_id = %principal.id, "principal registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": UserResponse::from(principal) })),
    )
        .into_response())
}

/// POST /auth/login - exchange credentials for session cookies
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, Response> {
    dto::validate_email(&req.email)
        .and_then(|_| dto::require_password(&req.password))
        .map_err(errors::domain_error_to_response)?;

    let (principal, pair) = state
        .sessions
        .login(&req.email, &req.password)
        .await
        .map_err(errors::auth_error_to_response)?;

    Ok((
        StatusCode::OK,
        set_cookies(state.sessions.session_cookies(&pair)),
        Json(json!({ "user": UserResponse::from(principal) })),
    )
        .into_response())
}

/// POST /auth/refresh - rotate the session using the refresh cookie or body
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<Response, Response> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| cookie_value(v, REFRESH_COOKIE))
        .map(str::to_string);
    let from_body = body
        .and_then(|Json(b)| b.refresh_token)
        .filter(|t| !t.trim().is_empty());

    let Some(token) = from_cookie.or(from_body) else {
        return Err(errors::auth_error_to_response(AuthError::InvalidToken(
            hms_auth::VerificationError::Malformed,
        )));
    };

    let pair: TokenPair = state
        .sessions
        .refresh(&token)
        .await
        .map_err(errors::auth_error_to_response)?;

    Ok((
        StatusCode::OK,
        set_cookies(state.sessions.session_cookies(&pair)),
        Json(json!({ "success": true })),
    )
        .into_response())
}

/// POST /auth/logout - clear the session cookies
///
/// Tokens already handed out stay valid until they expire.
pub async fn logout(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        set_cookies(state.sessions.logout()),
        Json(json!({ "success": true })),
    )
        .into_response()
}

/// GET /auth/me
pub async fn me(current: CurrentPrincipal) -> Response {
    Json(json!({ "user": UserResponse::from(current.principal) })).into_response()
}

/// PUT /auth/me - update own display name or email
pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Response, Response> {
    if let Some(name) = &req.name {
        dto::validate_name(name).map_err(errors::domain_error_to_response)?;
    }
    if let Some(email) = &req.email {
        dto::validate_email(email).map_err(errors::domain_error_to_response)?;
    }

    let updated = state
        .store
        .update(
            current.principal.id,
            PrincipalUpdate {
                identifier: req.email,
                display_name: req.name,
                ..Default::default()
            },
        )
        .map_err(errors::store_error_to_response)?;

    Ok(Json(json!({ "success": true, "user": UserResponse::from(updated) })).into_response())
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Response, Response> {
    dto::validate_password(&req.new_password).map_err(errors::domain_error_to_response)?;

    let changed = state
        .store
        .change_secret(&current.principal, &req.current_password, &req.new_password)
        .await
        .map_err(errors::store_error_to_response)?;
    if !changed {
        tracing::warn!(principal_id = %current.principal.id, "password change rejected: current secret mismatch");
        return Err(errors::json_error(
            StatusCode::UNAUTHORIZED,
            AuthError::InvalidCredentials.code(),
            "current password is incorrect",
        ));
    }

    tracing::info!(principal_id = %current.principal.id, "password changed");
    Ok(Json(json!({ "success": true, "message": "password updated" })).into_response())
}
