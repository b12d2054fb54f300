use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use hms_auth::{AuthError, AuthzError, StoreError};
use hms_core::DomainError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials
        | AuthError::InvalidToken(_)
        | AuthError::PrincipalNotFound => {
            json_error(StatusCode::UNAUTHORIZED, err.code(), err.to_string())
        }
        AuthError::Store(e) => store_error_to_response(e),
        AuthError::Token(e) => {
            tracing::error!(error = %e, "token issuance failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn authz_error_to_response(err: AuthzError) -> axum::response::Response {
    let status = match err {
        AuthzError::Unauthorized => StatusCode::UNAUTHORIZED,
        AuthzError::Forbidden { .. } | AuthzError::PrivilegeEscalation { .. } => StatusCode::FORBIDDEN,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Password(_) | StoreError::Unavailable(_) => {
            tracing::error!(error = %err, "credential store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "credential store failure")
        }
    }
}
