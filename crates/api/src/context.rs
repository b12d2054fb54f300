use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;

use hms_auth::{Principal, PrincipalContext};

use crate::app::errors;

/// The authenticated principal of a request.
///
/// Present only behind the authentication middleware; both values come from
/// the same fresh credential-store read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPrincipal {
    pub principal: Principal,
    pub context: PrincipalContext,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts.extensions.get::<Principal>().cloned();
        let context = parts.extensions.get::<PrincipalContext>().copied();
        match (principal, context) {
            (Some(principal), Some(context)) => Ok(Self { principal, context }),
            _ => Err(errors::json_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "authentication required",
            )),
        }
    }
}
