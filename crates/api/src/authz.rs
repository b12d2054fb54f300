//! Authorization gate as a route layer.
//!
//! Sits behind the authentication middleware. Gates stacked on one route
//! share the request's `PermissionCache`, so a principal's permissions are
//! resolved at most once per request.

use std::sync::Arc;

use axum::{extract::State, middleware::Next, response::Response};

use hms_auth::{PermissionCache, PermissionResolver, PrincipalContext, Requirement, authorize};

use crate::app::errors;

#[derive(Debug, Clone)]
pub struct GateState {
    resolver: Arc<PermissionResolver>,
    requirement: Arc<Requirement>,
}

impl GateState {
    pub fn new(resolver: Arc<PermissionResolver>, requirement: Requirement) -> Self {
        Self {
            resolver,
            requirement: Arc::new(requirement),
        }
    }
}

pub async fn require_permissions(
    State(gate): State<GateState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let principal = req.extensions().get::<PrincipalContext>().copied();
    let mut cache = req
        .extensions_mut()
        .remove::<PermissionCache>()
        .unwrap_or_default();

    let decision = authorize(principal.as_ref(), &gate.requirement, &gate.resolver, &mut cache);
    req.extensions_mut().insert(cache);

    match decision {
        Ok(()) => next.run(req).await,
        Err(e) => errors::authz_error_to_response(e),
    }
}
