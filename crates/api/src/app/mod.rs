//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and input validation
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Router, routing::get};
use tower::ServiceBuilder;

use hms_auth::permissions::known::MANAGE_USERS;
use hms_auth::{
    InMemoryCredentialStore, NewPrincipal, PermissionResolver, Role, RolePermissionTable,
    SessionManager, StoreError, TokenError,
};

use crate::authz::{self, GateState};
use crate::config::{AppConfig, SeedAdmin};
use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;

/// Shared, immutable application state. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InMemoryCredentialStore>,
    pub sessions: Arc<SessionManager>,
    pub resolver: Arc<PermissionResolver>,
}

impl AppState {
    /// Wire the store, codec, session manager and resolver from `config`.
    pub fn from_config(config: &AppConfig, store: Arc<InMemoryCredentialStore>) -> Result<Self, TokenError> {
        let codec = Arc::new(config.token_codec()?);
        let sessions = Arc::new(SessionManager::new(store.clone(), codec, config.cookies.clone()));
        let resolver = Arc::new(PermissionResolver::new(Arc::new(RolePermissionTable::standard())));
        Ok(Self {
            store,
            sessions,
            resolver,
        })
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let auth_state = AuthState {
        sessions: state.sessions.clone(),
    };
    let manage_users = GateState::new(state.resolver.clone(), hms_auth::Requirement::any([MANAGE_USERS]));

    // Authentication runs first, then the gate.
    let users = routes::users::router().route_layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth_state.clone(),
                middleware::auth_middleware,
            ))
            .layer(axum::middleware::from_fn_with_state(
                manage_users,
                authz::require_permissions,
            )),
    );

    let session = routes::auth::protected_router().route_layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/healthz", get(routes::system::health))
        .merge(routes::auth::public_router())
        .merge(session)
        .merge(users)
        .with_state(state)
}

/// Create the bootstrap top-level administrator unless the identifier exists.
pub async fn seed_admin(store: &InMemoryCredentialStore, seed: &SeedAdmin) -> Result<(), StoreError> {
    let created = store
        .insert(
            NewPrincipal {
                identifier: seed.email.clone(),
                display_name: "Administrator".to_string(),
                role: Role::SuperAdmin,
                tenant_id: None,
            },
            &seed.password,
        )
        .await;

    match created {
        Ok(p) => {
            tracing::info!(principal_id = %p.id, "seeded top-level administrator");
            Ok(())
        }
        Err(StoreError::Domain(hms_core::DomainError::Conflict(_))) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests;
