//! Principal administration. Every route here sits behind the
//! `manage_users` gate.
//!
//! Only a top-level administrator may grant, or touch holders of, the
//! `admin` and `super_admin` roles. Other administrators are confined to
//! their own tenant; one without a tenant manages nobody.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use hms_auth::{
    CredentialStore, NewPrincipal, Principal, PrincipalContext, PrincipalId, PrincipalUpdate,
    Role, ensure_can_assign,
};
use hms_core::TenantId;

use crate::app::dto::{self, CreateUserRequest, UpdateUserRequest, UserResponse};
use crate::app::{AppState, errors};
use crate::context::CurrentPrincipal;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
}

fn can_see(actor: &PrincipalContext, target: &Principal) -> bool {
    match (actor.role, actor.tenant_id) {
        (Role::SuperAdmin, _) => true,
        (_, Some(tenant)) => target.tenant_id == Some(tenant),
        (_, None) => false,
    }
}

/// Tenant a principal may be placed in by `actor`.
fn placement(actor: &PrincipalContext, requested: Option<TenantId>) -> Result<Option<TenantId>, Response> {
    if actor.role == Role::SuperAdmin {
        return Ok(requested);
    }
    let Some(home) = actor.tenant_id else {
        return Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "actor is not assigned to a tenant",
        ));
    };
    match requested {
        Some(t) if t != home => Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "cannot place principals in another tenant",
        )),
        _ => Ok(Some(home)),
    }
}

/// Look up a principal visible to `actor`; invisible ones read as missing.
async fn visible(state: &AppState, actor: &PrincipalContext, raw_id: &str) -> Result<Principal, Response> {
    let id: PrincipalId = raw_id.parse().map_err(errors::domain_error_to_response)?;
    match state.store.find_by_id(id).await {
        Ok(Some(p)) if can_see(actor, &p) => Ok(p),
        Ok(_) => Err(errors::json_error(StatusCode::NOT_FOUND, "not_found", "principal not found")),
        Err(e) => Err(errors::store_error_to_response(e)),
    }
}

fn escalation(actor: Role, target: Role) -> Result<(), Response> {
    ensure_can_assign(actor, target).map_err(|e| {
        tracing::warn!(actor = %actor, target = %target, "privilege escalation blocked");
        errors::authz_error_to_response(e)
    })
}

/// GET /users
pub async fn list_users(State(state): State<AppState>, current: CurrentPrincipal) -> Result<Response, Response> {
    let actor = &current.context;
    let scope = match (actor.role, actor.tenant_id) {
        (Role::SuperAdmin, _) => None,
        (_, Some(tenant)) => Some(Some(tenant)),
        (_, None) => return Ok(Json(json!({ "data": [] })).into_response()),
    };
    let users: Vec<UserResponse> = state
        .store
        .list(scope)
        .map_err(errors::store_error_to_response)?
        .into_iter()
        .map(UserResponse::from)
        .collect();
    Ok(Json(json!({ "data": users })).into_response())
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let principal = visible(&state, &current.context, &id).await?;
    Ok(Json(json!({ "data": UserResponse::from(principal) })).into_response())
}

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Json(req): Json<CreateUserRequest>,
) -> Result<Response, Response> {
    escalation(current.context.role, req.role)?;
    dto::validate_name(&req.name)
        .and_then(|_| dto::validate_email(&req.email))
        .and_then(|_| dto::validate_password(&req.password))
        .map_err(errors::domain_error_to_response)?;
    let tenant_id = placement(&current.context, req.hospital_id)?;

    let principal = state
        .store
        .insert(
            NewPrincipal {
                identifier: req.email,
                display_name: req.name,
                role: req.role,
                tenant_id,
            },
            &req.password,
        )
        .await
        .map_err(errors::store_error_to_response)?;

    tracing::info!(actor_id = %current.context.id, principal_id = %principal.id, role = %principal.role, "principal created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": UserResponse::from(principal) })),
    )
        .into_response())
}

/// PUT /users/:id
pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Response, Response> {
    let actor = current.context;
    let existing = visible(&state, &actor, &id).await?;

    escalation(actor.role, existing.role)?;
    if let Some(role) = req.role {
        escalation(actor.role, role)?;
    }
    if let Some(name) = &req.name {
        dto::validate_name(name).map_err(errors::domain_error_to_response)?;
    }
    if let Some(email) = &req.email {
        dto::validate_email(email).map_err(errors::domain_error_to_response)?;
    }
    if let Some(password) = &req.password {
        dto::validate_password(password).map_err(errors::domain_error_to_response)?;
    }
    let tenant_id = match req.hospital_id {
        Some(requested) => Some(placement(&actor, requested)?),
        None => None,
    };

    let updated = state
        .store
        .update_with_secret(
            existing.id,
            PrincipalUpdate {
                identifier: req.email,
                display_name: req.name,
                role: req.role,
                tenant_id,
                active: req.is_active,
            },
            req.password.as_deref(),
        )
        .await
        .map_err(errors::store_error_to_response)?;

    tracing::info!(actor_id = %actor.id, principal_id = %updated.id, "principal updated");
    Ok(Json(json!({ "data": UserResponse::from(updated) })).into_response())
}

/// DELETE /users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let actor = current.context;
    let existing = visible(&state, &actor, &id).await?;
    escalation(actor.role, existing.role)?;

    state
        .store
        .remove(existing.id)
        .map_err(errors::store_error_to_response)?;

    tracing::info!(actor_id = %actor.id, principal_id = %existing.id, "principal removed");
    Ok(Json(json!({ "success": true })).into_response())
}
