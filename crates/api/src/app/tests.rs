use std::sync::Arc;

use axum::{
    Extension, Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
    middleware::{Next, from_fn, from_fn_with_state},
    routing::get,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use hms_auth::permissions::known::{MANAGE_USERS, READ_PATIENT};
use hms_auth::{
    CredentialStore, InMemoryCredentialStore, NewPrincipal, PermissionCache, Principal, PrincipalUpdate,
    Requirement, Role,
};
use hms_core::TenantId;

use super::*;

struct Harness {
    app: Router,
    store: Arc<InMemoryCredentialStore>,
}

fn config() -> AppConfig {
    AppConfig::from_lookup(|k| match k {
        "JWT_ACCESS_SECRET" => Some("test-access".to_string()),
        "JWT_REFRESH_SECRET" => Some("test-refresh".to_string()),
        _ => None,
    })
    .unwrap()
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryCredentialStore::new());
    let state = AppState::from_config(&config(), store.clone()).unwrap();
    Harness {
        app: build_app(state),
        store,
    }
}

async fn seed(store: &InMemoryCredentialStore, email: &str, role: Role, tenant_id: Option<TenantId>) -> Principal {
    store
        .insert(
            NewPrincipal {
                identifier: email.to_string(),
                display_name: "Seeded".to_string(),
                role,
                tenant_id,
            },
            "correct-pw",
        )
        .await
        .unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn set_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

fn cookie_token(headers: &HeaderMap, name: &str) -> String {
    let cookie = set_cookie(headers, name).unwrap();
    let value = cookie.split(';').next().unwrap();
    value[name.len() + 1..].to_string()
}

/// Log in and return (access, refresh) tokens taken from the cookies.
async fn login(app: &Router, email: &str, password: &str) -> (String, String) {
    let (status, headers, _) = send(
        app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        cookie_token(&headers, "accessToken"),
        cookie_token(&headers, "refreshToken"),
    )
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let (status, _, body) = send(&h.app, request(Method::GET, "/healthz", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn register_creates_basic_user() {
    let h = harness();
    let payload = json!({ "name": "Ann", "email": "Ann@X.org", "password": "long-enough" });

    let (status, _, body) = send(&h.app, request(Method::POST, "/auth/register", None, Some(payload.clone()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["email"], "ann@x.org");
    assert_eq!(body["data"]["role"], "user");

    let (status, _, body) = send(&h.app, request(Method::POST, "/auth/register", None, Some(payload))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _, body) = send(
        &h.app,
        request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Bo", "email": "bo@x.org", "password": "short" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn login_sets_http_only_cookies() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, Some(TenantId::new())).await;

    let (status, headers, body) = send(
        &h.app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "nurse@x.org", "password": "correct-pw" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "staff");

    let access = set_cookie(&headers, "accessToken").unwrap();
    let refresh = set_cookie(&headers, "refreshToken").unwrap();
    assert!(access.contains("HttpOnly") && access.contains("Path=/") && access.contains("Max-Age=900"));
    assert!(refresh.contains("Max-Age=604800"));
}

#[tokio::test]
async fn login_rejects_wrong_secret() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;

    let (status, headers, body) = send(
        &h.app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "nurse@x.org", "password": "wrong-pw" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn login_validates_input_shape() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;

    for body in [
        json!({ "email": "nurse", "password": "correct-pw" }),
        json!({ "email": "nurse@x.org", "password": "" }),
    ] {
        let (status, headers, body) = send(&h.app, request(Method::POST, "/auth/login", None, Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(headers.get(header::SET_COOKIE).is_none());
    }
}

#[tokio::test]
async fn me_requires_authentication() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    let (access, refresh) = login(&h.app, "nurse@x.org", "correct-pw").await;

    let (status, _, body) = send(&h.app, request(Method::GET, "/auth/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _, body) = send(&h.app, request(Method::GET, "/auth/me", Some("garbage"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "malformed_token");

    // A refresh token never authenticates a request.
    let (status, _, _) = send(&h.app, request(Method::GET, "/auth/me", Some(&refresh), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(&h.app, request(Method::GET, "/auth/me", Some(&access), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "nurse@x.org");
}

#[tokio::test]
async fn access_cookie_authenticates() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    let (access, _) = login(&h.app, "nurse@x.org", "correct-pw").await;

    let req = Request::builder()
        .uri("/auth/me")
        .header(header::COOKIE, format!("accessToken={access}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_from_cookie_or_body() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    let (_, refresh) = login(&h.app, "nurse@x.org", "correct-pw").await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/auth/refresh")
        .header(header::COOKIE, format!("refreshToken={refresh}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let rotated = cookie_token(&headers, "refreshToken");
    assert_ne!(rotated, refresh);

    let (status, _, _) = send(
        &h.app,
        request(Method::POST, "/auth/refresh", None, Some(json!({ "refreshToken": rotated }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&h.app, request(Method::POST, "/auth/refresh", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "malformed_token");
}

#[tokio::test]
async fn logout_clears_cookies_but_tokens_live_on() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    let (access, _) = login(&h.app, "nurse@x.org", "correct-pw").await;

    let (status, headers, _) = send(&h.app, request(Method::POST, "/auth/logout", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(set_cookie(&headers, "accessToken").unwrap().contains("Max-Age=0"));
    assert!(set_cookie(&headers, "refreshToken").unwrap().contains("Max-Age=0"));

    let (status, _, _) = send(&h.app, request(Method::GET, "/auth/me", Some(&access), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deactivation_takes_effect_immediately() {
    let h = harness();
    let nurse = seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    let (access, _) = login(&h.app, "nurse@x.org", "correct-pw").await;

    h.store
        .update(
            nurse.id,
            PrincipalUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    let (status, _, body) = send(&h.app, request(Method::GET, "/auth/me", Some(&access), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "principal_not_found");
}

#[tokio::test]
async fn change_password_checks_current() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    let (access, _) = login(&h.app, "nurse@x.org", "correct-pw").await;

    let (status, _, body) = send(
        &h.app,
        request(
            Method::POST,
            "/auth/change-password",
            Some(&access),
            Some(json!({ "currentPassword": "nope", "newPassword": "brand-new-pw" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");

    let (status, _, _) = send(
        &h.app,
        request(
            Method::POST,
            "/auth/change-password",
            Some(&access),
            Some(json!({ "currentPassword": "correct-pw", "newPassword": "brand-new-pw" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    login(&h.app, "nurse@x.org", "brand-new-pw").await;
}

#[tokio::test]
async fn update_me_changes_profile() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    seed(&h.store, "taken@x.org", Role::Staff, None).await;
    let (access, _) = login(&h.app, "nurse@x.org", "correct-pw").await;

    let (status, _, body) = send(
        &h.app,
        request(Method::PUT, "/auth/me", Some(&access), Some(json!({ "name": "Nurse Joy" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Nurse Joy");

    let (status, _, _) = send(
        &h.app,
        request(Method::PUT, "/auth/me", Some(&access), Some(json!({ "email": "taken@x.org" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn user_routes_are_gated_on_manage_users() {
    let h = harness();
    seed(&h.store, "nurse@x.org", Role::Staff, None).await;
    let (access, _) = login(&h.app, "nurse@x.org", "correct-pw").await;

    let (status, _, body) = send(&h.app, request(Method::GET, "/users", Some(&access), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _, _) = send(&h.app, request(Method::GET, "/users", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admins_are_confined_to_their_tenant() {
    let h = harness();
    let home = TenantId::new();
    let other = TenantId::new();
    seed(&h.store, "admin@x.org", Role::Admin, Some(home)).await;
    let colleague = seed(&h.store, "nurse@x.org", Role::Staff, Some(home)).await;
    let stranger = seed(&h.store, "nurse@y.org", Role::Staff, Some(other)).await;
    let (access, _) = login(&h.app, "admin@x.org", "correct-pw").await;

    let (status, _, body) = send(&h.app, request(Method::GET, "/users", Some(&access), None)).await;
    assert_eq!(status, StatusCode::OK);
    let emails: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["email"].as_str().unwrap())
        .collect();
    assert_eq!(emails.len(), 2);
    assert!(!emails.contains(&"nurse@y.org"));

    let uri = format!("/users/{}", colleague.id);
    let (status, _, _) = send(&h.app, request(Method::GET, &uri, Some(&access), None)).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/users/{}", stranger.id);
    let (status, _, _) = send(&h.app, request(Method::GET, &uri, Some(&access), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &h.app,
        request(
            Method::POST,
            "/users",
            Some(&access),
            Some(json!({
                "name": "Cross", "email": "cross@y.org", "password": "long-enough",
                "role": "staff", "hospitalId": other.to_string(),
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = send(
        &h.app,
        request(
            Method::POST,
            "/users",
            Some(&access),
            Some(json!({ "name": "Local", "email": "local@x.org", "password": "long-enough", "role": "staff" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["hospitalId"], home.to_string());
}

#[tokio::test]
async fn admin_without_tenant_manages_nobody() {
    let h = harness();
    seed(&h.store, "root@x.org", Role::SuperAdmin, None).await;
    seed(&h.store, "drifter@x.org", Role::Admin, None).await;
    let walkin = seed(&h.store, "walkin@z.org", Role::User, None).await;
    let (access, _) = login(&h.app, "drifter@x.org", "correct-pw").await;

    let (status, _, body) = send(&h.app, request(Method::GET, "/users", Some(&access), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let uri = format!("/users/{}", walkin.id);
    let (status, _, _) = send(&h.app, request(Method::GET, &uri, Some(&access), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(
        &h.app,
        request(Method::PUT, &uri, Some(&access), Some(json!({ "isActive": false }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&h.app, request(Method::DELETE, &uri, Some(&access), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.store.find_by_id(walkin.id).await.unwrap().is_some());

    let (status, _, _) = send(
        &h.app,
        request(
            Method::POST,
            "/users",
            Some(&access),
            Some(json!({ "name": "Orphan", "email": "orphan@z.org", "password": "long-enough" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn top_level_admin_can_clear_tenant() {
    let h = harness();
    let tenant = TenantId::new();
    seed(&h.store, "root@x.org", Role::SuperAdmin, None).await;
    let staff = seed(&h.store, "nurse@x.org", Role::Staff, Some(tenant)).await;
    let (root, _) = login(&h.app, "root@x.org", "correct-pw").await;
    let uri = format!("/users/{}", staff.id);

    let (status, _, body) = send(&h.app, request(Method::PUT, &uri, Some(&root), Some(json!({ "name": "Renamed" })))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hospitalId"], tenant.to_string());

    let (status, _, body) = send(
        &h.app,
        request(Method::PUT, &uri, Some(&root), Some(json!({ "hospitalId": null }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hospitalId"], Value::Null);
    assert_eq!(h.store.find_by_id(staff.id).await.unwrap().unwrap().tenant_id, None);
}

#[tokio::test]
async fn only_top_level_admin_grants_privileged_roles() {
    let h = harness();
    let tenant = TenantId::new();
    seed(&h.store, "root@x.org", Role::SuperAdmin, None).await;
    seed(&h.store, "admin@x.org", Role::Admin, Some(tenant)).await;
    let staff = seed(&h.store, "nurse@x.org", Role::Staff, Some(tenant)).await;

    let (admin, _) = login(&h.app, "admin@x.org", "correct-pw").await;
    let (root, _) = login(&h.app, "root@x.org", "correct-pw").await;

    let new_admin = json!({ "name": "Deputy", "email": "deputy@x.org", "password": "long-enough", "role": "admin" });
    let (status, _, body) = send(&h.app, request(Method::POST, "/users", Some(&admin), Some(new_admin.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "privilege_escalation");

    let promote = format!("/users/{}", staff.id);
    let (status, _, body) = send(
        &h.app,
        request(Method::PUT, &promote, Some(&admin), Some(json!({ "role": "super_admin" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "privilege_escalation");

    let (status, _, body) = send(&h.app, request(Method::POST, "/users", Some(&root), Some(new_admin))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "admin");
}

#[tokio::test]
async fn update_and_delete_principal() {
    let h = harness();
    let tenant = TenantId::new();
    seed(&h.store, "admin@x.org", Role::Admin, Some(tenant)).await;
    let staff = seed(&h.store, "nurse@x.org", Role::Staff, Some(tenant)).await;
    let (admin, _) = login(&h.app, "admin@x.org", "correct-pw").await;
    let uri = format!("/users/{}", staff.id);

    let (status, _, body) = send(
        &h.app,
        request(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "role": "user", "password": "reset-by-admin", "isActive": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "user");
    login(&h.app, "nurse@x.org", "reset-by-admin").await;

    let (status, _, _) = send(&h.app, request(Method::DELETE, &uri, Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&h.app, request(Method::GET, &uri, Some(&admin), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(&h.app, request(Method::GET, "/users/not-a-uuid", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn seeding_is_idempotent() {
    let store = InMemoryCredentialStore::new();
    let seed_cfg = SeedAdmin {
        email: "root@hms.example".to_string(),
        password: "bootstrap-pw".to_string(),
    };
    seed_admin(&store, &seed_cfg).await.unwrap();
    seed_admin(&store, &seed_cfg).await.unwrap();

    let all = store.list(None).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].role, Role::SuperAdmin);
}

#[tokio::test]
async fn stacked_gates_share_one_cache() {
    let store = InMemoryCredentialStore::new();
    let admin = seed(&store, "admin@x.org", Role::Admin, None).await.context();
    let resolver = Arc::new(hms_auth::PermissionResolver::default());

    async fn cache_size(Extension(cache): Extension<PermissionCache>) -> String {
        cache.len().to_string()
    }

    let app: Router = Router::new()
        .route("/", get(cache_size))
        .route_layer(from_fn_with_state(
            GateState::new(resolver.clone(), Requirement::any([READ_PATIENT])),
            authz::require_permissions,
        ))
        .route_layer(from_fn_with_state(
            GateState::new(resolver, Requirement::all([MANAGE_USERS])),
            authz::require_permissions,
        ))
        .route_layer(from_fn(move |mut req: Request<Body>, next: Next| async move {
            req.extensions_mut().insert(admin);
            req.extensions_mut().insert(PermissionCache::new());
            next.run(req).await
        }));

    let res = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"1");
}
