use serde::{Deserialize, Deserializer, Serialize};

use hms_auth::{Principal, PrincipalId, Role};
use hms_core::{DomainError, TenantId};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MIN_NAME_LEN: usize = 2;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub hospital_id: Option<TenantId>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    pub hospital_id: Option<TenantId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    /// Absent leaves the tenant alone; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub hospital_id: Option<Option<TenantId>>,
    pub is_active: Option<bool>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: PrincipalId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub hospital_id: Option<TenantId>,
    pub is_active: bool,
}

impl From<Principal> for UserResponse {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            name: p.display_name,
            email: p.identifier,
            role: p.role,
            hospital_id: p.tenant_id,
            is_active: p.active,
        }
    }
}

// -------------------------
// Validation helpers
// -------------------------

pub fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name must be at least {MIN_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(DomainError::validation("email must be a valid address"));
    }
    Ok(())
}

/// Login only needs a non-empty secret; strength is enforced when it is set.
pub fn require_password(password: &str) -> Result<(), DomainError> {
    if password.is_empty() {
        return Err(DomainError::validation("password is required"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(validate_email("nurse@x.org").is_ok());
        assert!(validate_email(" nurse@x.org ").is_ok());
        assert!(validate_email("nurse").is_err());
        assert!(validate_email("@x.org").is_err());
        assert!(validate_email("nurse@localhost").is_err());
    }

    #[test]
    fn password_length() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn create_user_role_defaults_to_user() {
        let req: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Ann",
            "email": "ann@x.org",
            "password": "long-enough",
        }))
        .unwrap();
        assert_eq!(req.role, Role::User);
        assert_eq!(req.hospital_id, None);
    }

    #[test]
    fn update_user_tells_null_tenant_from_absent() {
        let absent: UpdateUserRequest = serde_json::from_value(serde_json::json!({ "name": "Ann" })).unwrap();
        assert_eq!(absent.hospital_id, None);

        let cleared: UpdateUserRequest =
            serde_json::from_value(serde_json::json!({ "hospitalId": null })).unwrap();
        assert_eq!(cleared.hospital_id, Some(None));

        let tenant = TenantId::new();
        let moved: UpdateUserRequest =
            serde_json::from_value(serde_json::json!({ "hospitalId": tenant.to_string() })).unwrap();
        assert_eq!(moved.hospital_id, Some(Some(tenant)));
    }

    #[test]
    fn user_response_is_camel_case_without_secret() {
        let p = Principal {
            id: PrincipalId::new(),
            identifier: "ann@x.org".to_string(),
            display_name: "Ann".to_string(),
            role: Role::Staff,
            tenant_id: None,
            active: true,
        };
        let json = serde_json::to_value(UserResponse::from(p)).unwrap();
        assert_eq!(json["email"], "ann@x.org");
        assert_eq!(json["role"], "staff");
        assert_eq!(json["isActive"], true);
        assert!(json.get("password").is_none());
    }
}
