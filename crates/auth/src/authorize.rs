use thiserror::Error;

use crate::{
    CheckMode, Permission, PermissionCache, PermissionResolver, PrincipalContext, Role, check,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No authenticated principal is attached to the request.
    #[error("unauthorized")]
    Unauthorized,

    /// The principal is authenticated but lacks the required permissions.
    #[error("forbidden: requires {mode:?} of {required:?}")]
    Forbidden {
        required: Vec<String>,
        mode: CheckMode,
    },

    /// The actor tried to hand out a role above its own authority.
    #[error("privilege escalation: role '{actor}' cannot grant '{target}'")]
    PrivilegeEscalation { actor: Role, target: Role },
}

impl AuthzError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthzError::Unauthorized => "unauthorized",
            AuthzError::Forbidden { .. } => "forbidden",
            AuthzError::PrivilegeEscalation { .. } => "privilege_escalation",
        }
    }
}

/// A required-permission predicate guarding one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement {
    pub permissions: Vec<Permission>,
    pub mode: CheckMode,
}

impl Requirement {
    pub fn new(permissions: impl IntoIterator<Item = Permission>, mode: CheckMode) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
            mode,
        }
    }

    pub fn any(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::new(permissions, CheckMode::RequireAny)
    }

    pub fn all(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::new(permissions, CheckMode::RequireAll)
    }
}

/// Gate an operation on an (optional) authenticated principal.
///
/// - No principal: `Unauthorized`, permissions are not consulted.
/// - Principal present: resolve its set through `cache` and check it.
///
/// No IO and no state between calls; safe to apply to any number of
/// operations in any order.
pub fn authorize(
    principal: Option<&PrincipalContext>,
    requirement: &Requirement,
    resolver: &PermissionResolver,
    cache: &mut PermissionCache,
) -> Result<(), AuthzError> {
    let principal = principal.ok_or(AuthzError::Unauthorized)?;
    let granted = resolver.resolve(principal, cache);

    if check(&granted, &requirement.permissions, requirement.mode) {
        Ok(())
    } else {
        tracing::debug!(
            principal_id = %principal.id,
            role = %principal.role,
            "permission check failed"
        );
        Err(AuthzError::Forbidden {
            required: requirement
                .permissions
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
            mode: requirement.mode,
        })
    }
}

/// Privilege-escalation guard for creating or re-roling a principal.
///
/// Only a top-level administrator may create or promote principals to
/// `admin` or `super_admin`.
pub fn ensure_can_assign(actor: Role, target: Role) -> Result<(), AuthzError> {
    if target.is_privileged() && actor != Role::SuperAdmin {
        return Err(AuthzError::PrivilegeEscalation { actor, target });
    }
    Ok(())
}
