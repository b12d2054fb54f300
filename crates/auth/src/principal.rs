use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hms_core::{TenantId, impl_uuid_newtype};

use crate::Role;

/// Identity of a principal (a user account in the credential store).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl_uuid_newtype!(PrincipalId, "PrincipalId");

/// A principal record as held by the credential store.
///
/// The authorization core only ever reads these. The password hash never
/// leaves the store and is therefore not part of this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    /// Normalized login identifier (lower-cased email).
    pub identifier: String,
    pub display_name: String,
    pub role: Role,
    /// `None` means the principal is not yet scoped to a tenant.
    pub tenant_id: Option<TenantId>,
    pub active: bool,
}

impl Principal {
    pub fn context(&self) -> PrincipalContext {
        PrincipalContext {
            id: self.id,
            role: self.role,
            tenant_id: self.tenant_id,
        }
    }
}

/// Authenticated principal attached to a request after credential verification.
///
/// Built from a fresh credential-store read, never from token claims alone.
/// Absence of this value in a request means "unauthenticated".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalContext {
    pub id: PrincipalId,
    pub role: Role,
    pub tenant_id: Option<TenantId>,
}
