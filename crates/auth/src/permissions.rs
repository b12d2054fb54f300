use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Permission identifier.
///
/// Permissions are opaque strings naming one allowed operation (e.g.
/// `read_patient`). The reserved wildcard `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

/// Well-known permissions of the record-management domain.
pub mod known {
    use super::Permission;

    pub const CREATE_PATIENT: Permission = Permission::from_static("create_patient");
    pub const READ_PATIENT: Permission = Permission::from_static("read_patient");
    pub const UPDATE_PATIENT: Permission = Permission::from_static("update_patient");
    pub const DELETE_PATIENT: Permission = Permission::from_static("delete_patient");
    pub const CREATE_ENCOUNTER: Permission = Permission::from_static("create_encounter");
    pub const READ_ENCOUNTER: Permission = Permission::from_static("read_encounter");
    pub const UPDATE_ENCOUNTER: Permission = Permission::from_static("update_encounter");
    pub const DELETE_ENCOUNTER: Permission = Permission::from_static("delete_encounter");
    pub const VIEW_AUDIT: Permission = Permission::from_static("view_audit");
    pub const SCHEDULE_DELETION: Permission = Permission::from_static("schedule_deletion");
    pub const MANAGE_USERS: Permission = Permission::from_static("manage_users");
    pub const MANAGE_SETTINGS: Permission = Permission::from_static("manage_settings");
}

/// Effective permission set of a principal. Order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(HashSet<Permission>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The set holding only the wildcard: everything is granted.
    pub fn wildcard() -> Self {
        Self(HashSet::from([Permission::WILDCARD]))
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.contains(&Permission::WILDCARD)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    /// Sorted names, for display and JSON output.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.iter().map(|p| p.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How a list of required permissions is matched against a set.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    /// At least one required permission must be present.
    #[default]
    RequireAny,
    /// Every required permission must be present.
    RequireAll,
}

/// Evaluate `required` against `granted`.
///
/// An empty requirement always passes, as does a set holding the wildcard.
pub fn check(granted: &PermissionSet, required: &[Permission], mode: CheckMode) -> bool {
    if required.is_empty() || granted.is_wildcard() {
        return true;
    }
    match mode {
        CheckMode::RequireAll => required.iter().all(|p| granted.contains(p)),
        CheckMode::RequireAny => required.iter().any(|p| granted.contains(p)),
    }
}

/// Immutable role → permission mapping.
///
/// Built once at startup and shared behind an `Arc`; never recomputed per
/// request. A role without an entry resolves to the empty set.
#[derive(Debug, Clone, Default)]
pub struct RolePermissionTable {
    grants: HashMap<Role, Arc<PermissionSet>>,
}

impl RolePermissionTable {
    pub fn new(grants: impl IntoIterator<Item = (Role, PermissionSet)>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|(role, set)| (role, Arc::new(set)))
                .collect(),
        }
    }

    /// The default mapping of the four built-in roles.
    pub fn standard() -> Self {
        use known::*;

        Self::new([
            (Role::SuperAdmin, PermissionSet::wildcard()),
            (
                Role::Admin,
                PermissionSet::from_iter([
                    CREATE_PATIENT,
                    READ_PATIENT,
                    UPDATE_PATIENT,
                    DELETE_PATIENT,
                    CREATE_ENCOUNTER,
                    READ_ENCOUNTER,
                    UPDATE_ENCOUNTER,
                    DELETE_ENCOUNTER,
                    VIEW_AUDIT,
                    SCHEDULE_DELETION,
                    MANAGE_USERS,
                    MANAGE_SETTINGS,
                ]),
            ),
            (
                Role::Staff,
                PermissionSet::from_iter([
                    CREATE_PATIENT,
                    READ_PATIENT,
                    UPDATE_PATIENT,
                    CREATE_ENCOUNTER,
                    READ_ENCOUNTER,
                    UPDATE_ENCOUNTER,
                ]),
            ),
            (
                Role::User,
                PermissionSet::from_iter([READ_PATIENT, READ_ENCOUNTER]),
            ),
        ])
    }

    pub fn permissions_for(&self, role: Role) -> Arc<PermissionSet> {
        self.grants.get(&role).cloned().unwrap_or_default()
    }
}
