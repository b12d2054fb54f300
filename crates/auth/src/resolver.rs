//! Role → effective permission resolution with request-scoped memoization.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{PermissionSet, PrincipalContext, PrincipalId, Role, RolePermissionTable};

/// Per-request memo of resolved permission sets, keyed by principal id.
///
/// Created fresh for every request and dropped with it. It is owned by the
/// request, so no locking is involved and nothing leaks across requests.
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    entries: HashMap<PrincipalId, Arc<PermissionSet>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PrincipalId) -> Option<Arc<PermissionSet>> {
        self.entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, id: PrincipalId, set: Arc<PermissionSet>) {
        self.entries.insert(id, set);
    }
}

/// Resolves a principal's effective permissions from its role.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    table: Arc<RolePermissionTable>,
    wildcard: Arc<PermissionSet>,
}

impl PermissionResolver {
    pub fn new(table: Arc<RolePermissionTable>) -> Self {
        Self {
            table,
            wildcard: Arc::new(PermissionSet::wildcard()),
        }
    }

    /// Resolve the effective set for `principal`, consulting `cache` first.
    ///
    /// Top-level administrators get the wildcard set without a table lookup.
    pub fn resolve(
        &self,
        principal: &PrincipalContext,
        cache: &mut PermissionCache,
    ) -> Arc<PermissionSet> {
        if let Some(hit) = cache.get(&principal.id) {
            return hit;
        }

        let resolved = match principal.role {
            Role::SuperAdmin => self.wildcard.clone(),
            role => self.table.permissions_for(role),
        };
        cache.insert(principal.id, resolved.clone());
        resolved
    }
}

impl Default for PermissionResolver {
    fn default() -> Self {
        Self::new(Arc::new(RolePermissionTable::standard()))
    }
}
