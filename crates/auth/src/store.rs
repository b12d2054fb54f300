//! Credential store contract and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use hms_core::{DomainError, TenantId};

use crate::{PasswordError, PasswordHasher, Principal, PrincipalId, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    /// The backing store could not serve the request.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Lookups the authorization core needs from the credential store.
///
/// All methods are suspension points: implementations may hit a database or
/// run password verification on a worker pool.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a principal by an already-normalized identifier.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>, StoreError>;

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError>;

    /// Check `plaintext` against the principal's stored secret.
    async fn verify_secret(&self, principal: &Principal, plaintext: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>, StoreError> {
        (**self).find_by_identifier(identifier).await
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn verify_secret(&self, principal: &Principal, plaintext: &str) -> Result<bool, StoreError> {
        (**self).verify_secret(principal, plaintext).await
    }
}

/// Canonical form of a login identifier: trimmed and lower-cased.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Input for creating a principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub identifier: String,
    pub display_name: String,
    pub role: Role,
    pub tenant_id: Option<TenantId>,
}

/// Partial update of a principal; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PrincipalUpdate {
    pub identifier: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub tenant_id: Option<Option<TenantId>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone)]
struct Record {
    principal: Principal,
    password_hash: String,
}

/// In-memory credential store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<HashMap<PrincipalId, Record>>,
    hasher: PasswordHasher,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a principal with a hashed secret.
    ///
    /// Fails with `Conflict` when the normalized identifier is taken.
    pub async fn insert(&self, new: NewPrincipal, secret: &str) -> Result<Principal, StoreError> {
        let identifier = normalize_identifier(&new.identifier);
        if identifier.is_empty() {
            return Err(DomainError::validation("identifier must not be empty").into());
        }
        let password_hash = self.hash(secret).await?;

        let principal = Principal {
            id: PrincipalId::new(),
            identifier,
            display_name: new.display_name.trim().to_string(),
            role: new.role,
            tenant_id: new.tenant_id,
            active: true,
        };

        let mut map = self.write()?;
        if map.values().any(|r| r.principal.identifier == principal.identifier) {
            return Err(DomainError::conflict("identifier already in use").into());
        }
        map.insert(
            principal.id,
            Record {
                principal: principal.clone(),
                password_hash,
            },
        );
        Ok(principal)
    }

    pub fn update(&self, id: PrincipalId, update: PrincipalUpdate) -> Result<Principal, StoreError> {
        self.apply(id, update, None)
    }

    /// Apply `update` and, when `secret` is given, replace the stored secret
    /// in the same write. The secret is hashed before anything changes.
    pub async fn update_with_secret(
        &self,
        id: PrincipalId,
        update: PrincipalUpdate,
        secret: Option<&str>,
    ) -> Result<Principal, StoreError> {
        let password_hash = match secret {
            Some(secret) => Some(self.hash(secret).await?),
            None => None,
        };
        self.apply(id, update, password_hash)
    }

    fn apply(
        &self,
        id: PrincipalId,
        update: PrincipalUpdate,
        password_hash: Option<String>,
    ) -> Result<Principal, StoreError> {
        let mut map = self.write()?;

        if let Some(identifier) = &update.identifier {
            let identifier = normalize_identifier(identifier);
            if identifier.is_empty() {
                return Err(DomainError::validation("identifier must not be empty").into());
            }
            if map
                .values()
                .any(|r| r.principal.id != id && r.principal.identifier == identifier)
            {
                return Err(DomainError::conflict("identifier already in use").into());
            }
        }

        let record = map.get_mut(&id).ok_or(DomainError::NotFound)?;
        if let Some(password_hash) = password_hash {
            record.password_hash = password_hash;
        }
        let principal = &mut record.principal;
        if let Some(identifier) = update.identifier {
            principal.identifier = normalize_identifier(&identifier);
        }
        if let Some(name) = update.display_name {
            principal.display_name = name.trim().to_string();
        }
        if let Some(role) = update.role {
            principal.role = role;
        }
        if let Some(tenant_id) = update.tenant_id {
            principal.tenant_id = tenant_id;
        }
        if let Some(active) = update.active {
            principal.active = active;
        }
        Ok(principal.clone())
    }

    /// Replace the stored secret of a principal.
    pub async fn set_secret(&self, id: PrincipalId, secret: &str) -> Result<(), StoreError> {
        let password_hash = self.hash(secret).await?;
        let mut map = self.write()?;
        let record = map.get_mut(&id).ok_or(DomainError::NotFound)?;
        record.password_hash = password_hash;
        Ok(())
    }

    /// Replace the secret only if `current` verifies. Returns whether the
    /// secret was changed.
    pub async fn change_secret(
        &self,
        principal: &Principal,
        current: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        if !self.verify_secret(principal, current).await? {
            return Ok(false);
        }
        self.set_secret(principal.id, new).await?;
        Ok(true)
    }

    pub fn remove(&self, id: PrincipalId) -> Result<Principal, StoreError> {
        let mut map = self.write()?;
        map.remove(&id)
            .map(|r| r.principal)
            .ok_or_else(|| DomainError::NotFound.into())
    }

    /// All principals, optionally restricted to one tenant, ordered by id.
    pub fn list(&self, tenant: Option<Option<TenantId>>) -> Result<Vec<Principal>, StoreError> {
        let map = self.read()?;
        let mut principals: Vec<Principal> = map
            .values()
            .map(|r| &r.principal)
            .filter(|p| tenant.is_none_or(|t| p.tenant_id == t))
            .cloned()
            .collect();
        principals.sort_by_key(|p| p.id.to_string());
        Ok(principals)
    }

    async fn hash(&self, secret: &str) -> Result<String, StoreError> {
        let hasher = self.hasher;
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map_err(StoreError::from)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<PrincipalId, Record>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PrincipalId, Record>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>, StoreError> {
        let map = self.read()?;
        Ok(map
            .values()
            .find(|r| r.principal.identifier == identifier)
            .map(|r| r.principal.clone()))
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let map = self.read()?;
        Ok(map.get(&id).map(|r| r.principal.clone()))
    }

    async fn verify_secret(&self, principal: &Principal, plaintext: &str) -> Result<bool, StoreError> {
        let stored = {
            let map = self.read()?;
            match map.get(&principal.id) {
                Some(r) => r.password_hash.clone(),
                None => return Ok(false),
            }
        };

        let hasher = self.hasher;
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &stored))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
