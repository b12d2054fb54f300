//! `hms-auth` — session tokens and capability authorization.
//!
//! This crate is intentionally decoupled from HTTP. Storage is reached only
//! through the [`CredentialStore`] contract.

pub mod authorize;
pub mod claims;
pub mod cookie;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod resolver;
pub mod roles;
pub mod session;
pub mod store;
pub mod token;
pub mod ttl;

pub use authorize::{AuthzError, Requirement, authorize, ensure_can_assign};
pub use claims::{AccessClaims, ClaimSet, RefreshClaims, TokenClass, VerificationError, validate_window};
pub use cookie::{ACCESS_COOKIE, CookiePolicy, REFRESH_COOKIE, SameSite, cookie_value};
pub use password::{PasswordError, PasswordHasher};
pub use permissions::{CheckMode, Permission, PermissionSet, RolePermissionTable, check};
pub use principal::{Principal, PrincipalContext, PrincipalId};
pub use resolver::{PermissionCache, PermissionResolver};
pub use roles::{Role, UnknownRole};
pub use session::{AuthError, SessionManager, TokenPair};
pub use store::{
    CredentialStore, InMemoryCredentialStore, NewPrincipal, PrincipalUpdate, StoreError,
    normalize_identifier,
};
pub use token::{SigningDomain, TokenCodec, TokenError};
pub use ttl::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, parse_ttl};
