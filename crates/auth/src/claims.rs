use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use hms_core::TenantId;

use crate::{Principal, PrincipalId, Role};

/// Discriminator carried by every token. Checked on every verification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    Access,
    Refresh,
}

impl core::fmt::Display for TokenClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            TokenClass::Access => "access",
            TokenClass::Refresh => "refresh",
        })
    }
}

/// Expected, recoverable outcomes of token verification.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("token class mismatch: expected {expected}, got {actual}")]
    ClassMismatch {
        expected: TokenClass,
        actual: TokenClass,
    },
}

impl VerificationError {
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::Malformed => "malformed_token",
            VerificationError::SignatureInvalid => "signature_invalid",
            VerificationError::Expired => "token_expired",
            VerificationError::ClassMismatch { .. } => "class_mismatch",
        }
    }
}

/// A claim schema bound to exactly one token class.
///
/// Access and refresh claims are distinct types, so a refresh token can only
/// ever be decoded where a `RefreshClaims` is asked for.
pub trait ClaimSet: Serialize + DeserializeOwned {
    const CLASS: TokenClass;

    fn class(&self) -> TokenClass;
    fn subject(&self) -> PrincipalId;
    fn issued_at(&self) -> DateTime<Utc>;
    fn expires_at(&self) -> DateTime<Utc>;
}

/// Claims of a short-lived access token.
///
/// `role` and `tenant_id` are a snapshot taken at issuance. Security
/// decisions use a fresh credential-store read instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: PrincipalId,
    #[serde(rename = "type")]
    pub class: TokenClass,
    pub jti: Uuid,
    pub role: Role,
    pub tenant_id: Option<TenantId>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessClaims {
    pub fn for_principal(principal: &Principal, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: principal.id,
            class: TokenClass::Access,
            jti: Uuid::now_v7(),
            role: principal.role,
            tenant_id: principal.tenant_id,
            issued_at,
            expires_at: expiry(issued_at, ttl),
        }
    }
}

/// Claims of a long-lived refresh token. Carries no authorization data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: PrincipalId,
    #[serde(rename = "type")]
    pub class: TokenClass,
    pub jti: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshClaims {
    pub fn for_principal(principal: &Principal, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: principal.id,
            class: TokenClass::Refresh,
            jti: Uuid::now_v7(),
            issued_at,
            expires_at: expiry(issued_at, ttl),
        }
    }
}

macro_rules! impl_claim_set {
    ($t:ty, $class:expr) => {
        impl ClaimSet for $t {
            const CLASS: TokenClass = $class;

            fn class(&self) -> TokenClass {
                self.class
            }

            fn subject(&self) -> PrincipalId {
                self.sub
            }

            fn issued_at(&self) -> DateTime<Utc> {
                self.issued_at
            }

            fn expires_at(&self) -> DateTime<Utc> {
                self.expires_at
            }
        }
    };
}

impl_claim_set!(AccessClaims, TokenClass::Access);
impl_claim_set!(RefreshClaims, TokenClass::Refresh);

fn expiry(issued_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    issued_at
        .checked_add_signed(ttl.max(Duration::zero()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Check the validity window of already-decoded claims.
///
/// A window with `expires_at <= issued_at` (zero lifetime) is expired at
/// every instant.
pub fn validate_window<C: ClaimSet>(claims: &C, now: DateTime<Utc>) -> Result<(), VerificationError> {
    if claims.expires_at() <= claims.issued_at() || now >= claims.expires_at() {
        return Err(VerificationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            id: PrincipalId::new(),
            identifier: "nurse@x.org".to_string(),
            display_name: "Nurse".to_string(),
            role: Role::Staff,
            tenant_id: Some(TenantId::new()),
            active: true,
        }
    }

    #[test]
    fn access_claims_snapshot_principal() {
        let p = principal();
        let now = Utc::now();
        let claims = AccessClaims::for_principal(&p, now, Duration::minutes(15));
        assert_eq!(claims.sub, p.id);
        assert_eq!(claims.class, TokenClass::Access);
        assert_eq!(claims.role, Role::Staff);
        assert_eq!(claims.tenant_id, p.tenant_id);
        assert_eq!(claims.expires_at - claims.issued_at, Duration::minutes(15));
    }

    #[test]
    fn refresh_schema_has_no_role() {
        let claims = RefreshClaims::for_principal(&principal(), Utc::now(), Duration::days(7));
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "refresh");
        assert!(json.get("role").is_none());
        assert!(json.get("tenant_id").is_none());
    }

    #[test]
    fn window_checks() {
        let t0 = Utc::now();
        let claims = AccessClaims::for_principal(&principal(), t0, Duration::milliseconds(100));
        assert_eq!(validate_window(&claims, t0 + Duration::milliseconds(50)), Ok(()));
        assert_eq!(
            validate_window(&claims, t0 + Duration::milliseconds(100)),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn zero_ttl_is_always_expired() {
        let t0 = Utc::now();
        let claims = RefreshClaims::for_principal(&principal(), t0, Duration::zero());
        assert_eq!(
            validate_window(&claims, t0 - Duration::seconds(1)),
            Err(VerificationError::Expired)
        );
        assert_eq!(validate_window(&claims, t0), Err(VerificationError::Expired));
    }

    #[test]
    fn each_claim_set_gets_a_fresh_jti() {
        let p = principal();
        let now = Utc::now();
        let a = RefreshClaims::for_principal(&p, now, Duration::days(7));
        let b = RefreshClaims::for_principal(&p, now, Duration::days(7));
        assert_ne!(a.jti, b.jti);
    }
}
