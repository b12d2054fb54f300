//! Compact signed bearer tokens (HS256 JWT) for the two signing domains.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::{ClaimSet, TokenClass, VerificationError, validate_window};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// A signing secret is empty. Fatal at startup.
    #[error("signing secret for the {0} domain is missing")]
    MissingSecret(TokenClass),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// One signing domain: a secret and a lifetime for one token class.
pub struct SigningDomain {
    class: TokenClass,
    ttl: Duration,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningDomain {
    pub fn new(class: TokenClass, secret: &[u8], ttl: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret(class));
        }
        Ok(Self {
            class,
            ttl: ttl.max(Duration::zero()),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn class(&self) -> TokenClass {
        self.class
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl core::fmt::Debug for SigningDomain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SigningDomain")
            .field("class", &self.class)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Signs and verifies tokens for the access and refresh domains.
///
/// The domain is picked from the claim type, so the same codec can never
/// sign refresh claims with the access secret or the other way round.
#[derive(Debug)]
pub struct TokenCodec {
    access: SigningDomain,
    refresh: SigningDomain,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(access: SigningDomain, refresh: SigningDomain) -> Self {
        debug_assert_eq!(access.class, TokenClass::Access);
        debug_assert_eq!(refresh.class, TokenClass::Refresh);

        // Time checks are done on our own millisecond-precision fields.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            access,
            refresh,
            validation,
        }
    }

    pub fn domain(&self, class: TokenClass) -> &SigningDomain {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, class: TokenClass) -> Duration {
        self.domain(class).ttl
    }

    /// Serialize and sign `claims` with the secret of its class.
    pub fn issue<C: ClaimSet>(&self, claims: &C) -> Result<String, TokenError> {
        let domain = self.domain(C::CLASS);
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &domain.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify `token` as a `C` at instant `now`.
    ///
    /// Checks, in order: signature under `C`'s domain, the class
    /// discriminator, the claim schema, and the validity window.
    pub fn verify<C: ClaimSet>(&self, token: &str, now: DateTime<Utc>) -> Result<C, VerificationError> {
        let domain = self.domain(C::CLASS);
        let data = jsonwebtoken::decode::<serde_json::Value>(token, &domain.decoding, &self.validation)
            .map_err(|e| map_jwt_error(e.kind()))?;
        let raw = data.claims;

        let actual = raw
            .get("type")
            .cloned()
            .and_then(|v| serde_json::from_value::<TokenClass>(v).ok())
            .ok_or(VerificationError::Malformed)?;
        if actual != C::CLASS {
            return Err(VerificationError::ClassMismatch {
                expected: C::CLASS,
                actual,
            });
        }

        let claims: C = serde_json::from_value(raw).map_err(|_| VerificationError::Malformed)?;
        validate_window(&claims, now)?;
        Ok(claims)
    }
}

fn map_jwt_error(kind: &ErrorKind) -> VerificationError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            VerificationError::SignatureInvalid
        }
        ErrorKind::ExpiredSignature => VerificationError::Expired,
        _ => VerificationError::Malformed,
    }
}
