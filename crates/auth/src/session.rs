//! Session orchestration: login, refresh with rotation, authentication, logout.
//!
//! Sessions are stateless. Nothing is persisted server-side; a token stays
//! cryptographically valid until it expires, and logout only tells the
//! transport to discard the client's credentials.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::{
    AccessClaims, ClaimSet, CookiePolicy, CredentialStore, Principal,
    PrincipalContext, RefreshClaims, StoreError, TokenClass, TokenCodec, TokenError,
    VerificationError, normalize_identifier,
};

/// Freshly issued access + refresh tokens. Never stored server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown identifier, inactive principal, or wrong secret.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] VerificationError),

    /// The token's subject no longer exists or was deactivated.
    #[error("principal not found")]
    PrincipalNotFound,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Stable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidToken(e) => e.code(),
            AuthError::PrincipalNotFound => "principal_not_found",
            AuthError::Token(_) => "token_error",
            AuthError::Store(StoreError::Domain(e)) => e.code(),
            AuthError::Store(_) => "store_error",
        }
    }
}

pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    cookies: CookiePolicy,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>, cookies: CookiePolicy) -> Self {
        Self {
            store,
            codec,
            cookies,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn cookie_policy(&self) -> &CookiePolicy {
        &self.cookies
    }

    /// Exchange an identifier and plaintext secret for a fresh token pair.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<(Principal, TokenPair), AuthError> {
        let identifier = normalize_identifier(identifier);
        let principal = match self.store.find_by_identifier(&identifier).await? {
            Some(p) if p.active => p,
            _ => {
                tracing::warn!("login rejected: unknown or inactive principal");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.store.verify_secret(&principal, secret).await? {
            tracing::warn!(principal_id = %principal.id, "login rejected: secret mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.issue_pair(&principal)?;
        tracing::info!(principal_id = %principal.id, role = %principal.role, "login succeeded");
        Ok((principal, pair))
    }

    /// Exchange a refresh token for a brand-new pair.
    ///
    /// Always rotates: the returned refresh token is never the one presented.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims: RefreshClaims = self
            .codec
            .verify(refresh_token, Utc::now())
            .inspect_err(|e| tracing::warn!(reason = e.code(), "refresh rejected"))?;

        let principal = self.live_principal(&claims).await?;
        let pair = self.issue_pair(&principal)?;
        tracing::info!(principal_id = %principal.id, "session refreshed");
        Ok(pair)
    }

    /// Verify an access token and re-read its subject from the store.
    ///
    /// The returned context reflects the store, not the token's role claim.
    pub async fn authenticate(&self, access_token: &str) -> Result<(Principal, PrincipalContext), AuthError> {
        let claims: AccessClaims = self.codec.verify(access_token, Utc::now())?;
        let principal = self.live_principal(&claims).await?;
        let context = principal.context();
        Ok((principal, context))
    }

    /// `Set-Cookie` values carrying `pair` to the client.
    pub fn session_cookies(&self, pair: &TokenPair) -> [String; 2] {
        self.cookies.issue(
            pair,
            self.codec.ttl(TokenClass::Access),
            self.codec.ttl(TokenClass::Refresh),
        )
    }

    /// `Set-Cookie` values discarding the client's credentials.
    ///
    /// Issued tokens stay valid until they expire.
    pub fn logout(&self) -> [String; 2] {
        self.cookies.clear()
    }

    fn issue_pair(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access = AccessClaims::for_principal(principal, now, self.codec.ttl(TokenClass::Access));
        let refresh = RefreshClaims::for_principal(principal, now, self.codec.ttl(TokenClass::Refresh));
        Ok(TokenPair {
            access_token: self.codec.issue(&access)?,
            refresh_token: self.codec.issue(&refresh)?,
        })
    }

    async fn live_principal<C: ClaimSet>(&self, claims: &C) -> Result<Principal, AuthError> {
        match self.store.find_by_id(claims.subject()).await? {
            Some(p) if p.active => Ok(p),
            _ => Err(AuthError::PrincipalNotFound),
        }
    }
}
