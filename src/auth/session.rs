use chrono::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::auth::claims::{Claims, Role, TokenClass};
use crate::auth::token::{TokenCodec, TokenError};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::ledger::{LedgerError, LedgerStatus, RevocationLedger};

/// Why a presented token was rejected, or why issuance failed.
///
/// `Expired`, `Malformed` and `Revoked` are kept apart for logs only; clients
/// see the same message for all three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Expired,
    Malformed,
    Revoked,
    Issuance(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::Expired => write!(f, "token expired"),
            AuthError::Malformed => write!(f, "token malformed"),
            AuthError::Revoked => write!(f, "token revoked"),
            AuthError::Issuance(msg) => write!(f, "failed to issue token: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Token pair returned at login, shaped like an OAuth2 bearer response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

pub const BEARER: &str = "bearer";

/// Issues, verifies and revokes access and refresh tokens.
///
/// Verification is a pure signature/expiry check followed by one ledger read;
/// revocation is one ledger write. Holds no per-request state.
pub struct SessionManager {
    codec: TokenCodec,
    ledger: RevocationLedger,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    register_issued: bool,
}

impl SessionManager {
    pub fn new(config: &AuthConfig, ledger: RevocationLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            codec: TokenCodec::new(&config.access_secret, &config.refresh_secret, clock.clone()),
            ledger,
            clock,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            register_issued: config.register_issued_tokens,
        }
    }

    pub fn ledger(&self) -> &RevocationLedger {
        &self.ledger
    }

    async fn issue(&self, claims: Claims, class: TokenClass, ttl: Duration) -> Result<String, AuthError> {
        let token = self
            .codec
            .encode(&claims, class)
            .map_err(|e| AuthError::Issuance(e.to_string()))?;

        if self.register_issued {
            // Bookkeeping only; revocation checks never depend on it.
            if let Err(e) = self
                .ledger
                .register_valid(class, &claims.jti, ttl.num_seconds())
                .await
            {
                warn!("Could not register issued {} token for {}: {}", class, claims.sub, e);
            }
        }

        debug!("Issued {} token for {} (jti {})", class, claims.sub, claims.jti);
        Ok(token)
    }

    fn expiry_after(&self, ttl: Duration) -> Result<chrono::DateTime<chrono::Utc>, AuthError> {
        if ttl <= Duration::zero() {
            return Err(AuthError::Issuance(format!(
                "token lifetime must be positive, got {}s",
                ttl.num_seconds()
            )));
        }
        Ok(self.clock.now() + ttl)
    }

    /// Issues an access token with the configured default lifetime.
    pub async fn issue_access_token(
        &self,
        subject: &str,
        role: Role,
        id: Option<i64>,
    ) -> Result<String, AuthError> {
        self.issue_access_token_with_ttl(subject, role, id, self.access_ttl)
            .await
    }

    pub async fn issue_access_token_with_ttl(
        &self,
        subject: &str,
        role: Role,
        id: Option<i64>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let claims = Claims::new(subject, self.expiry_after(ttl)?)
            .with_role(role)
            .with_id(id);
        self.issue(claims, TokenClass::Access, ttl).await
    }

    /// Refresh tokens carry no role; the role is re-read from the user record
    /// whenever a new access token is minted from them.
    pub async fn issue_refresh_token(&self, subject: &str) -> Result<String, AuthError> {
        let claims = Claims::new(subject, self.expiry_after(self.refresh_ttl)?);
        self.issue(claims, TokenClass::Refresh, self.refresh_ttl)
            .await
    }

    pub async fn issue_pair(
        &self,
        subject: &str,
        role: Role,
        id: Option<i64>,
    ) -> Result<IssuedTokens, AuthError> {
        Ok(IssuedTokens {
            access_token: self.issue_access_token(subject, role, id).await?,
            refresh_token: self.issue_refresh_token(subject).await?,
            token_type: BEARER.to_string(),
        })
    }

    /// Password-reset token: an ordinary access token with `role = reset`.
    pub async fn issue_reset_token(&self, subject: &str) -> Result<String, AuthError> {
        self.issue_access_token(subject, Role::Reset, None).await
    }

    /// Full check of a presented token, keeping the rejection reason.
    pub async fn authenticate(&self, token: &str, class: TokenClass) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(token, class).map_err(|e| match e {
            TokenError::Expired => {
                info!("Attempted use of expired {} token", class);
                AuthError::Expired
            }
            other => {
                debug!("Rejected {} token: {}", class, other);
                AuthError::Malformed
            }
        })?;

        if self.ledger.is_revoked(class, &claims.jti).await {
            info!("Attempted use of revoked {} token for {}", class, claims.sub);
            return Err(AuthError::Revoked);
        }

        Ok(claims)
    }

    /// `None` for any expired, malformed or revoked token.
    pub async fn verify(&self, token: &str, class: TokenClass) -> Option<Claims> {
        self.authenticate(token, class).await.ok()
    }

    /// Marks the token revoked until its natural expiry.
    ///
    /// A token that no longer decodes (expired, wrong class, garbage) is
    /// already unusable, so that case is logged and treated as success.
    pub async fn revoke(&self, token: &str, class: TokenClass) -> Result<(), LedgerError> {
        let claims = match self.codec.decode(token, class) {
            Ok(claims) => claims,
            Err(e) => {
                info!("Revoke attempt of unusable {} token ignored: {}", class, e);
                return Ok(());
            }
        };

        let remaining = (claims.exp - self.clock.now().timestamp()).max(1);
        self.ledger
            .put(class, &claims.jti, remaining, LedgerStatus::Revoked)
            .await?;
        info!("Revoked {} token for {} ({}s left)", class, claims.sub, remaining);
        Ok(())
    }
}
