use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::fmt;
use std::sync::Arc;

use crate::auth::claims::{Claims, TokenClass};
use crate::clock::Clock;

/// Errors produced while encoding or decoding a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token's `exp` is not in the future.
    Expired,
    /// Bad signature, wrong class secret, broken payload or missing claims.
    Malformed(String),
    /// Signing failed; never caused by client input.
    Encoding(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenError::Expired => write!(f, "token expired"),
            TokenError::Malformed(msg) => write!(f, "malformed token: {}", msg),
            TokenError::Encoding(msg) => write!(f, "failed to encode token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies claim sets with HS256, one secret per token class.
///
/// Expiry is checked here against the injected [`Clock`] rather than by
/// `jsonwebtoken`, which always reads the system time.
pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(access_secret: &str, refresh_secret: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
            clock,
        }
    }

    fn keys(&self, class: TokenClass) -> &SigningKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }

    /// Serializes and signs `claims` with the secret for `class`.
    ///
    /// Output is deterministic for identical claims and secret.
    pub fn encode(&self, claims: &Claims, class: TokenClass) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(class).encoding,
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verifies the signature with the secret for `class`, then the expiry.
    pub fn decode(&self, token: &str, class: TokenClass) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.keys(class).decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        if claims.sub.is_empty() || claims.jti.is_empty() {
            return Err(TokenError::Malformed("missing subject or token id".into()));
        }

        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
