//! JWT Authentication
//!
//! Validates JWTs issued by an external identity provider. The server never
//! issues tokens. The token subject determines the caller's [`ActorId`], so
//! owner, provider and relay roles are bound to authenticated identities.

use jsonwebtoken::{decode, DecodingKey, Validation, Algorithm, TokenData};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use thiserror::Error;

use crate::core::ids::ActorId;

/// Domain prefix for subject → actor derivation.
const ACTOR_DOMAIN: &[u8] = b"sealed-pacts-actor:";

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 secret.
    pub secret: Option<String>,
    /// Skip expiry validation. Testing only.
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Check if authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Claims expected from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject.
    pub sub: String,
    /// Expiry (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Derive the caller's actor id from the subject claim.
    pub fn actor_id(&self) -> ActorId {
        actor_for_subject(&self.sub)
    }
}

/// Actor id bound to a token subject.
pub fn actor_for_subject(sub: &str) -> ActorId {
    let mut hasher = Sha256::new();
    hasher.update(ACTOR_DOMAIN);
    hasher.update(sub.as_bytes());
    let hash = hasher.finalize();

    let mut id = [0u8; 16];
    id.copy_from_slice(&hash[..16]);
    ActorId::new(id)
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authentication configured on server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer mismatch.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience mismatch.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate a JWT and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else if config.secret.is_some() {
        Algorithm::HS256
    } else {
        return Err(AuthError::NotConfigured);
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }
    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;
    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // jsonwebtoken allows leeway; enforce the hard boundary too
    if !config.skip_expiry && claims.exp > 0 {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) const SECRET: &str = "relay-test-secret-256-bits-long!";

    pub(crate) fn token_for(sub: &str, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, &claims(sub), &key).unwrap()
    }

    fn claims(sub: &str) -> TokenClaims {
        let now = chrono::Utc::now().timestamp() as u64;
        TokenClaims {
            sub: sub.into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("test-audience")),
        }
    }

    fn secret_config() -> AuthConfig {
        AuthConfig {
            secret: Some(SECRET.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_token() {
        let token = token_for("relay", SECRET);
        let claims = validate_token(&token, &secret_config()).unwrap();
        assert_eq!(claims.sub, "relay");
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut expired = claims("relay");
        expired.exp = 1;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &expired,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(validate_token(&token, &secret_config()), Err(AuthError::Expired)));

        let lenient = AuthConfig { skip_expiry: true, ..secret_config() };
        assert!(validate_token(&token, &lenient).is_ok());
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let token = token_for("relay", "some-other-secret-entirely!!!!!");
        assert!(matches!(
            validate_token(&token, &secret_config()),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_missing_sub_rejected() {
        let token = token_for("", SECRET);
        assert!(matches!(
            validate_token(&token, &secret_config()),
            Err(AuthError::MissingClaim(_))
        ));
    }

    #[test]
    fn test_issuer_validation() {
        let token = token_for("relay", SECRET);
        let config = AuthConfig {
            issuer: Some("wrong-issuer".into()),
            ..secret_config()
        };
        assert!(matches!(validate_token(&token, &config), Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn test_actor_id_derivation() {
        let a = claims("relay").actor_id();
        assert_eq!(a, claims("relay").actor_id());
        assert_ne!(a, claims("provider").actor_id());
        assert_eq!(a, actor_for_subject("relay"));
    }

    #[test]
    fn test_not_configured_error() {
        assert!(matches!(
            validate_token("some.jwt.token", &AuthConfig::default()),
            Err(AuthError::NotConfigured)
        ));
    }
}
