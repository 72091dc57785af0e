/// Bearer token issuing and validation
///
/// Every authenticated route receives an access token in the `Authorization`
/// header. `JwtCodec` owns the key material for one deployment and performs
/// both halves of the exchange:
///
/// - `issue_access_token` signs a short-lived token for a user id
/// - `validate` verifies signature and expiry and returns the claims
///
/// Two key modes are supported:
///
/// - **HS256** with a shared secret (`JWT_SECRET`), at least 32 bytes
/// - **RS256** with a PEM key pair; validation-only services may omit the
///   private key
///
/// The algorithm is pinned per codec. A token signed with any other algorithm
/// is rejected, which closes the HS/RS confusion hole.
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Shortest HS256 secret accepted
pub const MIN_SECRET_BYTES: usize = 32;

const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

const ACCESS_TOKEN_TYPE: &str = "access";

// ============================================================================
// Data Structures
// ============================================================================

/// Claims carried by every access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type, always "access" for tokens issued here
    pub token_type: String,
    /// Username at issue time
    pub username: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("token is malformed")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is invalid: {0}")]
    Invalid(String),

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("this codec has no signing key")]
    SigningUnavailable,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidSignature => JwtError::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => JwtError::Malformed,
            _ => JwtError::Invalid(err.to_string()),
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Key material plus policy for one token issuer
#[derive(Clone)]
pub struct JwtCodec {
    algorithm: Algorithm,
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    access_ttl: Duration,
}

impl std::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCodec")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.encoding_key.is_some())
            .field("access_ttl_secs", &self.access_ttl.num_seconds())
            .finish()
    }
}

impl JwtCodec {
    /// HS256 codec from a shared secret
    ///
    /// Secrets shorter than [`MIN_SECRET_BYTES`] are rejected.
    pub fn from_secret(secret: &str) -> Result<Self, JwtError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(JwtError::Key(format!(
                "JWT secret too short: {} bytes, need at least {}",
                secret.len(),
                MIN_SECRET_BYTES
            )));
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding_key: Some(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
        })
    }

    /// RS256 codec from PEM keys
    ///
    /// Pass `None` for the private key on services that only validate.
    pub fn from_rsa_pem(private_key_pem: Option<&str>, public_key_pem: &str) -> Result<Self, JwtError> {
        let encoding_key = private_key_pem
            .map(|pem| {
                EncodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| JwtError::Key(format!("failed to parse RSA private key: {e}")))
            })
            .transpose()?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("failed to parse RSA public key: {e}")))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding_key,
            decoding_key,
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
        })
    }

    /// Override the access token lifetime
    pub fn with_access_ttl(mut self, ttl_secs: i64) -> Self {
        self.access_ttl = Duration::seconds(ttl_secs);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Sign an access token for `user_id`
    pub fn issue_access_token(&self, user_id: Uuid, username: &str) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            username: username.to_string(),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims with this codec's key
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or(JwtError::SigningUnavailable)?;
        encode(&Header::new(self.algorithm), claims, key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm and expiry
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        if data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(JwtError::Invalid(format!(
                "unexpected token type '{}'",
                data.claims.token_type
            )));
        }
        Ok(data.claims)
    }
}

// ============================================================================
// Tests
// ============================================================================
