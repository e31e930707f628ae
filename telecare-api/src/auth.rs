//! Authentication Module
//!
//! Basic credential validation for the API:
//! - API key authentication via the `X-API-Key` header
//! - HS256 JWT authentication via `Authorization: Bearer <token>`
//!
//! Token times are checked against an injected [`Clock`] rather than the
//! system time, so expiry is deterministic under test.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use telecare_core::{Clock, ConfigError, SystemClock};

use crate::config::Environment;
use crate::error::{ApiError, ApiResult};

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Minimum secret length accepted in production.
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

// ============================================================================
// JWT SECRET
// ============================================================================

/// JWT signing secret that never appears in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret.
    ///
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            });
        }
        Ok(Self(SecretString::from(secret)))
    }

    fn insecure_default() -> Self {
        Self(SecretString::from(INSECURE_DEFAULT_SECRET))
    }

    /// Expose the secret value (only for signing and verification).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Valid API keys
    pub api_keys: HashSet<String>,

    pub jwt_secret: JwtSecret,

    /// Lifetime of issued tokens in seconds
    pub jwt_expiration_secs: i64,

    /// Tolerated clock skew when checking `exp`
    pub jwt_clock_skew_secs: i64,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &format!("[{} keys]", self.api_keys.len()))
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: HashSet::new(),
            jwt_secret: JwtSecret::insecure_default(),
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create AuthConfig from environment variables.
    ///
    /// - `TELECARE_API_KEYS`: comma-separated valid API keys
    /// - `TELECARE_JWT_SECRET`: HS256 signing secret
    /// - `TELECARE_JWT_EXPIRATION_SECS`: token lifetime (default: 3600)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_keys = lookup("TELECARE_API_KEYS")
            .map(|s| {
                s.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let jwt_secret = lookup("TELECARE_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| JwtSecret::new(s).ok())
            .unwrap_or_else(JwtSecret::insecure_default);

        Self {
            api_keys,
            jwt_secret,
            jwt_expiration_secs: lookup("TELECARE_JWT_EXPIRATION_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jwt_expiration_secs),
            jwt_clock_skew_secs: defaults.jwt_clock_skew_secs,
            clock: defaults.clock,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Refuse insecure secrets in production; warn about them in development.
    pub fn validate_for_production(&self, environment: Environment) -> Result<(), ConfigError> {
        if self.jwt_secret.is_insecure_default() {
            if environment.is_production() {
                return Err(ConfigError::InsecureForProduction {
                    reason: "TELECARE_JWT_SECRET is not set".to_string(),
                });
            }
            tracing::warn!(
                "Using insecure default JWT secret. Set TELECARE_JWT_SECRET before deploying."
            );
        } else if self.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            if environment.is_production() {
                return Err(ConfigError::InsecureForProduction {
                    reason: format!(
                        "JWT secret is {} chars, at least {} required",
                        self.jwt_secret.len(),
                        MIN_PRODUCTION_SECRET_LEN
                    ),
                });
            }
            tracing::warn!(
                secret_len = self.jwt_secret.len(),
                "JWT secret is short; use at least 32 characters in production"
            );
        }
        Ok(())
    }

    pub fn add_api_key(&mut self, key: impl Into<String>) {
        self.api_keys.insert(key.into());
    }

    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.api_keys.contains(key)
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// JWT claims structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, expiration_secs: i64, clock: &dyn Clock) -> Self {
        let now = clock.now_millis() / 1000;
        Self {
            sub: user_id.into(),
            iat: now,
            exp: now + expiration_secs,
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }
}

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// How a request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    ApiKey,
    Jwt,
}

/// Identity of an authenticated caller, exposed to handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: String,
    pub roles: Vec<String>,
    pub method: AuthMethod,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

fn validate_claim_times(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Validate a JWT and extract its claims.
///
/// `jsonwebtoken` checks the signature only; expiry is checked here against
/// the configured clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);

    let claims = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token("Token is invalid"),
        })?
        .claims;

    let now = config.clock.now_millis() / 1000;
    validate_claim_times(now, claims.exp, config.jwt_clock_skew_secs)?;
    Ok(claims)
}

/// Issue a signed token for `user_id`.
pub fn generate_jwt_token(
    config: &AuthConfig,
    user_id: impl Into<String>,
    roles: Vec<String>,
) -> ApiResult<String> {
    let claims =
        Claims::new(user_id, config.jwt_expiration_secs, config.clock.as_ref()).with_roles(roles);
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    encode(&Header::new(Algorithm::HS256), &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

fn authenticate_api_key(config: &AuthConfig, api_key: &str) -> ApiResult<AuthContext> {
    if !config.is_valid_api_key(api_key) {
        return Err(ApiError::unauthorized("Invalid API key"));
    }
    let prefix: String = api_key.chars().take(8).collect();
    Ok(AuthContext {
        user_id: format!("api_key_{}", prefix),
        roles: vec!["api_user".to_string()],
        method: AuthMethod::ApiKey,
    })
}

/// Authenticate a request from its credential headers.
///
/// An `X-API-Key` header takes precedence over `Authorization: Bearer`.
pub fn authenticate(
    config: &AuthConfig,
    api_key_header: Option<&str>,
    auth_header: Option<&str>,
) -> ApiResult<AuthContext> {
    if let Some(api_key) = api_key_header {
        return authenticate_api_key(config, api_key);
    }

    if let Some(auth_value) = auth_header {
        let token = auth_value.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::invalid_token("Authorization header must use Bearer scheme")
        })?;
        let claims = validate_jwt_token(config, token)?;
        return Ok(AuthContext {
            user_id: claims.sub,
            roles: claims.roles,
            method: AuthMethod::Jwt,
        });
    }

    Err(ApiError::unauthorized(
        "Authentication required: provide X-API-Key or Authorization header",
    ))
}
