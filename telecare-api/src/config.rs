//! API Configuration Module
//!
//! Configuration for rate limiting, caching, AI providers, CORS and the
//! listener. Everything is loaded from environment variables with defaults
//! suitable for development.

use secrecy::SecretString;
use std::time::Duration;
use telecare_core::ConfigError;
use telecare_llm::{CacheTtls, OrchestratorConfig};
use telecare_storage::DEFAULT_CACHE_CAPACITY;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Parse `TELECARE_ENVIRONMENT`. Unknown values mean development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

// ============================================================================
// RATE LIMIT RULES
// ============================================================================

/// Requests allowed per window for one route class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_millis(window_ms),
        }
    }

    /// Parse `"<requests>/<windowMs>"`, e.g. `"10/60000"`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "rate limit".to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (requests, window) = value
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected <requests>/<windowMs>"))?;
        let max_requests: u32 = requests
            .trim()
            .parse()
            .map_err(|_| invalid("requests must be a positive integer"))?;
        let window_ms: u64 = window
            .trim()
            .parse()
            .map_err(|_| invalid("windowMs must be a positive integer"))?;

        if max_requests == 0 || window_ms == 0 {
            return Err(invalid("requests and windowMs must be non-zero"));
        }
        Ok(Self::new(max_requests, window_ms))
    }
}

/// Route classes with their own rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Symptoms,
    Emergency,
    Chat,
    Patients,
    Default,
}

impl RouteClass {
    pub const ALL: [RouteClass; 5] = [
        RouteClass::Symptoms,
        RouteClass::Emergency,
        RouteClass::Chat,
        RouteClass::Patients,
        RouteClass::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Symptoms => "symptoms",
            RouteClass::Emergency => "emergency",
            RouteClass::Chat => "chat",
            RouteClass::Patients => "patients",
            RouteClass::Default => "default",
        }
    }

    fn env_suffix(&self) -> &'static str {
        match self {
            RouteClass::Symptoms => "SYMPTOMS",
            RouteClass::Emergency => "EMERGENCY",
            RouteClass::Chat => "CHAT",
            RouteClass::Patients => "PATIENTS",
            RouteClass::Default => "DEFAULT",
        }
    }
}

/// Per-route rate limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimits {
    pub symptoms: RateLimitRule,
    pub emergency: RateLimitRule,
    pub chat: RateLimitRule,
    pub patients: RateLimitRule,
    pub default: RateLimitRule,
}

impl Default for RouteLimits {
    fn default() -> Self {
        Self {
            symptoms: RateLimitRule::new(10, 60_000),
            // Emergencies get more headroom than analysis
            emergency: RateLimitRule::new(30, 60_000),
            chat: RateLimitRule::new(20, 60_000),
            patients: RateLimitRule::new(100, 60_000),
            default: RateLimitRule::new(60, 60_000),
        }
    }
}

impl RouteLimits {
    pub fn for_route(&self, route: RouteClass) -> RateLimitRule {
        match route {
            RouteClass::Symptoms => self.symptoms,
            RouteClass::Emergency => self.emergency,
            RouteClass::Chat => self.chat,
            RouteClass::Patients => self.patients,
            RouteClass::Default => self.default,
        }
    }

    fn slot(&mut self, route: RouteClass) -> &mut RateLimitRule {
        match route {
            RouteClass::Symptoms => &mut self.symptoms,
            RouteClass::Emergency => &mut self.emergency,
            RouteClass::Chat => &mut self.chat,
            RouteClass::Patients => &mut self.patients,
            RouteClass::Default => &mut self.default,
        }
    }
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Credentials and model for one AI provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: SecretString,
    pub model: String,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,

    // ========================================================================
    // Listener
    // ========================================================================
    pub bind_address: String,
    pub port: u16,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    pub route_limits: RouteLimits,

    /// Minimum interval between full sweeps of expired rate-limit windows.
    pub rate_limit_sweep_interval: Duration,

    // ========================================================================
    // Cache and providers
    // ========================================================================
    pub cache_capacity: usize,
    pub cache_ttls: CacheTtls,
    pub provider_timeout: Duration,
    pub operation_deadline: Duration,
    pub emergency_numbers: Vec<String>,
    pub anthropic: Option<ProviderSettings>,
    pub openai: Option<ProviderSettings>,

    // ========================================================================
    // Health
    // ========================================================================
    /// Bound on a single health probe.
    pub probe_timeout: Duration,
    /// Minimum spacing of live vendor pings; health requests in between
    /// reuse the previous provider report.
    pub provider_probe_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            rate_limit_enabled: true,
            route_limits: RouteLimits::default(),
            rate_limit_sweep_interval: Duration::from_secs(60),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttls: CacheTtls::default(),
            provider_timeout: Duration::from_millis(6_000),
            operation_deadline: Duration::from_millis(10_000),
            emergency_numbers: vec!["112".to_string()],
            anthropic: None,
            openai: None,
            probe_timeout: Duration::from_secs(5),
            provider_probe_interval: Duration::from_secs(30),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TELECARE_ENVIRONMENT`: `development` (default) or `production`
    /// - `TELECARE_API_BIND`, `PORT`: listener (default `0.0.0.0:3000`)
    /// - `TELECARE_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `TELECARE_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `TELECARE_RATE_LIMIT_<ROUTE>`: `<requests>/<windowMs>` for
    ///   `SYMPTOMS`, `EMERGENCY`, `CHAT`, `PATIENTS`, `DEFAULT`
    /// - `TELECARE_CACHE_CAPACITY`: maximum cached AI responses (default: 1000)
    /// - `TELECARE_CACHE_TTL_{SYMPTOM_ANALYSIS,EMERGENCY_GUIDANCE,HEALTH_CHAT}_SECS`
    /// - `TELECARE_PROVIDER_TIMEOUT_MS`, `TELECARE_OPERATION_DEADLINE_MS`
    /// - `TELECARE_EMERGENCY_NUMBERS`: comma-separated (default: 112)
    /// - `ANTHROPIC_API_KEY`, `TELECARE_ANTHROPIC_MODEL`
    /// - `OPENAI_API_KEY`, `TELECARE_OPENAI_MODEL`
    /// - `TELECARE_PROVIDER_PROBE_INTERVAL_SECS`: vendor ping spacing (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let environment = lookup("TELECARE_ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or_default();

        let mut route_limits = RouteLimits::default();
        for route in RouteClass::ALL {
            let key = format!("TELECARE_RATE_LIMIT_{}", route.env_suffix());
            if let Some(value) = lookup(&key) {
                *route_limits.slot(route) = RateLimitRule::parse(&value)?;
            }
        }

        let ttl = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_secs).unwrap_or(default)
        };
        let cache_ttls = CacheTtls {
            symptom_analysis: ttl(
                "TELECARE_CACHE_TTL_SYMPTOM_ANALYSIS_SECS",
                defaults.cache_ttls.symptom_analysis,
            ),
            emergency_guidance: ttl(
                "TELECARE_CACHE_TTL_EMERGENCY_GUIDANCE_SECS",
                defaults.cache_ttls.emergency_guidance,
            ),
            health_chat: ttl(
                "TELECARE_CACHE_TTL_HEALTH_CHAT_SECS",
                defaults.cache_ttls.health_chat,
            ),
        };

        let provider = |key_var: &str, model_var: &str, default_model: &str| {
            lookup(key_var)
                .filter(|k| !k.trim().is_empty())
                .map(|key| ProviderSettings {
                    api_key: SecretString::from(key.trim().to_string()),
                    model: lookup(model_var).unwrap_or_else(|| default_model.to_string()),
                })
        };

        let emergency_numbers = lookup("TELECARE_EMERGENCY_NUMBERS")
            .map(|s| split_list(&s))
            .filter(|numbers| !numbers.is_empty())
            .unwrap_or(defaults.emergency_numbers);

        let port = match lookup("PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "PORT".to_string(),
                value,
                reason: "must be a port number".to_string(),
            })?,
            None => defaults.port,
        };

        Ok(Self {
            environment,
            bind_address: lookup("TELECARE_API_BIND").unwrap_or(defaults.bind_address),
            port,
            cors_origins: lookup("TELECARE_CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            cors_max_age_secs: parsed("TELECARE_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled: lookup("TELECARE_RATE_LIMIT_ENABLED")
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(true),
            route_limits,
            rate_limit_sweep_interval: defaults.rate_limit_sweep_interval,
            cache_capacity: parsed("TELECARE_CACHE_CAPACITY")
                .map(|n| n as usize)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.cache_capacity),
            cache_ttls,
            provider_timeout: parsed("TELECARE_PROVIDER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.provider_timeout),
            operation_deadline: parsed("TELECARE_OPERATION_DEADLINE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.operation_deadline),
            emergency_numbers,
            anthropic: provider(
                "ANTHROPIC_API_KEY",
                "TELECARE_ANTHROPIC_MODEL",
                telecare_llm::AnthropicProvider::DEFAULT_MODEL,
            ),
            openai: provider(
                "OPENAI_API_KEY",
                "TELECARE_OPENAI_MODEL",
                telecare_llm::OpenAIProvider::DEFAULT_MODEL,
            ),
            probe_timeout: defaults.probe_timeout,
            provider_probe_interval: parsed("TELECARE_PROVIDER_PROBE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_probe_interval),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    /// Orchestrator settings derived from this configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            provider_timeout: self.provider_timeout,
            operation_deadline: self.operation_deadline,
            cache_ttls: self.cache_ttls.clone(),
            emergency_numbers: self.emergency_numbers.clone(),
        }
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            // Dev mode: allow all
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.telecare.health
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain
                        .strip_suffix(pattern)
                        .is_some_and(|sub| sub.ends_with('.'));
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.route_limits.symptoms, RateLimitRule::new(10, 60_000));
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.emergency_numbers, vec!["112"]);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.provider_probe_interval, Duration::from_secs(30));
        assert!(config.anthropic.is_none());
    }

    #[test]
    fn test_rate_limit_rule_parse() {
        assert_eq!(
            RateLimitRule::parse("2/60000").unwrap(),
            RateLimitRule::new(2, 60_000)
        );
        assert!(RateLimitRule::parse("2").is_err());
        assert!(RateLimitRule::parse("0/1000").is_err());
        assert!(RateLimitRule::parse("x/1000").is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("TELECARE_ENVIRONMENT", "prod"),
            ("TELECARE_RATE_LIMIT_CHAT", "5/1000"),
            ("TELECARE_CACHE_TTL_HEALTH_CHAT_SECS", "42"),
            ("TELECARE_EMERGENCY_NUMBERS", "112, 911"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("PORT", "8080"),
        ]))
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.route_limits.chat, RateLimitRule::new(5, 1000));
        assert_eq!(config.route_limits.symptoms, RateLimitRule::new(10, 60_000));
        assert_eq!(config.cache_ttls.health_chat, Duration::from_secs(42));
        assert_eq!(config.emergency_numbers, vec!["112", "911"]);
        assert_eq!(config.port, 8080);
        let anthropic = config.anthropic.unwrap();
        assert_eq!(anthropic.model, telecare_llm::AnthropicProvider::DEFAULT_MODEL);
        assert!(config.openai.is_none());
    }

    #[test]
    fn test_invalid_rate_limit_is_rejected() {
        let result =
            ApiConfig::from_lookup(lookup_from(&[("TELECARE_RATE_LIMIT_SYMPTOMS", "ten")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_provider_settings_debug_redacts_key() {
        let settings = ProviderSettings {
            api_key: SecretString::from("sk-secret".to_string()),
            model: "m".to_string(),
        };
        assert!(!format!("{:?}", settings).contains("sk-secret"));
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(config.is_origin_allowed("http://localhost:3000"));

        config.cors_origins = vec![
            "https://telecare.health".to_string(),
            "*.clinic.example".to_string(),
        ];
        assert!(config.is_origin_allowed("https://telecare.health"));
        assert!(config.is_origin_allowed("https://app.clinic.example"));
        assert!(!config.is_origin_allowed("https://evilclinic.example"));
        assert!(!config.is_origin_allowed("https://evil.com"));
    }
}
