//! Server configuration.

use serde::{Deserialize, Serialize};

use skein_core::{Error, Result};

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default bearer token lifetime (24 hours).
pub const DEFAULT_JWT_TTL_SECONDS: u64 = 86_400;

/// Default interval between background repair sweeps.
pub const DEFAULT_REPAIR_INTERVAL_SECS: u64 = 300;

/// Default age below which an unlinked review is treated as an in-flight create.
pub const DEFAULT_ORPHAN_GRACE_SECS: u64 = 30;

/// Configuration for the Skein API server.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server port.
    pub http_port: u16,

    /// Enable debug mode.
    ///
    /// When enabled, missing signing secrets are replaced with random
    /// per-process values and logs are human-readable. Never enable in
    /// production: tokens do not survive a restart.
    pub debug: bool,

    /// Optional shared secret required to access `/metrics`.
    ///
    /// When set, callers must provide either `X-Metrics-Secret: <secret>` or
    /// `Authorization: Bearer <secret>`.
    #[serde(default)]
    pub metrics_secret: Option<String>,

    /// Shared secret guarding `/api/v1/maintenance/*`.
    ///
    /// When unset the maintenance endpoints answer 404.
    #[serde(default)]
    pub maintenance_secret: Option<String>,

    /// HMAC key mixed into every stored credential digest.
    #[serde(default)]
    pub credential_pepper: Option<String>,

    /// Bearer token configuration.
    #[serde(default)]
    pub jwt: JwtConfig,

    /// CORS configuration.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Consistency repair configuration.
    #[serde(default)]
    pub repair: RepairConfig,

    /// Upper bound on listing compare-and-swap attempts per review write.
    pub max_cas_attempts: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("debug", &self.debug)
            .field(
                "metrics_secret",
                &self.metrics_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "maintenance_secret",
                &self.maintenance_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "credential_pepper",
                &self.credential_pepper.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwt", &self.jwt)
            .field("cors", &self.cors)
            .field("repair", &self.repair)
            .field("max_cas_attempts", &self.max_cas_attempts)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            debug: false,
            metrics_secret: None,
            maintenance_secret: None,
            credential_pepper: None,
            jwt: JwtConfig::default(),
            cors: CorsConfig::default(),
            repair: RepairConfig::default(),
            max_cas_attempts: skein_catalog::coordinator::DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Recognised variables:
    ///
    /// - `SKEIN_HTTP_PORT`, `SKEIN_DEBUG`
    /// - `SKEIN_JWT_SECRET`, `SKEIN_JWT_TTL_SECONDS`
    /// - `SKEIN_CREDENTIAL_PEPPER`
    /// - `SKEIN_MAINTENANCE_SECRET`, `SKEIN_METRICS_SECRET`
    /// - `SKEIN_REPAIR_INTERVAL_SECS`, `SKEIN_ORPHAN_GRACE_SECS`
    /// - `SKEIN_MAX_CAS_ATTEMPTS`
    /// - `SKEIN_CORS_ALLOWED_ORIGINS`, `SKEIN_CORS_MAX_AGE_SECONDS`
    ///
    /// # Errors
    ///
    /// Returns an error if any environment variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration using a custom variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(port) = env.u16("SKEIN_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(debug) = env.bool("SKEIN_DEBUG")? {
            config.debug = debug;
        }

        config.metrics_secret = env.string("SKEIN_METRICS_SECRET");
        config.maintenance_secret = env.string("SKEIN_MAINTENANCE_SECRET");
        config.credential_pepper = env.string("SKEIN_CREDENTIAL_PEPPER");

        config.jwt.hs256_secret = env.string("SKEIN_JWT_SECRET");
        if let Some(ttl) = env.u64("SKEIN_JWT_TTL_SECONDS")? {
            if ttl == 0 {
                return Err(Error::InvalidInput(
                    "SKEIN_JWT_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }
            config.jwt.ttl_seconds = ttl;
        }

        if let Some(origins) = env.string("SKEIN_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = parse_cors_allowed_origins(&origins);
        }
        if let Some(max_age) = env.u64("SKEIN_CORS_MAX_AGE_SECONDS")? {
            config.cors.max_age_seconds = max_age;
        }

        if let Some(interval) = env.u64("SKEIN_REPAIR_INTERVAL_SECS")? {
            config.repair.interval_secs = interval;
        }
        if let Some(grace) = env.u64("SKEIN_ORPHAN_GRACE_SECS")? {
            config.repair.orphan_grace_secs = grace;
        }

        if let Some(attempts) = env.u32("SKEIN_MAX_CAS_ATTEMPTS")? {
            if attempts == 0 {
                return Err(Error::InvalidInput(
                    "SKEIN_MAX_CAS_ATTEMPTS must be greater than 0".to_string(),
                ));
            }
            config.max_cas_attempts = attempts;
        }

        Ok(config)
    }
}

/// Bearer token configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 secret used to sign and verify bearer tokens.
    ///
    /// Deliver via secret manager / env var, never config files.
    #[serde(default)]
    pub hs256_secret: Option<String>,

    /// Lifetime of issued tokens in seconds.
    #[serde(default = "default_jwt_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field(
                "hs256_secret",
                &self.hs256_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            hs256_secret: None,
            ttl_seconds: default_jwt_ttl_seconds(),
        }
    }
}

const fn default_jwt_ttl_seconds() -> u64 {
    DEFAULT_JWT_TTL_SECONDS
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. Use `["*"]` to allow all origins (development only).
    /// Empty list disables CORS entirely.
    pub allowed_origins: Vec<String>,

    /// Max age for preflight cache (seconds).
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age_seconds: 3600,
        }
    }
}

/// Background consistency repair configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Seconds between sweeps. Zero disables the background sweep.
    pub interval_secs: u64,

    /// Reviews younger than this are never re-linked by a sweep.
    pub orphan_grace_secs: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_REPAIR_INTERVAL_SECS,
            orphan_grace_secs: DEFAULT_ORPHAN_GRACE_SECS,
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn u16(&self, name: &str) -> Result<Option<u16>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u16>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
    }

    fn u32(&self, name: &str) -> Result<Option<u32>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u32>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u32: {e}")))
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u64>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
    }

    fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        parse_bool(name, &v).map(Some)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn parse_cors_allowed_origins(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed == "*" {
        return vec!["*".to_string()];
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_env_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() -> Result<()> {
        let config = load(&[])?;
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert!(!config.debug);
        assert_eq!(config.jwt.ttl_seconds, DEFAULT_JWT_TTL_SECONDS);
        assert_eq!(config.repair.interval_secs, DEFAULT_REPAIR_INTERVAL_SECS);
        assert_eq!(config.max_cas_attempts, 5);
        assert!(config.cors.allowed_origins.is_empty());
        Ok(())
    }

    #[test]
    fn reads_every_variable() -> Result<()> {
        let config = load(&[
            ("SKEIN_HTTP_PORT", "9000"),
            ("SKEIN_DEBUG", "yes"),
            ("SKEIN_JWT_SECRET", "jwt-secret"),
            ("SKEIN_JWT_TTL_SECONDS", "60"),
            ("SKEIN_CREDENTIAL_PEPPER", "pepper"),
            ("SKEIN_MAINTENANCE_SECRET", "maint"),
            ("SKEIN_METRICS_SECRET", "scrape"),
            ("SKEIN_REPAIR_INTERVAL_SECS", "0"),
            ("SKEIN_ORPHAN_GRACE_SECS", "5"),
            ("SKEIN_MAX_CAS_ATTEMPTS", "9"),
            ("SKEIN_CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])?;
        assert_eq!(config.http_port, 9000);
        assert!(config.debug);
        assert_eq!(config.jwt.hs256_secret.as_deref(), Some("jwt-secret"));
        assert_eq!(config.jwt.ttl_seconds, 60);
        assert_eq!(config.credential_pepper.as_deref(), Some("pepper"));
        assert_eq!(config.maintenance_secret.as_deref(), Some("maint"));
        assert_eq!(config.metrics_secret.as_deref(), Some("scrape"));
        assert_eq!(config.repair.interval_secs, 0);
        assert_eq!(config.repair.orphan_grace_secs, 5);
        assert_eq!(config.max_cas_attempts, 9);
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        Ok(())
    }

    #[test]
    fn blank_values_are_unset() -> Result<()> {
        let config = load(&[("SKEIN_JWT_SECRET", "   "), ("SKEIN_HTTP_PORT", "")])?;
        assert!(config.jwt.hs256_secret.is_none());
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        Ok(())
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = load(&[("SKEIN_HTTP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("SKEIN_HTTP_PORT")));
    }

    #[test]
    fn rejects_zero_cas_attempts() {
        assert!(load(&[("SKEIN_MAX_CAS_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn rejects_zero_token_ttl() {
        assert!(load(&[("SKEIN_JWT_TTL_SECONDS", "0")]).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() -> Result<()> {
        let config = load(&[
            ("SKEIN_JWT_SECRET", "super-secret-jwt"),
            ("SKEIN_CREDENTIAL_PEPPER", "super-secret-pepper"),
            ("SKEIN_MAINTENANCE_SECRET", "super-secret-maint"),
        ])?;
        let dbg = format!("{config:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("super-secret"));
        Ok(())
    }

    #[test]
    fn parse_bool_accepts_true_values() {
        assert!(parse_bool("TEST", "true").unwrap());
        assert!(parse_bool("TEST", "1").unwrap());
        assert!(parse_bool("TEST", "yes").unwrap());
        assert!(parse_bool("TEST", "TRUE").unwrap());
    }

    #[test]
    fn parse_bool_accepts_false_values() {
        assert!(!parse_bool("TEST", "false").unwrap());
        assert!(!parse_bool("TEST", "0").unwrap());
        assert!(!parse_bool("TEST", "no").unwrap());
        assert!(!parse_bool("TEST", "FALSE").unwrap());
    }

    #[test]
    fn parse_bool_rejects_invalid_values() {
        assert!(parse_bool("TEST", "maybe").is_err());
        assert!(parse_bool("TEST", "").is_err());
    }

    #[test]
    fn cors_wildcard_is_kept_alone() {
        assert_eq!(parse_cors_allowed_origins("*"), vec!["*".to_string()]);
        assert!(parse_cors_allowed_origins(" , ").is_empty());
    }
}
