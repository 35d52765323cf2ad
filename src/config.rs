use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Signing secret shipped in the default config. `validate` refuses it
/// unless the CAPTCHA dev secret is configured.
pub const DEFAULT_JWT_SECRET: &str = "change-me-this-is-not-a-secret-key-0000";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    pub captcha: CaptchaConfig,

    pub security: SecurityConfig,

    pub audit: AuditConfig,

    pub scheduler: SchedulerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_url: String,

    pub log_level: String,

    /// Emit logs as JSON lines instead of the human format.
    pub json_logs: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,

    /// Hard deadline for a single HTTP request.
    pub request_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/warden.db".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Peers allowed to supply `X-Forwarded-For`. When empty the socket
    /// peer address is recorded as the client IP.
    pub trusted_proxy_ips: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            trusted_proxy_ips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing secret. Changing it invalidates every issued token.
    pub jwt_secret: String,

    pub issuer: String,

    pub audience: String,

    pub access_token_ttl_seconds: i64,

    pub refresh_token_ttl_seconds: i64,

    /// Consume refresh tokens on use so a refresh token works exactly once.
    pub track_refresh_tokens: bool,

    pub allow_registration: bool,

    /// Role name granted to self-registered users.
    pub default_role: String,

    /// Lifetime of the `session_token` handed out when a login still needs
    /// its second factor.
    pub second_factor_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            issuer: "warden".to_string(),
            audience: "warden-api".to_string(),
            access_token_ttl_seconds: 2 * 60 * 60,
            refresh_token_ttl_seconds: 7 * 24 * 60 * 60,
            track_refresh_tokens: true,
            allow_registration: true,
            default_role: "user".to_string(),
            second_factor_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Lifetime of a challenge, at most five minutes.
    pub ttl_seconds: u64,

    pub code_length: usize,

    /// Enables `?secret=` dev mode, where the caller chooses the code and
    /// receives it back. Leave unset in production.
    pub dev_secret: Option<String>,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            code_length: 4,
            dev_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 19456 = 19MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Rehash legacy or outdated password hashes after a successful login.
    pub auto_migrate_password_hashes: bool,

    /// Issuer label shown by authenticator apps.
    pub totp_issuer: String,

    /// Login throttling and lockout policy.
    pub auth_throttle: AuthThrottleConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 19 * 1024,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            auto_migrate_password_hashes: true,
            totp_issuer: "Warden".to_string(),
            auth_throttle: AuthThrottleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthThrottleConfig {
    pub enabled: bool,

    /// Max failed attempts in the window before lockout.
    pub max_attempts: u32,

    /// Rolling window for counting failures.
    pub window_seconds: u64,

    /// Temporary lockout duration once max attempts is reached.
    pub lockout_seconds: u64,
}

impl Default for AuthThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            window_seconds: 5 * 60,
            lockout_seconds: 2 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Capacity of the queue feeding the background audit writer.
    pub queue_capacity: usize,

    /// Attempts per entry before it is dropped and counted as failed.
    pub max_attempts: u32,

    pub retry_backoff_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Six-field cron expression for the expired-record cleanup job.
    pub cleanup_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_cron: "0 */15 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "warden".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    /// Environment variables win over file values for deployment secrets.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("WARDEN_DATABASE_URL") {
            self.general.database_url = url;
        }
        if let Ok(level) = std::env::var("WARDEN_LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Ok(secret) = std::env::var("WARDEN_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(secret) = std::env::var("WARDEN_CAPTCHA_DEV_SECRET") {
            self.captcha.dev_secret = Some(secret).filter(|s| !s.is_empty());
        }
        if let Some(port) = std::env::var("WARDEN_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("warden").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".warden").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    #[must_use]
    pub fn dev_mode(&self) -> bool {
        self.captcha.dev_secret.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("auth.jwt_secret must be at least 32 bytes");
        }

        if self.auth.jwt_secret == DEFAULT_JWT_SECRET && !self.dev_mode() {
            anyhow::bail!("auth.jwt_secret is still the default value; set WARDEN_JWT_SECRET");
        }

        if self.auth.access_token_ttl_seconds <= 0 || self.auth.refresh_token_ttl_seconds <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }

        if self.auth.refresh_token_ttl_seconds < self.auth.access_token_ttl_seconds {
            anyhow::bail!("Refresh token lifetime must not be shorter than the access lifetime");
        }

        if self.captcha.ttl_seconds == 0 || self.captcha.ttl_seconds > 300 {
            anyhow::bail!("captcha.ttl_seconds must be between 1 and 300");
        }

        if !(4..=8).contains(&self.captcha.code_length) {
            anyhow::bail!("captcha.code_length must be between 4 and 8");
        }

        if self.security.totp_issuer.contains(':') {
            anyhow::bail!("security.totp_issuer must not contain ':'");
        }

        if self.audit.max_attempts == 0 || self.audit.queue_capacity == 0 {
            anyhow::bail!("audit.max_attempts and audit.queue_capacity must be > 0");
        }

        if self.scheduler.enabled && self.scheduler.cleanup_cron.trim().is_empty() {
            anyhow::bail!("scheduler.cleanup_cron cannot be empty when the scheduler is enabled");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.access_token_ttl_seconds, 7200);
        assert_eq!(config.auth.refresh_token_ttl_seconds, 604_800);
        assert_eq!(config.captcha.ttl_seconds, 300);
        assert_eq!(config.security.auth_throttle.max_attempts, 5);
        assert!(config.captcha.dev_secret.is_none());
    }

    #[test]
    fn test_default_secret_requires_dev_mode() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.captcha.dev_secret = Some("dev-secret-change-me".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_long_captcha_ttl() {
        let mut config = Config::default();
        config.auth.jwt_secret = "x".repeat(48);
        config.captcha.ttl_seconds = 301;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[auth]"));
        assert!(toml_str.contains("[security.auth_throttle]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [captcha]
            dev_secret = "dev-secret-change-me"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(
            config.captcha.dev_secret.as_deref(),
            Some("dev-secret-change-me")
        );
        assert_eq!(config.auth.issuer, "warden");
    }
}
