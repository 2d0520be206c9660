use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub password_rules: PasswordRulesConfig,

    pub user_activation: UserActivationConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub app_name: String,

    pub database_path: String,

    pub log_level: String,

    /// Language used for request display names when the session carries none
    /// or no translation exists.
    pub default_language: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "Memberhub".to_string(),
            database_path: "sqlite:data/memberhub.db".to_string(),
            log_level: "info".to_string(),
            default_language: "EN".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    /// Serve over HTTPS. Only affects the URL `memberhub stop` calls.
    pub use_https: bool,

    /// Whether to set the Secure flag on session cookies.
    pub secure_cookies: bool,

    /// Idle session lifetime in minutes.
    pub session_minutes: i64,

    /// Directory holding `*.html` handlebars templates (`layout.html` wraps pages).
    pub templates_path: String,

    pub static_path: String,

    /// Peers allowed to register the bootstrap `admin` account besides loopback.
    pub admin_ips: Vec<String>,

    /// Seconds to wait for in-flight requests on shutdown.
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            use_https: false,
            secure_cookies: true,
            session_minutes: 60,
            templates_path: "templates".to_string(),
            static_path: "static".to_string(),
            admin_ips: Vec::new(),
            shutdown_grace_seconds: 5,
        }
    }
}

/// Upper bound for `change-interval`, about a hundred years.
pub const MAX_CHANGE_INTERVAL_DAYS: i64 = 36_500;

/// Upper bound for `password-fail-interval`, one year.
pub const MAX_FAIL_INTERVAL_MINUTES: i64 = 525_600;

/// Password policy. Every numeric threshold except `max-characters` is
/// disabled when set to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PasswordRulesConfig {
    /// Days a new password stays valid.
    pub change_interval: i64,

    /// Minutes after the first failed attempt before the counter restarts.
    pub password_fail_interval: i64,

    pub max_allowed_failed_atmpts: i32,

    pub not_repeat_last_x_passwords: u64,

    pub min_characters: usize,

    /// Longest accepted password. Checked before anything else looks at it.
    pub max_characters: usize,

    pub min_letters: usize,

    pub min_capitals: usize,

    pub min_digits: usize,

    pub min_non_alpha_numerics: usize,

    pub allow_repetitive_characters: bool,

    pub can_contain_username: bool,
}

impl Default for PasswordRulesConfig {
    fn default() -> Self {
        Self {
            change_interval: 90,
            password_fail_interval: 15,
            max_allowed_failed_atmpts: 5,
            not_repeat_last_x_passwords: 3,
            min_characters: 8,
            max_characters: 128,
            min_letters: 2,
            min_capitals: 1,
            min_digits: 1,
            min_non_alpha_numerics: 0,
            allow_repetitive_characters: false,
            can_contain_username: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserActivationConfig {
    pub auto_activate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    /// Length of generated temporary passwords.
    pub temporary_password_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            temporary_password_length: 14,
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
        labels.insert("app".to_string(), "memberhub".to_string());

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

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
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

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("memberhub").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".memberhub").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
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

    pub fn validate(&self) -> Result<()> {
        if self.general.default_language.trim().is_empty() {
            anyhow::bail!("general.default_language cannot be empty");
        }

        let rules = &self.password_rules;
        if rules.change_interval < 0
            || rules.password_fail_interval < 0
            || rules.max_allowed_failed_atmpts < 0
        {
            anyhow::bail!("password_rules intervals and attempt limits cannot be negative");
        }
        if rules.change_interval > MAX_CHANGE_INTERVAL_DAYS {
            anyhow::bail!(
                "password_rules.change-interval must be at most {MAX_CHANGE_INTERVAL_DAYS} days"
            );
        }
        if rules.password_fail_interval > MAX_FAIL_INTERVAL_MINUTES {
            anyhow::bail!(
                "password_rules.password-fail-interval must be at most {MAX_FAIL_INTERVAL_MINUTES} minutes"
            );
        }
        if rules.max_characters == 0 {
            anyhow::bail!("password_rules.max-characters must be > 0");
        }
        if rules.max_characters < rules.min_characters
            || rules.max_characters < self.security.temporary_password_length
        {
            anyhow::bail!(
                "password_rules.max-characters must cover min-characters and security.temporary_password_length"
            );
        }

        if !(1..=MAX_FAIL_INTERVAL_MINUTES).contains(&self.server.session_minutes) {
            anyhow::bail!(
                "server.session_minutes must be between 1 and {MAX_FAIL_INTERVAL_MINUTES}"
            );
        }

        if self.security.temporary_password_length < 8 {
            anyhow::bail!("security.temporary_password_length must be at least 8");
        }

        for ip in &self.server.admin_ips {
            ip.parse::<std::net::IpAddr>()
                .with_context(|| format!("Invalid address in server.admin_ips: {ip}"))?;
        }

        Ok(())
    }

    /// URL of the running instance's stop endpoint.
    #[must_use]
    pub fn stop_url(&self) -> String {
        let scheme = if self.server.use_https { "https" } else { "http" };
        format!("{scheme}://localhost:{}/stop-process", self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.default_language, "EN");
        assert_eq!(config.password_rules.password_fail_interval, 15);
        assert!(!config.user_activation.auto_activate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[password_rules]"));
        assert!(toml_str.contains("max-allowed-failed-atmpts"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [password_rules]
            min-characters = 12
            can-contain-username = true

            [user_activation]
            auto-activate = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.password_rules.min_characters, 12);
        assert!(config.password_rules.can_contain_username);
        assert!(config.user_activation.auto_activate);

        assert_eq!(config.password_rules.min_capitals, 1);
    }

    #[test]
    fn test_validate_rejects_bad_admin_ip() {
        let mut config = Config::default();
        config.server.admin_ips = vec!["not-an-ip".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_intervals() {
        let mut config = Config::default();
        config.password_rules.change_interval = 3_000_000;
        assert!(config.validate().is_err());
        config.password_rules.change_interval = MAX_CHANGE_INTERVAL_DAYS;
        assert!(config.validate().is_ok());

        config.password_rules.password_fail_interval = MAX_FAIL_INTERVAL_MINUTES + 1;
        assert!(config.validate().is_err());
        config.password_rules.password_fail_interval = 0;
        assert!(config.validate().is_ok());

        config.server.session_minutes = i64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_max_characters() {
        let mut config = Config::default();
        config.password_rules.max_characters = 0;
        assert!(config.validate().is_err());

        config.password_rules.max_characters = 10;
        assert!(config.validate().is_err(), "shorter than temporary passwords");

        config.password_rules.max_characters = 14;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stop_url() {
        let mut config = Config::default();
        config.server.port = 9000;
        assert_eq!(config.stop_url(), "http://localhost:9000/stop-process");
        config.server.use_https = true;
        assert_eq!(config.stop_url(), "https://localhost:9000/stop-process");
    }
}
