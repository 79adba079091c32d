use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,

    // Nodo de audio (Lavalink v4)
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_ssl: bool,

    // Reproducción
    pub default_volume: u16,
    pub max_queue_size: usize,
    pub max_history_size: usize,
    pub idle_timeout_secs: u64,
    pub deafen_on_join: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,

            // Lavalink
            lavalink_host: env_or("LAVALINK_HOST", &defaults.lavalink_host),
            lavalink_port: env_or("LAVALINK_PORT", "2333").parse()?,
            lavalink_password: env_or("LAVALINK_PASSWORD", &defaults.lavalink_password),
            lavalink_ssl: env_or("LAVALINK_SSL", "false").parse()?,

            // Reproducción
            default_volume: env_or("DEFAULT_VOLUME", "100").parse()?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", "1000").parse()?,
            max_history_size: env_or("MAX_HISTORY_SIZE", "50").parse()?,
            idle_timeout_secs: env_or("IDLE_TIMEOUT_SECS", "300").parse()?,
            deafen_on_join: env_or("DEAFEN_ON_JOIN", "true").parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 1000 (node scale, 100 = unity)
    /// - Queue and history capacities must be greater than 0
    /// - Idle timeout must be at least one second
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 1000 {
            anyhow::bail!("Default volume must be between 0 and 1000, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_history_size == 0 {
            anyhow::bail!("Max history size must be greater than 0");
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be at least 1 second");
        }

        if self.lavalink_host.trim().is_empty() {
            anyhow::bail!("Lavalink host must not be empty");
        }

        Ok(())
    }

    /// URL base del REST del nodo
    pub fn lavalink_url(&self) -> String {
        let scheme = if self.lavalink_ssl { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.lavalink_host, self.lavalink_port)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and passwords are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {}\n  \
            Lavalink: {}:{} (ssl={})\n  \
            Playback: {}% vol, deafen={}\n  \
            Limits: {} queue, {} history, {}s idle",
            self.application_id,
            self.lavalink_host,
            self.lavalink_port,
            self.lavalink_ssl,
            self.default_volume,
            self.deafen_on_join,
            self.max_queue_size,
            self.max_history_size,
            self.idle_timeout_secs,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,

            // Lavalink defaults
            lavalink_host: "localhost".to_string(),
            lavalink_port: 2333,
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_ssl: false,

            // Playback defaults
            default_volume: 100,
            max_queue_size: 1000,
            max_history_size: 50,
            idle_timeout_secs: 300,
            deafen_on_join: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lavalink_url(), "http://localhost:2333/");
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let loud = Config {
            default_volume: 1001,
            ..Config::default()
        };
        assert!(loud.validate().is_err());

        let no_history = Config {
            max_history_size: 0,
            ..Config::default()
        };
        assert!(no_history.validate().is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            discord_token: "super-secret".into(),
            lavalink_ssl: true,
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(!summary.contains("youshallnotpass"));
        assert!(config.lavalink_url().starts_with("https://"));
    }
}
