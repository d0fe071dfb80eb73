use crate::core::transport::DEFAULT_REQUEST_TIMEOUT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub polling: PollingSettings,
    pub display: DisplaySettings,
    pub watch: WatchSettings,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub url: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub period_ms: u64,
    pub backoff_max_period_ms: u64,
    pub doitnow: bool,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            period_ms: 3_000,
            backoff_max_period_ms: 900_000,
            doitnow: true,
        }
    }
}

impl PollingSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn backoff_max_period(&self) -> Duration {
        Duration::from_millis(self.backoff_max_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub color: bool,
    pub stale_opacity: f32,
    pub fade_ms: u64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            color: true,
            stale_opacity: 0.3,
            fade_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub status: bool,
    pub activity: Option<String>,
    /// `application/entity`
    pub sensors: Option<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            status: true,
            activity: None,
            sensors: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("brooklyn-console").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling.period_ms == 0 {
            anyhow::bail!("polling.period_ms must be greater than zero");
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be greater than zero");
        }
        if self.polling.backoff_max_period_ms < self.polling.period_ms {
            anyhow::bail!(
                "polling.backoff_max_period_ms ({}) must not be below polling.period_ms ({})",
                self.polling.backoff_max_period_ms,
                self.polling.period_ms
            );
        }
        if !(0.0..1.0).contains(&self.display.stale_opacity) {
            anyhow::bail!(
                "display.stale_opacity must be in [0.0, 1.0), got {}",
                self.display.stale_opacity
            );
        }
        if let Some(sensors) = &self.watch.sensors {
            parse_entity_ref(sensors)?;
        }
        Ok(())
    }
}

/// Splits `application/entity` into its two ids.
pub fn parse_entity_ref(value: &str) -> Result<(String, String)> {
    match value.split_once('/') {
        Some((app, entity)) if !app.is_empty() && !entity.is_empty() && !entity.contains('/') => {
            Ok((app.to_string(), entity.to_string()))
        }
        _ => anyhow::bail!("expected `application/entity`, got `{value}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.url, "http://localhost:8081");
        assert_eq!(settings.polling.period(), Duration::from_millis(3_000));
        assert_eq!(
            settings.polling.backoff_max_period(),
            Duration::from_millis(900_000)
        );
        assert!(settings.polling.doitnow);
        assert!(settings.watch.status);
        assert!(settings.watch.activity.is_none());
        assert!(!settings.debug);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.polling.period_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.server.request_timeout_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.polling.backoff_max_period_ms = 1_000;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.display.stale_opacity = 1.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.watch.sensors = Some("just-an-app".to_string());
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            debug = true

            [server]
            url = "https://brooklyn.example.com"

            [polling]
            period_ms = 5000
            backoff_max_period_ms = 60000
            doitnow = false

            [display]
            color = false

            [watch]
            status = false
            activity = "Xy12"
            sensors = "petclinic/web"
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.server.url, "https://brooklyn.example.com");
        assert_eq!(settings.server.request_timeout_secs, 15);
        assert_eq!(settings.polling.period_ms, 5_000);
        assert!(!settings.polling.doitnow);
        assert!(!settings.display.color);
        assert!((settings.display.stale_opacity - 0.3).abs() < f32::EPSILON);
        assert!(!settings.watch.status);
        assert_eq!(settings.watch.activity.as_deref(), Some("Xy12"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.polling.period_ms, 3_000);

        std::fs::write(&path, "[polling]\nperiod_ms = 750\n").unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.polling.period_ms, 750);

        std::fs::write(&path, "[polling\n").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_parse_entity_ref() {
        assert_eq!(
            parse_entity_ref("petclinic/web").unwrap(),
            ("petclinic".to_string(), "web".to_string())
        );
        assert!(parse_entity_ref("petclinic").is_err());
        assert!(parse_entity_ref("/web").is_err());
        assert!(parse_entity_ref("a/b/c").is_err());
    }
}
