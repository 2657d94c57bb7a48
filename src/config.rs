//! Configuration for the anchor service and the opaque engine configuration.
//!
//! Both can be read from a TOML file:
//!
//! ```toml
//! [service]
//! creation_timeout_ms = 1000
//! poll_interval_ms = 1
//! restart_timeout_ms = 30000   # omit to wait indefinitely
//!
//! [anchors]
//! localization_timeout_s = 30.0
//! continuous_localization = true
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default bound on the legacy creation wait.
pub const DEFAULT_CREATION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default interval between registry checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Tuning for the anchor service itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// How long legacy creation waits for the engine's creation event.
    #[serde(rename = "creation_timeout_ms", with = "millis")]
    pub creation_timeout: Duration,

    /// Upper bound between two registry checks of a waiter.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Bound on each of restart's two state waits. `None` waits indefinitely.
    #[serde(rename = "restart_timeout_ms", with = "opt_millis")]
    pub restart_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            creation_timeout: DEFAULT_CREATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            restart_timeout: None,
        }
    }
}

/// Localization engine configuration.
///
/// Handed to the engine at construction and on every restart. The service
/// never reads these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorsConfiguration {
    /// Seconds the engine may spend before reporting a localization failure.
    pub localization_timeout_s: f32,
    /// Seconds of backend requests allowed per localization attempt.
    pub request_time_limit_s: f32,
    /// Keep localizing after the first fix.
    pub continuous_localization: bool,
    /// Smooth successive localization results.
    pub temporal_fusion: bool,
    /// Allow server-side processing of localization requests.
    pub cloud_processing: bool,
}

impl Default for AnchorsConfiguration {
    fn default() -> Self {
        Self {
            localization_timeout_s: 30.0,
            request_time_limit_s: 10.0,
            continuous_localization: true,
            temporal_fusion: true,
            cloud_processing: true,
        }
    }
}

/// Top-level file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub anchors: AnchorsConfiguration,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("invalid anchor service settings")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.creation_timeout, Duration::from_millis(1000));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert!(config.restart_timeout.is_none());
    }

    #[test]
    fn test_settings_from_partial_toml() {
        let settings = Settings::from_toml_str(
            r#"
            [service]
            creation_timeout_ms = 250
            restart_timeout_ms = 5000

            [anchors]
            continuous_localization = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.service.creation_timeout, Duration::from_millis(250));
        assert_eq!(settings.service.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(settings.service.restart_timeout, Some(Duration::from_secs(5)));
        assert!(!settings.anchors.continuous_localization);
        assert!(settings.anchors.temporal_fusion);
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(Settings::from_toml_str("[service]\ncreation_timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = Settings::load("/nonexistent/anchors.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/anchors.toml"));
    }
}
