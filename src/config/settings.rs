use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::notification::Urgency;
use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name the session is opened with
    #[serde(default = "default_app_name")]
    pub name: String,
}

/// Content and display parameters of the notification the binary sends
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Display timeout in milliseconds; 0 means never expire, negative means server default
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
    /// How long to wait before withdrawing the notification
    #[serde(default = "default_display_ms")]
    pub display_ms: u64,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Delivery backend: "dbus" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Longest title the memory backend accepts (unbounded when absent)
    #[serde(default)]
    pub max_title_length: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Output format: "plain" or "json"
    #[serde(default)]
    pub format: LogFormat,
}

fn default_app_name() -> String {
    "Hello World!".to_string()
}

fn default_title() -> String {
    "Hello World!".to_string()
}

fn default_body() -> String {
    "This is an example notification.".to_string()
}

fn default_timeout_ms() -> i64 {
    3000
}

fn default_display_ms() -> u64 {
    3000
}

fn default_backend() -> String {
    "dbus".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("app.name", default_app_name())?
            .set_default("notification.timeout_ms", default_timeout_ms())?
            .set_default("notification.display_ms", default_display_ms())?
            .set_default("service.backend", default_backend())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // NOTIFY__APP__NAME, NOTIFY__SERVICE__BACKEND, NOTIFY__NOTIFICATION__TIMEOUT_MS, ...
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: default_body(),
            icon: None,
            timeout_ms: default_timeout_ms(),
            display_ms: default_display_ms(),
            urgency: Urgency::default(),
            category: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            max_title_length: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.app.name, "Hello World!");
        assert_eq!(settings.notification.title, "Hello World!");
        assert_eq!(settings.notification.body, "This is an example notification.");
        assert_eq!(settings.notification.icon, None);
        assert_eq!(settings.notification.timeout_ms, 3000);
        assert_eq!(settings.service.backend, "dbus");
        assert_eq!(settings.logging.format, LogFormat::Plain);
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let settings: Settings = Config::builder()
            .set_override("service.backend", "memory")
            .unwrap()
            .set_override("notification.urgency", "critical")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.service.backend, "memory");
        assert_eq!(settings.notification.urgency, Urgency::Critical);
        assert_eq!(settings.notification.display_ms, 3000);
        assert_eq!(settings.app.name, "Hello World!");
    }

    fn with_log_format(format: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .set_override("logging.format", format)?
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_log_format_values() {
        assert_eq!(with_log_format("json").unwrap().logging.format, LogFormat::Json);
        assert_eq!(with_log_format("text").unwrap().logging.format, LogFormat::Plain);
    }

    #[test]
    fn test_unknown_log_format_is_config_error() {
        let err = with_log_format("xml").unwrap_err();
        assert_eq!(crate::error::NotifyError::from(err).exit_code(), 6);
    }
}
