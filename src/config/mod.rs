mod settings;

pub use settings::{AppConfig, LoggingConfig, NotificationConfig, ServiceConfig, Settings};
