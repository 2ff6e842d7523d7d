//! Delivery service factory

use std::sync::Arc;

use crate::config::ServiceConfig;

use super::backend::DeliveryService;
use super::dbus_backend::DbusDeliveryService;
use super::memory_backend::{MemoryDeliveryService, MemoryServiceConfig};

/// Create a delivery service based on configuration.
///
/// Returns the appropriate backend implementation based on the `backend` setting:
/// - `"memory"`: Returns a `MemoryDeliveryService`
/// - `"dbus"` (default): Returns a `DbusDeliveryService`
///
/// Unknown backend names fall back to D-Bus.
///
/// # Example
///
/// ```rust,ignore
/// let service = create_delivery_service(&settings.service);
/// let session = NotificationSession::init(service, &settings.app.name).await?;
/// ```
pub fn create_delivery_service(settings: &ServiceConfig) -> Arc<dyn DeliveryService> {
    match settings.backend.as_str() {
        "memory" => {
            tracing::info!(
                backend = "memory",
                max_title_length = ?settings.max_title_length,
                "Creating memory delivery service"
            );
            Arc::new(MemoryDeliveryService::new(MemoryServiceConfig {
                max_title_length: settings.max_title_length,
            }))
        }
        "dbus" => {
            tracing::info!(backend = "dbus", "Creating D-Bus delivery service");
            Arc::new(DbusDeliveryService::new())
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown delivery backend requested, falling back to dbus"
            );
            Arc::new(DbusDeliveryService::new())
        }
    }
}
