//! Notification-delivery service backends.
//!
//! - `DbusDeliveryService`: the freedesktop.org notification daemon over the session bus (default)
//! - `MemoryDeliveryService`: in-process stand-in, used by tests and `backend = "memory"`
//!
//! Use `create_delivery_service()` to pick one from configuration.

mod backend;
mod dbus_backend;
mod factory;
mod memory_backend;

pub use backend::{DeliveryService, OutboundNotification};
pub use dbus_backend::{DbusDeliveryService, NOTIFICATIONS_DBUS_BUS, NOTIFICATIONS_DBUS_OBJECT};
pub use factory::create_delivery_service;
pub use memory_backend::{
    MemoryDeliveryService, MemoryServiceConfig, MemoryServiceStatsSnapshot, MEMORY_SERVER_NAME,
};
