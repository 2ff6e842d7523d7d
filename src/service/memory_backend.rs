//! In-process delivery service using DashMap.
//!
//! Behaves like a minimal notification daemon: assigns ids, keeps the
//! displayed notifications, expires them once their timeout elapses and
//! records why each one went away. Nothing is rendered.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{NotifyError, Result};
use crate::notification::{CloseReason, NotificationId, ServerInformation};

use super::backend::{DeliveryService, OutboundNotification};

/// Display time applied when a notification asks for the server default
const DEFAULT_EXPIRE_MS: u64 = 5000;

/// Server name reported by `server_information`
pub const MEMORY_SERVER_NAME: &str = "ara-memory";

/// Configuration for the memory delivery service
#[derive(Debug, Clone, Default)]
pub struct MemoryServiceConfig {
    /// Reject titles longer than this many characters
    pub max_title_length: Option<usize>,
}

#[derive(Debug, Clone)]
struct DisplayedNotification {
    notification: OutboundNotification,
    expires_at: Option<Instant>,
}

/// Counters for the memory service (atomic for thread safety)
#[derive(Debug, Default)]
struct MemoryServiceStats {
    total_shown: AtomicU64,
    total_rejected: AtomicU64,
    total_closed: AtomicU64,
    total_expired: AtomicU64,
}

/// Snapshot of memory service statistics
#[derive(Debug, Clone, Serialize)]
pub struct MemoryServiceStatsSnapshot {
    pub total_shown: u64,
    pub total_rejected: u64,
    pub total_closed: u64,
    pub total_expired: u64,
    pub displayed: usize,
}

/// In-memory notification-delivery service.
pub struct MemoryDeliveryService {
    config: MemoryServiceConfig,
    reachable: AtomicBool,
    /// Sessions currently connected
    connections: AtomicUsize,
    next_id: AtomicU32,
    /// Currently displayed: notification id -> notification
    displayed: DashMap<u32, DisplayedNotification>,
    /// Gone: notification id -> reason
    closed: DashMap<u32, CloseReason>,
    stats: MemoryServiceStats,
}

impl MemoryDeliveryService {
    pub fn new(config: MemoryServiceConfig) -> Self {
        Self {
            config,
            reachable: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
            next_id: AtomicU32::new(1),
            displayed: DashMap::new(),
            closed: DashMap::new(),
            stats: MemoryServiceStats::default(),
        }
    }

    /// Create a service that rejects titles longer than `max` characters
    pub fn with_max_title_length(max: usize) -> Self {
        Self::new(MemoryServiceConfig {
            max_title_length: Some(max),
        })
    }

    /// Simulate the daemon going away (or coming back)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connection_count() > 0
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of close reasons still held
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    /// Simulate the user dismissing a notification. Returns false if it was not displayed.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.remove_displayed(id.get(), CloseReason::Dismissed)
    }

    /// The notification currently displayed under `id`, if any
    pub fn displayed(&self, id: NotificationId) -> Option<OutboundNotification> {
        self.sweep_expired();
        self.displayed
            .get(&id.get())
            .map(|entry| entry.notification.clone())
    }

    pub fn displayed_count(&self) -> usize {
        self.sweep_expired();
        self.displayed.len()
    }

    pub fn stats(&self) -> MemoryServiceStatsSnapshot {
        MemoryServiceStatsSnapshot {
            total_shown: self.stats.total_shown.load(Ordering::Relaxed),
            total_rejected: self.stats.total_rejected.load(Ordering::Relaxed),
            total_closed: self.stats.total_closed.load(Ordering::Relaxed),
            total_expired: self.stats.total_expired.load(Ordering::Relaxed),
            displayed: self.displayed.len(),
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery(
                "notification service unreachable".to_string(),
            ));
        }
        if !self.is_connected() {
            return Err(NotifyError::Delivery(
                "notification service not connected".to_string(),
            ));
        }
        Ok(())
    }

    fn validate(&self, notification: &OutboundNotification) -> Result<()> {
        if notification.title.is_empty() {
            return Err(NotifyError::Delivery("empty summary".to_string()));
        }
        if let Some(max) = self.config.max_title_length {
            let len = notification.title.chars().count();
            if len > max {
                return Err(NotifyError::Delivery(format!(
                    "summary is {} characters, service accepts at most {}",
                    len, max
                )));
            }
        }
        Ok(())
    }

    fn expiry_for(expire_timeout: i32) -> Option<Instant> {
        let ms = match expire_timeout {
            0 => return None,
            t if t < 0 => DEFAULT_EXPIRE_MS,
            t => t as u64,
        };
        Some(Instant::now() + Duration::from_millis(ms))
    }

    fn remove_displayed(&self, id: u32, reason: CloseReason) -> bool {
        if self.displayed.remove(&id).is_some() {
            self.closed.insert(id, reason);
            true
        } else {
            false
        }
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<u32> = self
            .displayed
            .iter()
            .filter(|entry| entry.expires_at.is_some_and(|at| at <= now))
            .map(|entry| *entry.key())
            .collect();

        for id in expired {
            if self.remove_displayed(id, CloseReason::Expired) {
                self.stats.total_expired.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(notification_id = id, "Notification expired");
            }
        }
    }
}

impl Default for MemoryDeliveryService {
    fn default() -> Self {
        Self::new(MemoryServiceConfig::default())
    }
}

#[async_trait]
impl DeliveryService for MemoryDeliveryService {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, app_name: &str) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(NotifyError::Init(
                "notification service unreachable".to_string(),
            ));
        }
        let connections = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            app_name = %app_name,
            connections = connections,
            "Memory delivery service connected"
        );
        Ok(())
    }

    async fn notify(&self, notification: &OutboundNotification) -> Result<NotificationId> {
        self.ensure_available()?;
        self.sweep_expired();

        if let Err(e) = self.validate(notification) {
            self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let raw_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = NotificationId::new(raw_id)
            .ok_or_else(|| NotifyError::Delivery("notification id space exhausted".to_string()))?;

        self.displayed.insert(
            raw_id,
            DisplayedNotification {
                notification: notification.clone(),
                expires_at: Self::expiry_for(notification.expire_timeout),
            },
        );
        self.stats.total_shown.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            notification_id = raw_id,
            app_name = %notification.app_name,
            "Notification displayed"
        );

        Ok(id)
    }

    async fn close_notification(&self, id: NotificationId) -> Result<()> {
        self.ensure_available()?;
        self.sweep_expired();

        if self.remove_displayed(id.get(), CloseReason::Closed) {
            self.stats.total_closed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            Err(NotifyError::NotFound(format!("notification {} is not displayed", id)))
        }
    }

    fn closed_reason(&self, id: NotificationId) -> Option<CloseReason> {
        self.sweep_expired();
        self.closed.get(&id.get()).map(|r| *r.value())
    }

    async fn server_information(&self) -> Result<ServerInformation> {
        self.ensure_available()?;
        Ok(ServerInformation {
            name: MEMORY_SERVER_NAME.to_string(),
            vendor: "Ara".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            spec_version: "1.2".to_string(),
        })
    }

    async fn capabilities(&self) -> Result<Vec<String>> {
        self.ensure_available()?;
        Ok(vec!["body".to_string(), "icon-static".to_string()])
    }

    fn forget(&self, id: NotificationId) {
        self.closed.remove(&id.get());
    }

    fn disconnect(&self) {
        let released = self
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Ok(previous) = released {
            tracing::debug!(
                connections = previous - 1,
                "Memory delivery service connection released"
            );
        }
    }
}
