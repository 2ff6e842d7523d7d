//! D-Bus delivery service talking to `org.freedesktop.Notifications`.
//!
//! On connect a background task subscribes to the `NotificationClosed`
//! signal so the session can tell "already dismissed" apart from
//! "still displayed". The task stops when the service disconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use zbus::zvariant::Value;
use zbus::Connection;

use crate::error::{NotifyError, Result};
use crate::notification::{CloseReason, NotificationId, ServerInformation};

use super::backend::{DeliveryService, OutboundNotification};

pub const NOTIFICATIONS_DBUS_BUS: &str = "org.freedesktop.Notifications";
pub const NOTIFICATIONS_DBUS_OBJECT: &str = "/org/freedesktop/Notifications";

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, &Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    fn close_notification(&self, id: u32) -> zbus::Result<()>;

    fn get_capabilities(&self) -> zbus::Result<Vec<String>>;

    fn get_server_information(&self) -> zbus::Result<(String, String, String, String)>;

    #[zbus(signal)]
    fn notification_closed(&self, id: u32, reason: u32) -> zbus::Result<()>;
}

struct Connected {
    proxy: NotificationsProxy<'static>,
    listener: JoinHandle<()>,
}

/// Close reasons for the notifications this service displayed.
///
/// `NotificationClosed` is broadcast for every application on the bus, so
/// only ids issued through `notify` are recorded.
#[derive(Debug, Default)]
struct ClosedTracker {
    /// Issued ids still open: notification id -> ()
    issued: DashMap<u32, ()>,
    /// Reported closures: notification id -> reason
    closed: DashMap<u32, CloseReason>,
}

impl ClosedTracker {
    fn issue(&self, id: u32) {
        self.issued.insert(id, ());
    }

    /// Record a closure. Returns false for ids this service never issued.
    fn record(&self, id: u32, reason: CloseReason) -> bool {
        if self.issued.remove(&id).is_some() {
            self.closed.insert(id, reason);
            true
        } else {
            false
        }
    }

    fn reason(&self, id: u32) -> Option<CloseReason> {
        self.closed.get(&id).map(|r| *r.value())
    }

    fn forget(&self, id: u32) {
        self.issued.remove(&id);
        self.closed.remove(&id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.issued.len() + self.closed.len()
    }
}

/// Delivery service backed by the session bus.
///
/// The bus connection is shared by every session connected through this
/// service and released when the last one disconnects.
pub struct DbusDeliveryService {
    connection: Arc<Mutex<Option<Connected>>>,
    /// Sessions currently connected; only changed while `connection` is locked
    sessions: Arc<AtomicUsize>,
    tracker: Arc<ClosedTracker>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DbusDeliveryService {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            connection: Arc::new(Mutex::new(None)),
            sessions: Arc::new(AtomicUsize::new(0)),
            tracker: Arc::new(ClosedTracker::default()),
            shutdown_tx,
        }
    }

    async fn proxy(&self) -> Result<NotificationsProxy<'static>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|c| c.proxy.clone())
            .ok_or_else(|| NotifyError::Delivery("not connected to the session bus".to_string()))
    }

    async fn spawn_listener(&self, proxy: &NotificationsProxy<'static>) -> Result<JoinHandle<()>> {
        let mut signals = proxy
            .receive_notification_closed()
            .await
            .map_err(|e| NotifyError::Init(format!("cannot subscribe to NotificationClosed: {}", e)))?;
        let tracker = self.tracker.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    signal = signals.next() => {
                        let Some(signal) = signal else { break };
                        match signal.args() {
                            Ok(args) => {
                                let id = *args.id();
                                let reason = CloseReason::from_wire(*args.reason());
                                if tracker.record(id, reason) {
                                    tracing::debug!(
                                        notification_id = id,
                                        reason = ?reason,
                                        "NotificationClosed received"
                                    );
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Malformed NotificationClosed signal");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("NotificationClosed listener stopped");
        }))
    }

    fn teardown(slot: &mut Option<Connected>, shutdown_tx: &broadcast::Sender<()>) {
        if let Some(connected) = slot.take() {
            let _ = shutdown_tx.send(());
            connected.listener.abort();
            tracing::info!("Disconnected from notification service");
        }
    }

    /// Sessions currently connected through this service
    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Default for DbusDeliveryService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DbusDeliveryService {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.connection.try_lock() {
            Self::teardown(&mut guard, &self.shutdown_tx);
        }
    }
}

fn build_hints(notification: &OutboundNotification) -> HashMap<&str, Value<'_>> {
    let mut hints = HashMap::new();
    hints.insert("urgency", Value::from(notification.urgency.as_hint()));
    if let Some(category) = notification.category.as_deref() {
        hints.insert("category", Value::from(category));
    }
    hints
}

#[async_trait]
impl DeliveryService for DbusDeliveryService {
    fn backend_name(&self) -> &'static str {
        "dbus"
    }

    #[tracing::instrument(name = "dbus.connect", skip(self))]
    async fn connect(&self, app_name: &str) -> Result<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            let connection = Connection::session()
                .await
                .map_err(|e| NotifyError::Init(format!("session bus unreachable: {}", e)))?;
            let proxy = NotificationsProxy::new(&connection).await.map_err(|e| {
                NotifyError::Init(format!("{} unavailable: {}", NOTIFICATIONS_DBUS_BUS, e))
            })?;
            let listener = self.spawn_listener(&proxy).await?;

            tracing::info!(
                bus = NOTIFICATIONS_DBUS_BUS,
                object = NOTIFICATIONS_DBUS_OBJECT,
                "Connected to notification service"
            );
            *guard = Some(Connected { proxy, listener });
        }

        let sessions = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(sessions = sessions, "Session attached to bus connection");
        Ok(())
    }

    #[tracing::instrument(name = "dbus.notify", skip(self, notification), fields(app_name = %notification.app_name))]
    async fn notify(&self, notification: &OutboundNotification) -> Result<NotificationId> {
        let proxy = self.proxy().await?;
        let hints = build_hints(notification);
        let hint_refs: HashMap<&str, &Value<'_>> = hints.iter().map(|(k, v)| (*k, v)).collect();
        let raw_id = proxy
            .notify(
                &notification.app_name,
                0,
                &notification.icon,
                &notification.title,
                &notification.body,
                &[],
                hint_refs,
                notification.expire_timeout,
            )
            .await?;

        let id = NotificationId::new(raw_id)
            .ok_or_else(|| NotifyError::Delivery("service returned notification id 0".to_string()))?;
        self.tracker.issue(raw_id);
        Ok(id)
    }

    async fn close_notification(&self, id: NotificationId) -> Result<()> {
        let proxy = self.proxy().await?;
        match proxy.close_notification(id.get()).await {
            Ok(()) => {
                self.tracker.record(id.get(), CloseReason::Closed);
                Ok(())
            }
            Err(zbus::Error::MethodError(name, message, _)) => Err(NotifyError::NotFound(format!(
                "notification {}: {} {}",
                id,
                name,
                message.unwrap_or_default()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn closed_reason(&self, id: NotificationId) -> Option<CloseReason> {
        self.tracker.reason(id.get())
    }

    fn forget(&self, id: NotificationId) {
        self.tracker.forget(id.get());
    }

    async fn server_information(&self) -> Result<ServerInformation> {
        let (name, vendor, version, spec_version) =
            self.proxy().await?.get_server_information().await?;
        Ok(ServerInformation {
            name,
            vendor,
            version,
            spec_version,
        })
    }

    async fn capabilities(&self) -> Result<Vec<String>> {
        Ok(self.proxy().await?.get_capabilities().await?)
    }

    fn disconnect(&self) {
        let previous = match self
            .sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous,
            Err(_) => return,
        };
        if previous > 1 {
            tracing::debug!(sessions = previous - 1, "Session detached from bus connection");
            return;
        }

        // disconnect runs from Drop and must not block on the lock
        if let Ok(mut guard) = self.connection.try_lock() {
            Self::teardown(&mut guard, &self.shutdown_tx);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("Bus connection busy, deferring teardown");
                let connection = self.connection.clone();
                let sessions = self.sessions.clone();
                let shutdown_tx = self.shutdown_tx.clone();
                handle.spawn(async move {
                    let mut guard = connection.lock().await;
                    // A session may have attached again in the meantime
                    if sessions.load(Ordering::SeqCst) == 0 {
                        Self::teardown(&mut guard, &shutdown_tx);
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    "Bus connection busy and no runtime available; it is released when the service drops"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Urgency;

    #[test]
    fn test_hints_carry_urgency_and_category() {
        let notification = OutboundNotification {
            app_name: "test".to_string(),
            title: "t".to_string(),
            body: String::new(),
            icon: String::new(),
            urgency: Urgency::Critical,
            category: Some("im.received".to_string()),
            expire_timeout: -1,
        };

        let hints = build_hints(&notification);
        assert_eq!(hints.get("urgency"), Some(&Value::U8(2)));
        assert_eq!(hints.get("category"), Some(&Value::from("im.received")));
    }

    #[test]
    fn test_hints_without_category() {
        let notification = OutboundNotification {
            app_name: "test".to_string(),
            title: "t".to_string(),
            body: String::new(),
            icon: String::new(),
            urgency: Urgency::Low,
            category: None,
            expire_timeout: 0,
        };

        let hints = build_hints(&notification);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints.get("urgency"), Some(&Value::U8(0)));
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail() {
        let service = DbusDeliveryService::new();
        let err = service.capabilities().await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
    }

    #[test]
    fn test_disconnect_without_sessions_is_noop() {
        let service = DbusDeliveryService::new();
        service.disconnect();
        service.disconnect();
        assert_eq!(service.session_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_while_connection_busy_defers_teardown() {
        let service = DbusDeliveryService::new();
        service.sessions.store(1, Ordering::SeqCst);

        let guard = service.connection.lock().await;
        // Must return without waiting for the lock
        service.disconnect();
        assert_eq!(service.session_count(), 0);
        drop(guard);

        // The deferred teardown takes the lock once and releases it
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let slot = service.connection.lock().await;
        assert!(slot.is_none());
    }

    #[test]
    fn test_tracker_ignores_foreign_notifications() {
        let tracker = ClosedTracker::default();
        tracker.issue(7);

        // Another application's notification closing
        assert!(!tracker.record(99, CloseReason::Expired));
        assert_eq!(tracker.reason(99), None);

        assert!(tracker.record(7, CloseReason::Dismissed));
        assert_eq!(tracker.reason(7), Some(CloseReason::Dismissed));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_tracker_forget_evicts() {
        let tracker = ClosedTracker::default();
        tracker.issue(1);
        tracker.issue(2);
        tracker.record(1, CloseReason::Closed);

        tracker.forget(1);
        tracker.forget(2);
        assert_eq!(tracker.reason(1), None);
        assert_eq!(tracker.len(), 0);
    }
}
