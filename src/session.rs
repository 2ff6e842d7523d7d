//! Client session with a notification-delivery service.
//!
//! A session is `Active` from the moment `init` returns until `close_session`
//! (or drop) moves it to `Closed`. Every operation on a closed session fails
//! with `NotifyError::InvalidSession`.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{NotifyError, Result};
use crate::notification::{
    CloseReason, NotificationId, NotificationRequest, RequestState, ServerInformation,
};
use crate::service::{create_delivery_service, DeliveryService, OutboundNotification};

const STATE_ACTIVE: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Observable lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct ShownRecord {
    notification_id: NotificationId,
    shown_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionStats {
    total_shown: AtomicU64,
    total_closed: AtomicU64,
    total_failed: AtomicU64,
}

/// Snapshot of session statistics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatsSnapshot {
    pub total_shown: u64,
    pub total_closed: u64,
    pub total_failed: u64,
    pub active: usize,
}

/// An open session with the delivery service.
pub struct NotificationSession {
    app_name: String,
    service: Arc<dyn DeliveryService>,
    state: AtomicU8,
    /// Requests shown by this session and not yet closed: request id -> record
    shown: DashMap<Uuid, ShownRecord>,
    stats: SessionStats,
}

impl NotificationSession {
    /// Open a session with `service` under the given application name.
    #[tracing::instrument(name = "session.init", skip(service), fields(backend = service.backend_name()))]
    pub async fn init(service: Arc<dyn DeliveryService>, app_name: &str) -> Result<Self> {
        if app_name.is_empty() {
            return Err(NotifyError::Init(
                "application name must not be empty".to_string(),
            ));
        }

        service.connect(app_name).await?;
        tracing::info!(app_name = %app_name, "Notification session opened");

        Ok(Self {
            app_name: app_name.to_string(),
            service,
            state: AtomicU8::new(STATE_ACTIVE),
            shown: DashMap::new(),
            stats: SessionStats::default(),
        })
    }

    /// Open a session with the backend named in configuration
    pub async fn from_config(settings: &ServiceConfig, app_name: &str) -> Result<Self> {
        Self::init(create_delivery_service(settings), app_name).await
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_ACTIVE => SessionState::Active,
            _ => SessionState::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Number of notifications shown by this session and not closed by it
    pub fn active_count(&self) -> usize {
        self.shown.len()
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            total_shown: self.stats.total_shown.load(Ordering::Relaxed),
            total_closed: self.stats.total_closed.load(Ordering::Relaxed),
            total_failed: self.stats.total_failed.load(Ordering::Relaxed),
            active: self.shown.len(),
        }
    }

    /// Submit a request for display.
    ///
    /// Returns once the service has acknowledged the request with an id.
    /// A request can be shown only once.
    #[tracing::instrument(
        name = "session.show",
        skip(self, request),
        fields(app_name = %self.app_name, request_id = %request.id())
    )]
    pub async fn show(&self, request: &mut NotificationRequest) -> Result<NotificationId> {
        self.ensure_active()?;

        if !request.is_constructed() {
            return Err(NotifyError::Delivery(format!(
                "request {} was already submitted",
                request.id()
            )));
        }

        let outbound = OutboundNotification::from_request(&self.app_name, request);
        let notification_id = match self.service.notify(&outbound).await {
            Ok(id) => id,
            Err(e) => {
                self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Notification rejected");
                return Err(e);
            }
        };

        request.mark_shown(notification_id);
        self.shown.insert(
            request.id(),
            ShownRecord {
                notification_id,
                shown_at: Utc::now(),
            },
        );
        self.stats.total_shown.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            notification_id = %notification_id,
            timeout = ?request.timeout(),
            "Notification shown"
        );

        Ok(notification_id)
    }

    /// Withdraw a notification this session showed.
    ///
    /// Closing an already closed request is a no-op. Fails with `NotFound`
    /// when the request was never shown by this session or the service
    /// already dismissed it.
    #[tracing::instrument(
        name = "session.close",
        skip(self, request),
        fields(app_name = %self.app_name, request_id = %request.id())
    )]
    pub async fn close(&self, request: &mut NotificationRequest) -> Result<()> {
        self.ensure_active()?;

        let notification_id = match request.state() {
            RequestState::Constructed => {
                return Err(NotifyError::NotFound(format!(
                    "request {} was never shown",
                    request.id()
                )));
            }
            RequestState::Closed { notification_id } => {
                tracing::debug!(notification_id = %notification_id, "Request already closed");
                return Ok(());
            }
            RequestState::Shown { notification_id, .. } => notification_id,
        };

        let record = match self.shown.get(&request.id()) {
            Some(record) if record.notification_id == notification_id => *record,
            _ => {
                return Err(NotifyError::NotFound(format!(
                    "notification {} was not shown by this session",
                    notification_id
                )));
            }
        };

        if let Some(reason) = self.service.closed_reason(notification_id) {
            self.shown.remove(&request.id());
            self.service.forget(notification_id);
            return Err(NotifyError::NotFound(format!(
                "notification {} is already gone ({:?})",
                notification_id, reason
            )));
        }

        match self.service.close_notification(notification_id).await {
            Ok(()) => {
                self.shown.remove(&request.id());
                self.service.forget(notification_id);
                request.mark_closed(notification_id);
                self.stats.total_closed.fetch_add(1, Ordering::Relaxed);

                let displayed_ms = Utc::now()
                    .signed_duration_since(record.shown_at)
                    .num_milliseconds()
                    .max(0);
                tracing::debug!(
                    notification_id = %notification_id,
                    displayed_ms = displayed_ms,
                    "Notification closed"
                );
                Ok(())
            }
            Err(e @ NotifyError::NotFound(_)) => {
                self.shown.remove(&request.id());
                self.service.forget(notification_id);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Why a shown notification went away, once the service has reported it.
    ///
    /// `None` while the notification is still displayed or if it was never shown.
    /// A request closed through this session always reports `Closed`.
    pub fn closed_reason(&self, request: &NotificationRequest) -> Result<Option<CloseReason>> {
        self.ensure_active()?;

        Ok(match request.state() {
            RequestState::Constructed => None,
            RequestState::Closed { .. } => Some(CloseReason::Closed),
            RequestState::Shown { notification_id, .. } => {
                self.service.closed_reason(notification_id)
            }
        })
    }

    pub async fn server_information(&self) -> Result<ServerInformation> {
        self.ensure_active()?;
        self.service.server_information().await
    }

    pub async fn capabilities(&self) -> Result<Vec<String>> {
        self.ensure_active()?;
        self.service.capabilities().await
    }

    /// Tear the session down. Safe to call more than once.
    ///
    /// Notifications still on screen are left to the service.
    pub fn close_session(&self) {
        if self
            .state
            .compare_exchange(STATE_ACTIVE, STATE_CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let outstanding = self.shown.len();
        for record in self.shown.iter() {
            self.service.forget(record.notification_id);
        }
        self.shown.clear();
        self.service.disconnect();

        tracing::info!(
            app_name = %self.app_name,
            outstanding = outstanding,
            "Notification session closed"
        );
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(NotifyError::InvalidSession)
        }
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.close_session();
    }
}

impl std::fmt::Debug for NotificationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSession")
            .field("app_name", &self.app_name)
            .field("backend", &self.service.backend_name())
            .field("state", &self.state())
            .field("active", &self.shown.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Timeout;
    use crate::service::MemoryDeliveryService;

    async fn open_session() -> (Arc<MemoryDeliveryService>, NotificationSession) {
        let service = Arc::new(MemoryDeliveryService::default());
        let session = NotificationSession::init(service.clone(), "test-app")
            .await
            .unwrap();
        (service, session)
    }

    #[tokio::test]
    async fn test_empty_app_name_fails() {
        let service = Arc::new(MemoryDeliveryService::default());
        let err = NotificationSession::init(service.clone(), "").await.unwrap_err();
        assert!(matches!(err, NotifyError::Init(_)));
        assert!(!service.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_init() {
        let service = Arc::new(MemoryDeliveryService::default());
        service.set_reachable(false);
        let err = NotificationSession::init(service, "app").await.unwrap_err();
        assert!(matches!(err, NotifyError::Init(_)));
    }

    #[tokio::test]
    async fn test_show_and_close() {
        let (service, session) = open_session().await;
        let mut request = NotificationRequest::new("Title", "Body", None).unwrap();
        request.set_timeout(Timeout::Never);

        let id = session.show(&mut request).await.unwrap();
        assert_eq!(request.notification_id(), Some(id));
        assert_eq!(session.active_count(), 1);
        assert_eq!(service.displayed(id).unwrap().app_name, "test-app");

        session.close(&mut request).await.unwrap();
        assert!(matches!(request.state(), RequestState::Closed { .. }));
        assert_eq!(session.active_count(), 0);
        assert_eq!(session.closed_reason(&request).unwrap(), Some(CloseReason::Closed));
        assert_eq!(service.closed_count(), 0);
    }

    #[tokio::test]
    async fn test_show_twice_rejected() {
        let (_service, session) = open_session().await;
        let mut request = NotificationRequest::new("Title", "", None).unwrap();
        session.show(&mut request).await.unwrap();

        let err = session.show(&mut request).await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
        assert_eq!(session.stats().total_shown, 1);
    }

    #[tokio::test]
    async fn test_close_unshown_request_not_found() {
        let (_service, session) = open_session().await;
        let mut request = NotificationRequest::new("Title", "", None).unwrap();

        let err = session.close(&mut request).await.unwrap_err();
        assert!(matches!(err, NotifyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_double_close_is_noop() {
        let (_service, session) = open_session().await;
        let mut request = NotificationRequest::new("Title", "", None).unwrap();
        session.show(&mut request).await.unwrap();

        session.close(&mut request).await.unwrap();
        session.close(&mut request).await.unwrap();
        assert_eq!(session.stats().total_closed, 1);
    }

    #[tokio::test]
    async fn test_close_after_dismissal_not_found() {
        let (service, session) = open_session().await;
        let mut request = NotificationRequest::new("Title", "", None).unwrap();
        request.set_timeout(Timeout::Never);
        let id = session.show(&mut request).await.unwrap();

        assert!(service.dismiss(id));
        assert_eq!(
            session.closed_reason(&request).unwrap(),
            Some(CloseReason::Dismissed)
        );

        let err = session.close(&mut request).await.unwrap_err();
        assert!(matches!(err, NotifyError::NotFound(_)));
        assert_eq!(session.active_count(), 0);
    }

    #[tokio::test]
    async fn test_close_request_from_other_session_not_found() {
        let (_a_service, a) = open_session().await;
        let (_b_service, b) = open_session().await;
        let mut request = NotificationRequest::new("Title", "", None).unwrap();
        a.show(&mut request).await.unwrap();

        let err = b.close(&mut request).await.unwrap_err();
        assert!(matches!(err, NotifyError::NotFound(_)));
        a.close(&mut request).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_rejects_everything() {
        let (service, session) = open_session().await;
        let mut shown = NotificationRequest::new("Title", "", None).unwrap();
        session.show(&mut shown).await.unwrap();

        session.close_session();
        session.close_session();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!service.is_connected());

        let mut fresh = NotificationRequest::new("Title", "", None).unwrap();
        assert!(matches!(
            session.show(&mut fresh).await,
            Err(NotifyError::InvalidSession)
        ));
        assert!(matches!(
            session.close(&mut shown).await,
            Err(NotifyError::InvalidSession)
        ));
        assert!(matches!(
            session.server_information().await,
            Err(NotifyError::InvalidSession)
        ));
        assert!(matches!(
            session.capabilities().await,
            Err(NotifyError::InvalidSession)
        ));

        // Later service-side changes are not visible through a closed session
        assert!(service.dismiss(shown.notification_id().unwrap()));
        assert!(matches!(
            session.closed_reason(&shown),
            Err(NotifyError::InvalidSession)
        ));
        assert!(matches!(
            session.closed_reason(&fresh),
            Err(NotifyError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn test_sessions_sharing_a_service() {
        let service = Arc::new(MemoryDeliveryService::default());
        let a = NotificationSession::init(service.clone(), "first").await.unwrap();
        let b = NotificationSession::init(service.clone(), "second").await.unwrap();
        assert_eq!(service.connection_count(), 2);

        a.close_session();
        assert!(b.is_active());
        assert!(service.is_connected());

        let mut request = NotificationRequest::new("Title", "", None).unwrap();
        let id = b.show(&mut request).await.unwrap();
        assert_eq!(service.displayed(id).unwrap().app_name, "second");
        b.close(&mut request).await.unwrap();

        b.close_session();
        assert!(!service.is_connected());
    }

    #[tokio::test]
    async fn test_drop_closes_session() {
        let service = Arc::new(MemoryDeliveryService::default());
        {
            let _session = NotificationSession::init(service.clone(), "scoped")
                .await
                .unwrap();
            assert!(service.is_connected());
        }
        assert!(!service.is_connected());
    }

    #[tokio::test]
    async fn test_failed_show_counts_and_keeps_request() {
        let service = Arc::new(MemoryDeliveryService::with_max_title_length(3));
        let session = NotificationSession::init(service, "app").await.unwrap();
        let mut request = NotificationRequest::new("Too long", "", None).unwrap();

        let err = session.show(&mut request).await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
        assert!(request.is_constructed());
        assert_eq!(session.stats().total_failed, 1);
    }
}
