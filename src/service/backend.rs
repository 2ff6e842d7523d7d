//! Backend trait for the notification-delivery service.
//!
//! The client never talks to a notification daemon directly; it goes through
//! a `DeliveryService` so the real D-Bus transport and the in-process memory
//! service can be used interchangeably.

use async_trait::async_trait;

use crate::error::Result;
use crate::notification::{
    CloseReason, NotificationId, NotificationRequest, ServerInformation, Urgency,
};

/// Everything the service needs to display one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundNotification {
    pub app_name: String,
    pub title: String,
    pub body: String,
    /// Icon name or URI; empty when the request has none
    pub icon: String,
    pub urgency: Urgency,
    pub category: Option<String>,
    /// -1 for the server default, 0 for never, otherwise milliseconds
    pub expire_timeout: i32,
}

impl OutboundNotification {
    pub fn from_request(app_name: &str, request: &NotificationRequest) -> Self {
        Self {
            app_name: app_name.to_string(),
            title: request.title().to_string(),
            body: request.body().to_string(),
            icon: request.icon().unwrap_or_default().to_string(),
            urgency: request.urgency(),
            category: request.category().map(str::to_string),
            expire_timeout: request.timeout().as_wire(),
        }
    }
}

/// Backend trait for notification delivery.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a session holds its service behind
/// an `Arc` and may be shared across tasks.
///
/// # Errors
///
/// - `connect` fails with `NotifyError::Init`
/// - `close_notification` fails with `NotifyError::NotFound` when the service
///   no longer knows the id
/// - every other failure is `NotifyError::Delivery`
///
/// # Sharing
///
/// One service may back several sessions. Each successful `connect` must be
/// paired with one `disconnect`.
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// Establish the transport for the given application
    async fn connect(&self, app_name: &str) -> Result<()>;

    /// Display a notification and return the id the service assigned
    async fn notify(&self, notification: &OutboundNotification) -> Result<NotificationId>;

    /// Withdraw a displayed notification
    async fn close_notification(&self, id: NotificationId) -> Result<()>;

    /// Why a notification went away, if the service has reported it.
    ///
    /// Only ids returned by this service's `notify` are ever reported.
    fn closed_reason(&self, id: NotificationId) -> Option<CloseReason>;

    /// Drop the bookkeeping kept for a notification the client is done with
    fn forget(&self, id: NotificationId);

    async fn server_information(&self) -> Result<ServerInformation>;

    async fn capabilities(&self) -> Result<Vec<String>>;

    /// Release one `connect`. The transport is torn down when the last
    /// connection is released; extra calls are no-ops.
    fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Timeout;

    #[test]
    fn test_outbound_from_request() {
        let mut request =
            NotificationRequest::new("Hello World!", "This is an example notification.", None)
                .unwrap();
        request.set_timeout(Timeout::from_millis(3000));
        request.set_category("device");

        let outbound = OutboundNotification::from_request("Hello World!", &request);
        assert_eq!(outbound.app_name, "Hello World!");
        assert_eq!(outbound.title, "Hello World!");
        assert_eq!(outbound.icon, "");
        assert_eq!(outbound.urgency, Urgency::Normal);
        assert_eq!(outbound.category.as_deref(), Some("device"));
        assert_eq!(outbound.expire_timeout, 3000);
    }
}
