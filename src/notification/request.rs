use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{NotifyError, Result};

use super::types::{NotificationId, Timeout, Urgency};

/// Lifecycle of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Built and configurable, not yet submitted
    Constructed,
    /// Accepted by the delivery service
    Shown {
        notification_id: NotificationId,
        shown_at: DateTime<Utc>,
    },
    /// Withdrawn through a close call
    Closed { notification_id: NotificationId },
}

/// One notification's content plus its display parameters.
///
/// Owned by the caller. Content and display parameters can only change
/// while the request is still `Constructed`.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    id: Uuid,
    title: String,
    body: String,
    icon: Option<String>,
    timeout: Timeout,
    urgency: Urgency,
    category: Option<String>,
    state: RequestState,
}

impl NotificationRequest {
    /// Create a request. The title must not be empty; the body may be.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        icon: Option<&str>,
    ) -> Result<Self> {
        let title = title.into();
        if title.is_empty() {
            return Err(NotifyError::Construction(
                "title must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            title,
            body: body.into(),
            icon: icon.filter(|i| !i.is_empty()).map(str::to_string),
            timeout: Timeout::default(),
            urgency: Urgency::default(),
            category: None,
            state: RequestState::Constructed,
        })
    }

    /// Client-local identifier of this request
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn urgency(&self) -> Urgency {
        self.urgency
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Server-assigned id once the request has been shown
    pub fn notification_id(&self) -> Option<NotificationId> {
        match self.state {
            RequestState::Constructed => None,
            RequestState::Shown { notification_id, .. }
            | RequestState::Closed { notification_id } => Some(notification_id),
        }
    }

    pub fn is_constructed(&self) -> bool {
        matches!(self.state, RequestState::Constructed)
    }

    /// Set the display timeout. Ignored once the request has been submitted.
    pub fn set_timeout(&mut self, timeout: Timeout) {
        if self.guard_mutation("timeout") {
            self.timeout = timeout;
        }
    }

    /// Set the urgency hint. Ignored once the request has been submitted.
    pub fn set_urgency(&mut self, urgency: Urgency) {
        if self.guard_mutation("urgency") {
            self.urgency = urgency;
        }
    }

    /// Set the category hint. Ignored once the request has been submitted.
    pub fn set_category(&mut self, category: impl Into<String>) {
        if self.guard_mutation("category") {
            let category = category.into();
            self.category = (!category.is_empty()).then_some(category);
        }
    }

    pub(crate) fn mark_shown(&mut self, notification_id: NotificationId) {
        self.state = RequestState::Shown {
            notification_id,
            shown_at: Utc::now(),
        };
    }

    pub(crate) fn mark_closed(&mut self, notification_id: NotificationId) {
        self.state = RequestState::Closed { notification_id };
    }

    fn guard_mutation(&self, field: &str) -> bool {
        if self.is_constructed() {
            return true;
        }
        tracing::warn!(
            request_id = %self.id,
            field = %field,
            "Ignoring change to a request that was already submitted"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_title_rejected() {
        let err = NotificationRequest::new("", "body", None).unwrap_err();
        assert!(matches!(err, NotifyError::Construction(_)));
    }

    #[test]
    fn test_empty_body_accepted() {
        let request = NotificationRequest::new("Title", "", None).unwrap();
        assert_eq!(request.title(), "Title");
        assert_eq!(request.body(), "");
        assert_eq!(request.icon(), None);
        assert_eq!(request.timeout(), Timeout::Default);
        assert!(request.is_constructed());
        assert!(request.notification_id().is_none());
    }

    #[test]
    fn test_empty_icon_treated_as_absent() {
        let request = NotificationRequest::new("Title", "", Some("")).unwrap();
        assert_eq!(request.icon(), None);

        let request = NotificationRequest::new("Title", "", Some("dialog-information")).unwrap();
        assert_eq!(request.icon(), Some("dialog-information"));
    }

    #[test]
    fn test_setters_before_submission() {
        let mut request = NotificationRequest::new("Title", "Body", None).unwrap();
        request.set_timeout(Timeout::from_millis(3000));
        request.set_urgency(Urgency::Critical);
        request.set_category("im.received");

        assert_eq!(request.timeout(), Timeout::Millis(3000));
        assert_eq!(request.urgency(), Urgency::Critical);
        assert_eq!(request.category(), Some("im.received"));
    }

    #[test]
    fn test_setters_ignored_after_submission() {
        let mut request = NotificationRequest::new("Title", "Body", None).unwrap();
        request.set_timeout(Timeout::from_millis(3000));

        let id = NotificationId::new(5).unwrap();
        request.mark_shown(id);
        request.set_timeout(Timeout::Never);
        request.set_urgency(Urgency::Low);

        assert_eq!(request.timeout(), Timeout::Millis(3000));
        assert_eq!(request.urgency(), Urgency::Normal);
        assert_eq!(request.notification_id(), Some(id));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = NotificationRequest::new("A", "", None).unwrap();
        let b = NotificationRequest::new("A", "", None).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
