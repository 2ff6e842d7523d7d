//! Notification requests and the values exchanged with the delivery service.

mod request;
mod types;

pub use request::{NotificationRequest, RequestState};
pub use types::{CloseReason, NotificationId, ServerInformation, Timeout, Urgency};
