//! Desktop notification client.
//!
//! Opens a session with a notification-delivery service, submits
//! notification requests, withdraws them and tears the session down:
//!
//! ```rust,ignore
//! let session = NotificationSession::init(create_delivery_service(&settings.service), "Hello World!").await?;
//! let mut hello = NotificationRequest::new("Hello World!", "This is an example notification.", None)?;
//! hello.set_timeout(Timeout::from_millis(3000));
//! session.show(&mut hello).await?;
//! session.close(&mut hello).await?;
//! session.close_session();
//! ```

// Infrastructure
pub mod config;
pub mod error;
pub mod telemetry;

// Client
pub mod notification;
pub mod service;
pub mod session;

// Application
pub mod runner;

pub use error::{NotifyError, Result};
pub use notification::{CloseReason, NotificationId, NotificationRequest, Timeout, Urgency};
pub use session::{NotificationSession, SessionState};
