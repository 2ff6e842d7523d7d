use thiserror::Error;

/// Process exit code for a successful run.
pub const EXIT_SUCCESS: u8 = 0;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Session init failed: {0}")]
    Init(String),

    #[error("Invalid notification: {0}")]
    Construction(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Session is closed")]
    InvalidSession,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl NotifyError {
    /// Stable machine-readable code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            NotifyError::Init(_) => "INIT_ERROR",
            NotifyError::Construction(_) => "CONSTRUCTION_ERROR",
            NotifyError::Delivery(_) => "DELIVERY_ERROR",
            NotifyError::NotFound(_) => "NOT_FOUND",
            NotifyError::InvalidSession => "INVALID_SESSION",
            NotifyError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Process exit code for this failure class.
    ///
    /// Construction and delivery keep the codes of the classic libnotify
    /// example (1 and 3) so scripts can tell them apart.
    pub fn exit_code(&self) -> u8 {
        match self {
            NotifyError::Construction(_) => 1,
            NotifyError::Init(_) => 2,
            NotifyError::Delivery(_) => 3,
            NotifyError::NotFound(_) => 4,
            NotifyError::InvalidSession => 5,
            NotifyError::Config(_) => 6,
        }
    }

    /// Log this error with its code, as the binary does before exiting.
    pub fn log(&self) {
        tracing::error!(
            code = %self.code(),
            exit_code = self.exit_code(),
            message = %self,
            "Notification error"
        );
    }
}

impl From<zbus::Error> for NotifyError {
    fn from(err: zbus::Error) -> Self {
        NotifyError::Delivery(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
