//! The single-notification workflow run by the `ara-notify` binary:
//! open a session, show one notification, keep it up for a while, withdraw
//! it and close the session.

use std::sync::Arc;
use std::time::Duration;

use config::ConfigError;

use crate::config::Settings;
use crate::error::{NotifyError, Result, EXIT_SUCCESS};
use crate::notification::{NotificationId, NotificationRequest, Timeout};
use crate::service::{create_delivery_service, DeliveryService};
use crate::session::NotificationSession;
use crate::telemetry::init_telemetry;

/// What a successful run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub notification_id: NotificationId,
}

/// Build the request described by `settings.notification`
pub fn build_request(settings: &Settings) -> Result<NotificationRequest> {
    let config = &settings.notification;
    let mut request =
        NotificationRequest::new(config.title.as_str(), config.body.as_str(), config.icon.as_deref())?;
    request.set_timeout(Timeout::from_config(config.timeout_ms));
    request.set_urgency(config.urgency);
    if let Some(category) = config.category.as_deref() {
        request.set_category(category);
    }
    Ok(request)
}

/// The whole program: settings, tracing, workflow. Returns the process exit code.
pub async fn launch(loaded: std::result::Result<Settings, ConfigError>) -> u8 {
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            let err = NotifyError::from(e);
            eprintln!("{}", err);
            return err.exit_code();
        }
    };

    if let Err(e) = init_telemetry(&settings.logging) {
        eprintln!("{}", e);
    }
    tracing::info!(backend = %settings.service.backend, "Configuration loaded");

    exit_code(&settings).await
}

/// Run the workflow and map the outcome to an exit code
pub async fn exit_code(settings: &Settings) -> u8 {
    exit_code_with_service(create_delivery_service(&settings.service), settings).await
}

pub async fn exit_code_with_service(service: Arc<dyn DeliveryService>, settings: &Settings) -> u8 {
    match run_with_service(service, settings).await {
        Ok(outcome) => {
            tracing::info!(
                notification_id = %outcome.notification_id,
                "Notification delivered and withdrawn"
            );
            EXIT_SUCCESS
        }
        Err(e) => {
            e.log();
            e.exit_code()
        }
    }
}

/// Run the workflow against the backend named in configuration
pub async fn run(settings: &Settings) -> Result<RunOutcome> {
    run_with_service(create_delivery_service(&settings.service), settings).await
}

/// Run the workflow against an explicit delivery service.
///
/// The request is built before the session is opened so that an invalid
/// request never touches the service. The session is closed on every path.
#[tracing::instrument(name = "runner.run", skip_all, fields(app_name = %settings.app.name))]
pub async fn run_with_service(
    service: Arc<dyn DeliveryService>,
    settings: &Settings,
) -> Result<RunOutcome> {
    let mut request = build_request(settings)?;
    let session = NotificationSession::init(service, &settings.app.name).await?;

    let notification_id = session.show(&mut request).await?;
    tracing::info!(
        notification_id = %notification_id,
        display_ms = settings.notification.display_ms,
        "Notification displayed"
    );

    if settings.notification.display_ms > 0 {
        tokio::time::sleep(Duration::from_millis(settings.notification.display_ms)).await;
    }

    session.close(&mut request).await?;
    session.close_session();

    Ok(RunOutcome { notification_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Urgency;

    #[test]
    fn test_build_request_from_defaults() {
        let request = build_request(&Settings::default()).unwrap();
        assert_eq!(request.title(), "Hello World!");
        assert_eq!(request.body(), "This is an example notification.");
        assert_eq!(request.icon(), None);
        assert_eq!(request.timeout(), Timeout::Millis(3000));
        assert_eq!(request.urgency(), Urgency::Normal);
    }

    #[test]
    fn test_build_request_with_hints() {
        let mut settings = Settings::default();
        settings.notification.urgency = Urgency::Critical;
        settings.notification.category = Some("transfer.complete".to_string());
        settings.notification.timeout_ms = -1;

        let request = build_request(&settings).unwrap();
        assert_eq!(request.urgency(), Urgency::Critical);
        assert_eq!(request.category(), Some("transfer.complete"));
        assert_eq!(request.timeout(), Timeout::Default);
    }
}
