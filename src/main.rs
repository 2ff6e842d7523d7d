use std::process::ExitCode;

use ara_notify_client::config::Settings;
use ara_notify_client::runner;

#[tokio::main]
async fn main() -> ExitCode {
    ExitCode::from(runner::launch(Settings::new()).await)
}
