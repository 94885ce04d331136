use log_shipper::app;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    app::main().await
}
