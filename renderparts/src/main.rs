use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    renderparts_lib::run().await
}
