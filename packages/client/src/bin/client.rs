//! Notification hub listener.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin campus-notify-client -- --college-id 5 --user-id 1 --identity alice@example.edu
//! ```

use campus_notify_client::{ClientArgs, run_client};
use campus_notify_shared::logger::setup_logger;
use clap::Parser;

#[tokio::main]
async fn main() {
    let args = ClientArgs::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    if let Err(e) = run_client(args).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
