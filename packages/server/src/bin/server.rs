//! Notification hub server.
//!
//! Accepts WebSocket connections at `/ws` and pushes notifications, typing
//! indicators and presence changes to connected users of each college.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin campus-notify-server -- --port 8080
//! ```

use campus_notify_server::ServerArgs;
use campus_notify_shared::logger::setup_logger;
use clap::Parser;

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    // Run the server
    if let Err(e) = campus_notify_server::run(args).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
