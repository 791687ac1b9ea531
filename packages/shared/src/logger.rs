//! Logger setup shared by the server and client binaries.

use tracing_subscriber::{
    EnvFilter,
    fmt::{format::Writer, time::FormatTime},
};

use crate::time::now_jst;

/// Renders log timestamps in JST.
struct JstTimer;

impl FormatTime for JstTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", now_jst().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Build the default filter directive for a binary.
///
/// `campus-notify-server` logs under the `campus_notify_server` target, so the
/// binary name is normalised before it is used as a directive.
fn default_directive(bin_name: &str, level: &str) -> String {
    format!(
        "{}={level},campus_notify_server={level},tower_http={level}",
        bin_name.replace('-', "_")
    )
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to the binary, the
/// server library and `tower_http`.
pub fn setup_logger(bin_name: &str, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(bin_name, level)));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(JstTimer)
        .with_target(true)
        .try_init();
}
