use std::sync::OnceLock;

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "GEMINI_UPLOADER_LOG";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

fn build_env_filter_from(app_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    let default = || EnvFilter::new("info");

    if let Some(v) = app_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    if let Some(v) = rust_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    default()
}

fn build_env_filter() -> EnvFilter {
    build_env_filter_from(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    )
}

/// Installs the global subscriber on stderr. Later calls are no-ops.
pub fn init_logging(json: bool) {
    TRACING_INIT.get_or_init(|| {
        let registry = tracing_subscriber::registry().with(build_env_filter());

        if json {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr);
            let _ = registry.with(layer).try_init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr);
            let _ = registry.with(layer).try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_precedence_is_app_then_rust_log_then_default() {
        let f1 = build_env_filter_from(Some("debug"), Some("warn"));
        let f2 = build_env_filter_from(None, Some("warn"));
        let f3 = build_env_filter_from(None, None);

        assert_eq!(f1.to_string(), "debug");
        assert_eq!(f2.to_string(), "warn");
        assert_eq!(f3.to_string(), "info");
    }

    #[test]
    fn invalid_directive_falls_back_to_default() {
        let f = build_env_filter_from(Some("uploader=notalevel"), None);
        assert_eq!(f.to_string(), "info");
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(true);
        init_logging(false);
        tracing::info!(event = "logging.ready", "logging.ready");
    }
}
