//! Subscriber setup for binaries and demos
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. `RUST_LOG` overrides the default filter.

use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("fingerlink=debug,fingerlink_transport=debug,info")
        } else {
            EnvFilter::new("fingerlink=info,warn")
        }
    })
}

fn compact_subscriber(verbose: bool) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(default_filter(verbose)).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .compact(),
    )
}

fn json_subscriber() -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(default_filter(false)).with(
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .json()
            .with_current_span(false),
    )
}

/// Human-readable output on stderr
pub fn init(verbose: bool) {
    compact_subscriber(verbose).init();
}

/// One JSON object per event, for log collectors
pub fn init_json() {
    json_subscriber().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_accept_events() {
        tracing::subscriber::with_default(compact_subscriber(true), || {
            tracing::debug!(command = "PING", "compact event");
        });

        tracing::subscriber::with_default(json_subscriber(), || {
            let span = tracing::info_span!("enroll");
            let _guard = span.enter();
            tracing::info!(count = 3, "json event");
        });
    }
}
