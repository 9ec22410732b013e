//! Log capture for tests.

use tracing_subscriber::EnvFilter;

/// Filter directives applied when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVES: &str = "warn,ingest_server=debug,ingest_service=debug,tower_http=debug";

/// Routes logs into the output captured by the test harness.
///
/// Logs are only printed for failing tests. `RUST_LOG` replaces the default filter. Every test may
/// call this; only the first call installs the subscriber.
///
/// ```
/// ingest_test::tracing::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .try_init()
        .ok();
}
