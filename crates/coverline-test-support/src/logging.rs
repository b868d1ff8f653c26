//! Test logging: routes `tracing` output through the test harness.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// The filter comes from `RUST_LOG` and defaults to `debug`.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}
