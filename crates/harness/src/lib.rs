pub mod desk;
pub mod fleet;

pub use desk::{FailingLeaseCache, TestDesk};
pub use fleet::{TestFleet, WriteLock};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once. `RUST_LOG` overrides the
/// default `warn` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
