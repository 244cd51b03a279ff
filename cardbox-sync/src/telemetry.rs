//! Tracing setup.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize the global tracing subscriber. Safe to call more than
/// once; only the first call installs anything.
///
/// The filter comes from `RUST_LOG`, defaulting to `info` for this
/// workspace's crates.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("cardbox_sync=info,cardbox_store=info,cardbox_core=info")
        });
        // try_init: a test harness may have installed a subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
