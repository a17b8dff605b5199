//! Log output for drivers embedding the linker.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber. `RUST_LOG` takes precedence; without
/// it, `verbose` selects `debug` over `info`.
///
/// Returns false if a global subscriber was already installed.
pub fn init(verbose: bool) -> bool {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .try_init()
        .is_ok()
}
