//! Tracing setup for binaries and demos embedding the crate

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` selects `swarm=debug` over
/// `swarm=info`. Calling this more than once, or after another subscriber was
/// installed, is a no-op.
pub fn init(debug: bool) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .try_init();
    });
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "swarm=debug"
    } else {
        "swarm=info"
    }
}
