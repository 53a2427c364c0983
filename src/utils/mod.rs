pub mod paths;

use std::sync::Once;

use tracing_subscriber::{filter::Directive, fmt, EnvFilter};

static TRACING_INIT: Once = Once::new();

pub const DEFAULT_LOG_DIRECTIVE: &str = "biweekly_ledger=info";

/// Installs the global fmt subscriber once. `RUST_LOG` is honoured and the
/// given directive (or the crate default) is layered on top of it.
pub fn init_tracing(directive: Option<&str>) {
    TRACING_INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        for raw in [DEFAULT_LOG_DIRECTIVE].into_iter().chain(directive) {
            match raw.parse::<Directive>() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(err) => eprintln!("ignoring invalid log directive `{raw}`: {err}"),
            }
        }
        // Another subscriber may already be installed by the host application.
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
