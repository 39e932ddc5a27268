//! Global `tracing` subscriber installation.

use tracing_subscriber::EnvFilter;

pub fn init(dev: bool) {
    let default_level = if dev { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if dev {
        builder.pretty().with_ansi(true).init();
    } else {
        builder.compact().with_ansi(false).init();
    }
}
