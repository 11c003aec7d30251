use jsengine::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Output goes to stderr so stdout stays parseable.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target)
        .with_file(config.show_file)
        .with_line_number(config.show_line)
        .with_thread_ids(false);

    // Use Layer::boxed() to unify the types of the four branches
    let fmt_layer = match (config.json, config.show_time) {
        (true, true) => base.json().boxed(),
        (true, false) => base.json().without_time().boxed(),
        (false, true) => base.boxed(),
        (false, false) => base.without_time().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
