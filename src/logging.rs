use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ACADEMIC_RECORD_LOG";

/// Installs the stderr subscriber; stdout is reserved for command output.
///
/// Filtering follows `ACADEMIC_RECORD_LOG` and falls back to `warn`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
