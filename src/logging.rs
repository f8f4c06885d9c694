use tracing_subscriber::EnvFilter;

pub(crate) fn default_filter(verbose: bool) -> &'static str {
    if verbose { "deskmate=debug,warn" } else { "warn" }
}

/// Diagnostics go to stderr; stdout is the conversation transcript.
/// `RUST_LOG` wins over `-v` when set.
pub(crate) fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
