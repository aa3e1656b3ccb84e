use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Level for a CLI verbosity count: quiet is errors only, the default is
/// warnings, and each `-v` opens one more level.
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global fmt subscriber. `RUST_LOG`, when set, takes
/// precedence over the verbosity flags. Calling it twice is harmless.
pub fn init(verbosity: u8, quiet: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_for(verbosity, quiet).into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
