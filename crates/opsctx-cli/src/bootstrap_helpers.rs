use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber. `RUST_LOG` still wins when set.
pub fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level(verbose).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    }
}
