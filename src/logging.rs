use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber for the binaries. Logs go to stderr so stdout
/// carries only the printed result. `RUST_LOG` overrides the `info` default.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
