use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber for the embedding host. Safe to call twice.
pub fn init_tracing() {
    // RUST_LOG=debloat_bridge=debug,debloat_core=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .compact()
        .try_init();
}
