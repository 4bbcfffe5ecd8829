use env_logger::Env;

/// Install the `env_logger` backend. `RUST_LOG` wins over the default
/// `stitch=info`; calling this twice is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("stitch=info"))
        .format_timestamp_millis()
        .try_init();
}
