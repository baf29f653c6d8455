/// Process-wide logging initialization.
///
/// Installs a `tracing-subscriber` registry with an env filter, a stderr layer
/// and a file layer appending to `<data_dir>/hearth.log`, so logs stay
/// retrievable from the app data dir even when the host hides stderr.
///
/// Called once at the start of `FfiApp::new()`. Later calls are no-ops.
pub fn init_logging(data_dir: &str, configured_filter: Option<&str>) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            configured_filter
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .and_then(|f| tracing_subscriber::EnvFilter::try_new(f).ok())
        })
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));

    let log_path = std::path::Path::new(data_dir).join("hearth.log");
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
        });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}

const DEFAULT_FILTER: &str = "hearth_core=debug,hearth_memory_store=info,info";
