use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Sets up the logging subscriber for the application.
///
/// `RUST_LOG` wins when set; otherwise this crate logs at INFO. Set
/// `LOG_FORMAT=json` for one JSON object per line.
pub fn init_logger() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={},tower_http={}",
            env!("CARGO_CRATE_NAME"),
            Level::INFO,
            Level::INFO
        ))
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .compact(),
            )
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Failed to initialize logger: {}", e);
    }
}
