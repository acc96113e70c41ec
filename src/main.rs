use dynatrace_datasource::{
    api,
    config::{DatasourceSettings, ServerConfig},
    logging, metrics, Datasource,
};
use tracing::error;

#[tokio::main]
async fn main() {
    // Initialize logging
    logging::init_logger();

    // Initialize metrics
    metrics::init_metrics();

    if let Err(e) = run().await {
        error!("Datasource server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> dynatrace_datasource::Result<()> {
    let server = ServerConfig::from_env()?;
    let settings = DatasourceSettings::from_env()?;
    let datasource = Datasource::new(settings)?;

    api::start_server(&server, datasource).await
}
