use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::error::Result;
use crate::infrastructure::config::AppConfig;

pub async fn run() -> Result<()> {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();

    let config = AppConfig::load()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!(
        host = %config.server.host,
        port = config.server.port,
        db_path = %config.database.path.display(),
        "Starting Zenit tracker"
    );

    crate::infrastructure::bootstrap::serve(config)
        .await
        .map_err(|err| {
            error!(error = %err, "Zenit tracker stopped");
            err
        })
}
