use mark_predictor::config::AppConfig;
use std::error::Error;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    mark_predictor::init_logging(config.server.debug);

    tracing::info!(
        database = %config.storage.database_url,
        static_dir = %config.output.static_dir.display(),
        "configuration loaded"
    );

    mark_predictor::run(config).await?;
    Ok(())
}
