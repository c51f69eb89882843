//! Student Mark Predictor
//!
//! Collects per-student exam scores in batches, fits a boosted-tree
//! regressor on each batch to derive a predicted mark, stores the rows in
//! SQLite, draws a performance pie chart and exports the table as an xlsx workbook.

pub mod analytics;
pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod routes;
pub mod views;

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::routes::AppState;

/// Install the global tracing subscriber. `RUST_LOG` wins over the debug flag.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Open the record store and serve until the server is stopped.
pub async fn run(config: AppConfig) -> std::io::Result<()> {
    let state = AppState::new(&config)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let db = state.db.clone();
    let chart_url = state.chart_url.clone();
    let state = web::Data::new(state);

    info!(
        "Starting Student Mark Predictor on http://{}:{}",
        config.server.host, config.server.port
    );

    HttpServer::new(move || {
        let chart_url = chart_url.clone();
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(move |cfg| routes::configure(cfg, &chart_url))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    db.close().await;
    info!("server stopped");
    Ok(())
}
