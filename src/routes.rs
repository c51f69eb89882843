use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::{CategoryCounts, ChartRenderer};
use crate::config::AppConfig;
use crate::data::{BatchSubmission, StudentRecord};
use crate::database::Database;
use crate::error::{AppError, ExportError, PredictionError, RenderError, StorageError, ValidationError};
use crate::export::Exporter;
use crate::pipeline::PredictionPipeline;
use crate::views;

/// Shared handles for the request handlers
pub struct AppState {
    pub db: Database,
    pub pipeline: PredictionPipeline,
    pub chart: Arc<ChartRenderer>,
    pub exporter: Arc<Exporter>,
    pub chart_url: String,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self, StorageError> {
        let db = Database::connect(&config.storage.database_url, config.storage.max_connections).await?;
        Ok(Self::with_database(db, config))
    }

    pub fn with_database(db: Database, config: &AppConfig) -> Self {
        Self {
            db,
            pipeline: PredictionPipeline::new(config.model.clone()),
            chart: Arc::new(ChartRenderer::new(config.output.chart_path(), &config.chart)),
            exporter: Arc::new(Exporter::new(config.output.export_path())),
            chart_url: format!("/static/{}", config.output.chart_file),
        }
    }
}

#[derive(Serialize)]
struct PredictResponse {
    records: Vec<StudentRecord>,
    categories: CategoryCounts,
    chart_url: String,
}

/// Predict, store and chart one batch.
async fn process_batch(
    state: &AppState,
    batch: BatchSubmission,
) -> Result<(Vec<StudentRecord>, CategoryCounts), AppError> {
    info!(students = batch.len(), "processing batch");

    let pipeline = state.pipeline.clone();
    let scored = web::block(move || pipeline.run(&batch))
        .await
        .map_err(|_| PredictionError::Cancelled)??;

    let stored = state.db.insert_batch(scored).await?;

    let marks: Vec<f64> = stored.iter().map(|r| r.predicted_mark).collect();
    let chart = Arc::clone(&state.chart);
    let summary = web::block(move || chart.render(&marks))
        .await
        .map_err(|_| RenderError::Cancelled)??;

    Ok((stored, summary.counts))
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(views::index_page())
}

async fn predict(
    state: web::Data<AppState>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, AppError> {
    let batch = BatchSubmission::from_form(&form)?;
    let (records, counts) = process_batch(&state, batch).await?;

    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(views::result_page(&records, &counts, &state.chart_url)))
}

async fn api_predict(
    state: web::Data<AppState>,
    web::Json(payload): web::Json<BatchSubmission>,
) -> Result<HttpResponse, AppError> {
    let batch = BatchSubmission::new(payload.students)?;
    let (records, categories) = process_batch(&state, batch).await?;

    Ok(HttpResponse::Ok().json(PredictResponse {
        records,
        categories,
        chart_url: state.chart_url.clone(),
    }))
}

async fn view(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let records = state.db.list_all().await?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(views::view_page(&records)))
}

async fn api_records(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let records = state.db.list_all().await?;
    Ok(HttpResponse::Ok().json(records))
}

async fn delete(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let removed = state.db.delete_by_id(id).await?;
    info!(id, removed, "delete requested");

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, "/view"))
        .finish())
}

async fn download(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let records = state.db.export_all().await?;
    let exporter = Arc::clone(&state.exporter);
    let file_name = exporter.file_name();

    let bytes = web::block(move || exporter.write_records(&records))
        .await
        .map_err(|_| ExportError::Cancelled)??;

    Ok(HttpResponse::Ok()
        .content_type(XLSX_CONTENT_TYPE)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file_name)],
        })
        .body(bytes))
}

async fn chart_image(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    match tokio::fs::read(state.chart.path()).await {
        Ok(bytes) => Ok(HttpResponse::Ok().content_type("image/png").body(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Err(RenderError::Io(e).into()),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Student Mark Predictor is running!")
}

const FORM_LIMIT: usize = 1 << 20;
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Extractor failures (bad encoding, wrong content type, oversized or
/// mistyped bodies) surface as validation errors like any other bad input.
fn malformed_body(err: impl std::fmt::Display) -> actix_web::Error {
    warn!(error = %err, "rejected request body");
    AppError::from(ValidationError::MalformedBody(err.to_string())).into()
}

/// Route table, shared by the server and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig, chart_url: &str) {
    cfg.app_data(
        web::FormConfig::default()
            .limit(FORM_LIMIT)
            .error_handler(|err, _req| malformed_body(err)),
    )
    .app_data(
        web::JsonConfig::default()
            .limit(FORM_LIMIT)
            .error_handler(|err, _req| malformed_body(err)),
    )
    .route("/", web::get().to(index))
    .route("/predict", web::post().to(predict))
    .route("/view", web::get().to(view))
    .route("/delete/{id}", web::get().to(delete))
    .route("/download", web::get().to(download))
    .route(chart_url, web::get().to(chart_image))
    .route("/api/predict", web::post().to(api_predict))
    .route("/api/records", web::get().to(api_records))
    .route("/health", web::get().to(health_check));
}
