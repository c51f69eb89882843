//! Error types for the mark predictor.
//!
//! Each stage of the submission flow has its own error kind. `AppError`
//! wraps them at the HTTP boundary and maps every kind to its own status
//! code without exposing internal detail to the client.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Malformed or missing submission fields
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing form field `{0}`")]
    MissingField(String),
    #[error("field `{field}` is not an integer: {value:?}")]
    NotAnInteger { field: String, value: String },
    #[error("batch contains no students")]
    EmptyBatch,
    #[error("request body could not be decoded: {0}")]
    MalformedBody(String),
}

/// Estimator fit/predict failures
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("cannot fit an estimator on an empty batch")]
    EmptyBatch,
    #[error("feature matrix contains non-finite values")]
    NonFinite,
    #[error("feature/target length mismatch: {features} rows vs {targets} targets")]
    LengthMismatch { features: usize, targets: usize },
    #[error("invalid feature matrix shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("linfa error: {0}")]
    Linfa(#[from] linfa::Error),
    #[error("prediction task was cancelled")]
    Cancelled,
}

/// Record store failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Chart rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot prepare chart directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot write chart image: {0}")]
    Image(#[from] image::ImageError),
    #[error("chart writer lock poisoned")]
    LockPoisoned,
    #[error("chart task was cancelled")]
    Cancelled,
}

/// Spreadsheet export failures
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write export file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot build workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
    #[error("cannot read workbook: {0}")]
    Read(#[from] calamine::XlsxError),
    #[error("workbook has no worksheet")]
    MissingSheet,
    #[error("unexpected header row: {0:?}")]
    Header(Vec<String>),
    #[error("row {row}: column `{column}` has an unexpected value")]
    Cell { row: usize, column: &'static str },
    #[error("export writer lock poisoned")]
    LockPoisoned,
    #[error("export task was cancelled")]
    Cancelled,
}

/// Request-level error returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Prediction(_) => "prediction_error",
            AppError::Storage(_) => "storage_error",
            AppError::Render(_) => "render_error",
            AppError::Export(_) => "export_error",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "The submitted form is missing fields or has non-numeric scores.",
            AppError::Prediction(_) => "Predicted marks could not be computed for this batch.",
            AppError::Storage(_) => "The record store is unavailable.",
            AppError::Render(_) => "The performance chart could not be written.",
            AppError::Export(_) => "The spreadsheet export could not be written.",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Prediction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Export(_) => StatusCode::INSUFFICIENT_STORAGE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        tracing::error!(kind = self.kind(), error = %self, "request failed");
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message: self.public_message(),
        })
    }
}
