use serde::Deserialize;
use std::path::PathBuf;

use crate::model::GradientBoostingParams;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "MARK_PREDICTOR_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "mark_predictor";
const ENV_PREFIX: &str = "MARK_PREDICTOR";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
    pub chart: ChartConfig,
    #[serde(default)]
    pub model: GradientBoostingParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Raises the log level to DEBUG
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub static_dir: PathBuf,
    pub chart_file: String,
    pub export_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
    pub font_path: Option<PathBuf>,
}

impl OutputConfig {
    pub fn chart_path(&self) -> PathBuf {
        self.static_dir.join(&self.chart_file)
    }

    pub fn export_path(&self) -> PathBuf {
        self.static_dir.join(&self.export_file)
    }
}

impl AppConfig {
    /// Load defaults, then the optional config file, then `MARK_PREDICTOR__*` env overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let file = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Self::builder()?
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only, no file or environment lookup.
    pub fn defaults() -> Result<Self, config::ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000)?
            .set_default("server.debug", false)?
            .set_default("storage.database_url", "sqlite://students.db")?
            .set_default("storage.max_connections", 4)?
            .set_default("output.static_dir", "static")?
            .set_default("output.chart_file", "performance_pie_chart.png")?
            .set_default("output.export_file", "student_records.xlsx")?
            .set_default("chart.width", 600)?
            .set_default("chart.height", 600)?
            .set_default("chart.font_path", "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf")
    }
}
