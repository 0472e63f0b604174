pub mod catalog;
pub mod dataset;
pub mod processor;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod fixtures;

use common::Result;
use common::config::Settings;
use services::{PipelineService, RunReport};
use std::sync::Arc;
use storage::{SqliteSink, SqliteSource};
use tracing::{info, warn};

fn warn_on_credentials(settings: &Settings) {
    if settings.source.user.is_some() || settings.source.password.is_some() {
        warn!("Source credentials are configured but ignored by the SQLite store");
    }
    if settings.sink.user.is_some() || settings.sink.password.is_some() {
        warn!("Sink credentials are configured but ignored by the SQLite store");
    }
}

/// Runs the complete weekly sales pipeline: source tables to the sales mart.
pub async fn run_sales_pipeline(config_path: &str) -> Result<RunReport> {
    let settings = Settings::new(config_path)?;
    warn_on_credentials(&settings);
    info!(
        source = %settings.source.endpoint,
        sink = %settings.sink.endpoint,
        table = %settings.sink.table,
        "Loaded pipeline configuration"
    );

    let source = SqliteSource::open(&settings.source.endpoint).await?;
    let sink = SqliteSink::open(&settings.sink.endpoint).await?;

    PipelineService::new(settings, Arc::new(source))?
        .with_sink(Arc::new(sink))
        .run()
        .await
}

/// Loads the source tables and runs the fact quality checks only.
pub async fn run_validation(config_path: &str) -> Result<RunReport> {
    let settings = Settings::new(config_path)?;
    warn_on_credentials(&settings);

    let source = SqliteSource::open(&settings.source.endpoint).await?;

    PipelineService::new(settings, Arc::new(source))?
        .validate_only()
        .await
}
