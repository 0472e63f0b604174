use crate::catalog::{FACT_TRANSACTIONS, HIER_POSSITE, HIER_PROD, TableCatalog};
use crate::dataset::Dataset;
use crate::processor::{
    CheckResult, Curation, CurationCounts, Dimensions, PublishResult, SalesMartProcessor, SinkPublisher,
    StagedTables, StagingWriter, ValidationPolicy,
};
use crate::storage::{SinkStore, SourceStore};
use chrono::{DateTime, Utc};
use common::config::Settings;
use common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

/// Summary of one pipeline run, printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Rows loaded per source table.
    pub loaded: BTreeMap<String, usize>,
    pub checks: Vec<CheckResult>,
    pub dimensions: Vec<DimensionSummary>,
    pub curation: Option<CurationCounts>,
    /// Rows written per staging table; empty when staging is disabled.
    pub staging: BTreeMap<String, u64>,
    pub aggregate_rows: Option<usize>,
    pub published: Option<PublishResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionSummary {
    pub name: String,
    pub rows: usize,
    pub conflicting_keys: Vec<Option<i64>>,
}

impl RunReport {
    fn begin() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            loaded: BTreeMap::new(),
            checks: Vec::new(),
            dimensions: Vec::new(),
            curation: None,
            staging: BTreeMap::new(),
            aggregate_rows: None,
            published: None,
        }
    }

    fn record_dimensions(&mut self, dimensions: &Dimensions) {
        self.dimensions = dimensions
            .iter()
            .map(|d| DimensionSummary {
                name: d.spec().name.to_string(),
                rows: d.dataset().num_rows(),
                conflicting_keys: d.conflicting_keys().to_vec(),
            })
            .collect();
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Wall-clock budget of a run, checked between stages.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    fn start(limit_secs: u64) -> Self {
        Self {
            started: Instant::now(),
            limit: Duration::from_secs(limit_secs),
        }
    }

    fn check(&self, stage: &str) -> Result<()> {
        if self.started.elapsed() >= self.limit {
            error!(stage, limit_secs = self.limit.as_secs(), "Run deadline exceeded");
            return Err(Error::TimedOut {
                stage: stage.to_string(),
                limit_secs: self.limit.as_secs(),
            });
        }
        Ok(())
    }
}

/// Logs a stage failure and tags the error with the stage name.
fn failed_at(stage: &'static str) -> impl FnOnce(Error) -> Error {
    move |err| {
        error!(stage, error = %err, "Stage failed");
        err.at_stage(stage)
    }
}

/// Drives the stages of the weekly sales run: load, validate, normalize,
/// validate_hierarchy, curate, persist_staging, aggregate, publish.
pub struct PipelineService {
    settings: Settings,
    catalog: TableCatalog,
    policy: ValidationPolicy,
    processor: SalesMartProcessor,
    publisher: Option<SinkPublisher>,
    staging: Option<StagingWriter>,
}

impl PipelineService {
    pub fn new(settings: Settings, source: Arc<dyn SourceStore>) -> Result<Self> {
        let catalog = TableCatalog::standard(settings.source.schema.clone());
        catalog.validate()?;

        let policy = ValidationPolicy::from_config(&settings.validation);
        let unknown = policy.unknown_checks();
        if !unknown.is_empty() {
            return Err(Error::InvalidInput(format!(
                "validation.blocking_checks names unknown checks: {}",
                unknown.join(", ")
            )));
        }

        let processor = SalesMartProcessor::new(&settings, source)?;

        Ok(Self {
            settings,
            catalog,
            policy,
            processor,
            publisher: None,
            staging: None,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn SinkStore>) -> Self {
        if self.settings.sink.staging {
            self.staging = Some(StagingWriter::new(
                sink.clone(),
                self.settings.sink.staging_prefix.clone(),
            ));
        } else {
            info!("Staging tables disabled, only the weekly aggregate is written");
        }
        self.publisher = Some(SinkPublisher::new(sink, self.settings.sink.table.clone()));
        self
    }

    /// Full run ending with an append to the sink table.
    pub async fn run(&self) -> Result<RunReport> {
        let publisher = self.publisher.as_ref().ok_or_else(|| {
            Error::SinkUnavailable("no sink store configured for this run".to_string())
        })?;
        let deadline = Deadline::start(self.settings.run.timeout_secs);
        let mut report = RunReport::begin();
        info!(run_id = %report.run_id, "Starting weekly sales run");

        deadline.check("load")?;
        let staged = self.load(&mut report).await.map_err(failed_at("load"))?;
        let fact = staged_view(&staged, FACT_TRANSACTIONS).map_err(failed_at("load"))?;
        let prod = staged_view(&staged, HIER_PROD).map_err(failed_at("load"))?;
        let site = staged_view(&staged, HIER_POSSITE).map_err(failed_at("load"))?;

        deadline.check("validate")?;
        let checks = self
            .processor
            .validator
            .validate_facts(fact, prod, site)
            .await
            .map_err(failed_at("validate"))?;
        report.checks.extend(checks.iter().cloned());
        self.policy.enforce("validate", &checks)?;

        deadline.check("normalize")?;
        let dimensions = self
            .processor
            .normalizer
            .normalize(prod, site)
            .await
            .map_err(failed_at("normalize"))?;
        report.record_dimensions(&dimensions);

        deadline.check("validate_hierarchy")?;
        let checks = self
            .processor
            .validator
            .validate_hierarchy(&dimensions)
            .await
            .map_err(failed_at("validate_hierarchy"))?;
        report.checks.extend(checks.iter().cloned());
        self.policy.enforce("validate_hierarchy", &checks)?;

        deadline.check("curate")?;
        let curation = self
            .curate(fact, &dimensions)
            .await
            .map_err(failed_at("curate"))?;
        report.curation = Some(curation.counts);

        if let Some(staging) = &self.staging {
            deadline.check("persist_staging")?;
            report.staging = staging
                .persist(&dimensions, &curation.dataset)
                .await
                .map_err(failed_at("persist_staging"))?;
        }

        deadline.check("aggregate")?;
        let weekly = self
            .processor
            .aggregator
            .aggregate(&curation.dataset)
            .await
            .map_err(failed_at("aggregate"))?;
        report.aggregate_rows = Some(weekly.num_rows());

        deadline.check("publish")?;
        report.published = Some(publisher.publish(&weekly).await.map_err(failed_at("publish"))?);

        let report = report.finish();
        info!(
            run_id = %report.run_id,
            rows = report.aggregate_rows.unwrap_or_default(),
            table = publisher.table(),
            "Weekly sales run finished"
        );
        Ok(report)
    }

    /// Loads the catalog and runs the fact battery. Never writes to the sink.
    pub async fn validate_only(&self) -> Result<RunReport> {
        let deadline = Deadline::start(self.settings.run.timeout_secs);
        let mut report = RunReport::begin();
        info!(run_id = %report.run_id, "Starting validation run");

        deadline.check("load")?;
        let staged = self.load(&mut report).await.map_err(failed_at("load"))?;

        deadline.check("validate")?;
        let checks = self
            .validate_staged(&staged)
            .await
            .map_err(failed_at("validate"))?;
        report.checks.extend(checks.iter().cloned());
        self.policy.enforce("validate", &checks)?;

        Ok(report.finish())
    }

    async fn validate_staged(&self, staged: &StagedTables) -> Result<Vec<CheckResult>> {
        self.processor
            .validator
            .validate_facts(
                staged_view(staged, FACT_TRANSACTIONS)?,
                staged_view(staged, HIER_PROD)?,
                staged_view(staged, HIER_POSSITE)?,
            )
            .await
    }

    async fn curate(&self, fact: &Dataset, dimensions: &Dimensions) -> Result<Curation> {
        self.processor
            .curator
            .curate(
                fact,
                dimensions.pos_site()?.dataset(),
                dimensions.sku()?.dataset(),
            )
            .await
    }

    async fn load(&self, report: &mut RunReport) -> Result<StagedTables> {
        let staged = self.processor.loader.load_all(&self.catalog).await?;
        report.loaded = staged
            .iter()
            .map(|(table, dataset)| (table.clone(), dataset.num_rows()))
            .collect();
        Ok(staged)
    }
}

fn staged_view<'a>(staged: &'a StagedTables, table: &str) -> Result<&'a Dataset> {
    staged
        .get(table)
        .ok_or_else(|| Error::SourceUnavailable(format!("table {} was not loaded", table)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::storage::{SqliteSink, SqliteSource};
    use common::config::{ConflictPolicy, ValidationMode};

    const SEED: &str = "
        INSERT INTO hier_possite VALUES (1, 'Main St', 10, 'Mall', 100, 'Retail');
        INSERT INTO hier_prod VALUES
          (100, 'Sock', 1000, 'Sock Red', 10, 'Socks', 2, 'Hosiery', 1, 'Apparel', 0, 0, 0);
        INSERT INTO fact_transactions VALUES
          (1, 1, 'SALE', '2024-01-02', 1, 100, 7, 1, 10.0, 2.0, 'store'),
          (1, 2, 'SALE', '2024-01-03', 1, 100, 7, 2, 20.0, 3.0, 'store');
    ";

    async fn seeded_source(extra: &str) -> Arc<SqliteSource> {
        let source = SqliteSource::open_in_memory().await.unwrap();
        source.execute_batch(fixtures::SOURCE_DDL).await.unwrap();
        source.execute_batch(SEED).await.unwrap();
        source.execute_batch(extra).await.unwrap();
        Arc::new(source)
    }

    #[tokio::test]
    async fn full_run_publishes_weekly_totals() {
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let service = PipelineService::new(fixtures::settings(), seeded_source("").await)
            .unwrap()
            .with_sink(sink.clone());

        let report = service.run().await.unwrap();

        assert_eq!(report.loaded[FACT_TRANSACTIONS], 2);
        assert_eq!(report.loaded.len(), 10);
        assert!(report.checks.iter().all(|c| c.passed()));
        assert_eq!(report.dimensions.len(), 5);
        assert_eq!(report.curation.unwrap().kept_rows, 2);
        assert_eq!(report.aggregate_rows, Some(1));
        let published = report.published.unwrap();
        assert_eq!(published.rows_appended, 1);
        assert!(report.finished_at.is_some());
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 1);

        let staging: Vec<(&str, u64)> = report
            .staging
            .iter()
            .map(|(table, rows)| (table.as_str(), *rows))
            .collect();
        assert_eq!(
            staging,
            vec![
                ("staging_curated_fact_transactions", 2),
                ("staging_dim_category", 1),
                ("staging_dim_pos_site", 1),
                ("staging_dim_sku", 1),
                ("staging_dim_style", 1),
                ("staging_dim_subcategory", 1),
            ]
        );
        for (table, rows) in &report.staging {
            assert_eq!(sink.row_count(table).await.unwrap(), *rows);
        }
    }

    #[tokio::test]
    async fn rerun_replaces_staging_and_appends_aggregate() {
        let source = seeded_source("").await;
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let service = PipelineService::new(fixtures::settings(), source)
            .unwrap()
            .with_sink(sink.clone());

        service.run().await.unwrap();
        let second = service.run().await.unwrap();

        assert_eq!(second.published.unwrap().rows_before, 1);
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 2);
        assert_eq!(sink.row_count("staging_dim_sku").await.unwrap(), 1);
        assert_eq!(
            sink.row_count("staging_curated_fact_transactions").await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn disabled_staging_writes_only_aggregate() {
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let mut settings = fixtures::settings();
        settings.sink.staging = false;

        let report = PipelineService::new(settings, seeded_source("").await)
            .unwrap()
            .with_sink(sink.clone())
            .run()
            .await
            .unwrap();

        assert!(report.staging.is_empty());
        assert_eq!(sink.row_count("staging_dim_sku").await.unwrap(), 0);
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_blocking_check_is_rejected_at_startup() {
        let mut settings = fixtures::settings();
        settings.validation.blocking_checks = vec![
            "fact_transactions.pk_unique".to_string(),
            "fact_transactions.pk_uniq".to_string(),
        ];

        let err = PipelineService::new(settings, seeded_source("").await)
            .err()
            .unwrap();
        match err {
            Error::InvalidInput(message) => {
                assert!(message.contains("fact_transactions.pk_uniq"));
                assert!(!message.contains("pk_unique,"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn conflict_under_fail_policy_names_normalize_stage() {
        let source = seeded_source(
            "INSERT INTO hier_prod VALUES
               (100, 'Sock v2', 1000, 'Sock Red', 10, 'Socks', 2, 'Hosiery', 1, 'Apparel', 0, 0, 0);",
        )
        .await;
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let mut settings = fixtures::settings();
        settings.normalization.on_conflict = ConflictPolicy::Fail;

        let err = PipelineService::new(settings, source)
            .unwrap()
            .with_sink(sink.clone())
            .run()
            .await
            .unwrap_err();

        match &err {
            Error::StageFailed { stage, .. } => assert_eq!(stage, "normalize"),
            other => panic!("unexpected error {other}"),
        }
        assert!(err.to_string().starts_with("Stage normalize failed"));
        assert!(matches!(
            err.root(),
            Error::ConflictingDimensionRow { keys, .. } if keys == &vec![Some(100)]
        ));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(sink.row_count("staging_dim_sku").await.unwrap(), 0);
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_source_table_names_load_stage() {
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let err = PipelineService::new(fixtures::settings(), seeded_source("DROP TABLE hier_hldy;").await)
            .unwrap()
            .with_sink(sink)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StageFailed { ref stage, .. } if stage == "load"));
        assert!(matches!(err.root(), Error::SourceUnavailable(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn advisory_failures_are_reported_and_run_continues() {
        let source = seeded_source(
            "INSERT INTO fact_transactions VALUES
               (2, 1, 'SALE', '2024-01-03', 1, 555, 7, 4, 40.0, 0.0, 'store');",
        )
        .await;
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let service = PipelineService::new(fixtures::settings(), source)
            .unwrap()
            .with_sink(sink);

        let report = service.run().await.unwrap();
        let sku_fk = report
            .checks
            .iter()
            .find(|c| c.check == "fact_transactions.sku_fk")
            .unwrap();
        assert!(!sku_fk.passed());
        assert_eq!(report.curation.unwrap().dropped_rows, 1);
    }

    #[tokio::test]
    async fn blocking_failure_halts_before_sink() {
        let source = seeded_source(
            "INSERT INTO fact_transactions VALUES
               (1, 1, 'SALE', '2024-01-04', 1, 100, 7, 1, 10.0, 0.0, 'store');",
        )
        .await;
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let mut settings = fixtures::settings();
        settings.validation.mode = ValidationMode::Blocking;

        let err = PipelineService::new(settings, source)
            .unwrap()
            .with_sink(sink.clone())
            .run()
            .await
            .unwrap_err();

        match &err {
            Error::ValidationFailed { stage, checks, .. } => {
                assert_eq!(stage, "validate");
                assert_eq!(checks, &vec!["fact_transactions.pk_unique".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(err.exit_code(), 2);
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_timeout_stops_at_first_boundary() {
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let mut settings = fixtures::settings();
        settings.run.timeout_secs = 0;

        let err = PipelineService::new(settings, seeded_source("").await)
            .unwrap()
            .with_sink(sink.clone())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TimedOut { ref stage, limit_secs: 0 } if stage == "load"));
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn validate_only_skips_later_stages() {
        let service = PipelineService::new(fixtures::settings(), seeded_source("").await).unwrap();

        let report = service.validate_only().await.unwrap();
        assert_eq!(report.checks.len(), 4);
        assert!(report.dimensions.is_empty());
        assert!(report.published.is_none());

        // A full run needs a sink
        assert!(matches!(
            service.run().await.unwrap_err(),
            Error::SinkUnavailable(_)
        ));
    }
}
