mod concurrent;
mod join;
mod metadata;
mod naming;
mod runner;
mod staging;
mod teardown;
mod templating;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{freeze_queries, Catalog, QuerySelection};
use crate::config::{
    Backend, Config, EngineConfig, RunConfig, DEFAULT_MAX_WORKERS, DEFAULT_TABLE_PREFIX,
};
use crate::domain::{
    AnchorSpec, DateRange, PipelineStage, QueryDescriptor, QueryOutcome, QueryResult,
    StatusReport, ANCHOR_QUERY_NAME,
};
use crate::error::{Error, Result};
use crate::executor::{BigQueryExecutor, ExecutorBackend, YachtSqlExecutor};
use crate::metrics;
use crate::validation::{validate_date_range, validate_identifier, validate_table_name};

pub use concurrent::ConcurrentExecutor;
pub use join::{synthesize_join, JoinSpec};
pub use metadata::collect_metadata;
pub use naming::TableNamer;
pub use runner::{run_query, run_task, QueryTask};
pub use staging::stage_leftmost_table;
pub use teardown::drop_tables;
pub use templating::template_queries;

/// The only dialect engines can currently be started for.
pub const SUPPORTED_DIALECT: &str = "bigquery";

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub leftmost_table: String,
    pub entity_id: String,
    pub feature_table: Option<String>,
    pub selection: QuerySelection,
    pub date_range: Option<DateRange>,
    pub export_dir: Option<PathBuf>,
    pub return_rows: bool,
    pub stop_on_error: bool,
    pub drop_intermediate_tables: bool,
    pub batch_size: Option<usize>,
}

impl RunRequest {
    pub fn new(leftmost_table: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            leftmost_table: leftmost_table.into(),
            entity_id: entity_id.into(),
            feature_table: None,
            selection: QuerySelection::All,
            date_range: None,
            export_dir: None,
            return_rows: true,
            stop_on_error: false,
            drop_intermediate_tables: true,
            batch_size: None,
        }
    }

    /// Takes the run switches (stop-on-error, teardown, batching) from config.
    pub fn with_run_config(mut self, run: &RunConfig) -> Self {
        self.stop_on_error = run.stop_on_error;
        self.drop_intermediate_tables = run.drop_intermediate_tables;
        self.batch_size = run.batch_size;
        self
    }

    fn anchor_spec(&self) -> AnchorSpec {
        AnchorSpec {
            leftmost_table: self.leftmost_table.clone(),
            entity_id: self.entity_id.clone(),
            date_range: self.date_range.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: String,
    pub rows: Option<QueryResult>,
    pub report: StatusReport,
    pub dropped: Vec<QueryOutcome>,
}

pub struct FeatureFactory {
    executor: Arc<dyn ExecutorBackend>,
    dialect: String,
    namer: TableNamer,
    catalog: Catalog,
    max_workers: usize,
}

impl FeatureFactory {
    pub fn new(
        executor: Arc<dyn ExecutorBackend>,
        dialect: impl Into<String>,
        schema: impl Into<String>,
        catalog: Catalog,
    ) -> Self {
        Self {
            executor,
            dialect: dialect.into(),
            namer: TableNamer::new(schema, DEFAULT_TABLE_PREFIX),
            catalog,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn with_table_prefix(mut self, prefix: &str) -> Self {
        self.namer = TableNamer::new(self.namer.schema().to_string(), prefix);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Builds the engine for a dialect/schema pair. Only `bigquery` is
    /// supported; the bigquery backend also needs a project id.
    pub async fn start_engine(engine: &EngineConfig) -> Result<Arc<dyn ExecutorBackend>> {
        let dialect = engine
            .dialect
            .as_deref()
            .ok_or_else(|| Error::Config("dialect needs to be specified".into()))?;
        if engine.schema.is_none() {
            return Err(Error::Config("schema needs to be specified".into()));
        }
        if dialect != SUPPORTED_DIALECT {
            return Err(Error::Config(format!(
                "This database is not currently supported: {}",
                dialect
            )));
        }

        match engine.backend {
            Backend::Bigquery => {
                let project_id = engine.project_id.clone().ok_or_else(|| {
                    Error::Config("project_id needs to be specified".into())
                })?;
                let executor =
                    BigQueryExecutor::new(Some(project_id), engine.location.clone()).await?;
                info!(project = %executor.project_id(), "BigQuery engine started");
                Ok(Arc::new(executor))
            }
            Backend::Mock => {
                info!("Mock engine started");
                Ok(Arc::new(YachtSqlExecutor::new()))
            }
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let executor = Self::start_engine(&config.engine).await?;
        let catalog_dir = config
            .run
            .catalog_dir
            .as_ref()
            .ok_or_else(|| Error::Config("catalog_dir needs to be specified".into()))?;
        let catalog = Catalog::load(catalog_dir)?;

        let dialect = config.engine.dialect.clone().unwrap_or_default();
        let schema = config.engine.schema.clone().unwrap_or_default();
        Ok(Self::new(executor, dialect, schema, catalog)
            .with_table_prefix(&config.run.table_prefix)
            .with_max_workers(config.run.max_workers))
    }

    pub fn executor(&self) -> &Arc<dyn ExecutorBackend> {
        &self.executor
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn list_dialects(&self) -> Vec<String> {
        self.catalog.list_dialects()
    }

    pub fn list_entities(&self) -> Result<Vec<String>> {
        self.catalog.list_entities(&self.dialect)
    }

    pub fn list_domains(&self, entity_id: &str) -> Result<Vec<String>> {
        self.catalog.list_domains(&self.dialect, entity_id)
    }

    pub fn list_queries(&self, entity_id: &str, domains: Option<&[String]>) -> Result<Vec<String>> {
        self.catalog.list_queries(&self.dialect, entity_id, domains)
    }

    /// Every configuration check that can fail without touching the engine.
    fn preflight(&self, request: &RunRequest) -> Result<BTreeMap<String, QueryDescriptor>> {
        validate_table_name(self.namer.schema())
            .map_err(|_| Error::Config(format!("Invalid schema: {}", self.namer.schema())))?;
        validate_identifier("table_prefix", self.namer.prefix())?;
        validate_table_name(&request.leftmost_table)?;
        validate_identifier("entity_id", &request.entity_id)?;
        if let Some(table) = &request.feature_table {
            validate_table_name(table)?;
        }
        if let Some(range) = &request.date_range {
            validate_date_range(range)?;
        }
        if request.batch_size == Some(0) {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        self.catalog
            .resolve(&self.dialect, &request.entity_id, &request.selection)
    }

    /// Records completion of `stage` and returns the stage that follows it.
    fn advance(stage: PipelineStage) -> PipelineStage {
        info!(stage = %stage, "Stage complete");
        metrics::record_stage_complete(stage);
        stage.next().unwrap_or(PipelineStage::Done)
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        let queries = self.preflight(request)?;
        let mut stage = PipelineStage::Staging;

        let (staged, anchor_outcome) =
            stage_leftmost_table(self.executor.as_ref(), &self.namer, &request.anchor_spec())
                .await?;
        stage = Self::advance(stage);

        if let Some(dir) = &request.export_dir {
            freeze_queries(dir, &queries)?;
        }
        info!(queries = queries.len(), "Catalog selection resolved");
        stage = Self::advance(stage);

        let (mut tables, tasks) = template_queries(&self.executor, &self.namer, &staged, &queries);
        stage = Self::advance(stage);

        let mut outcomes = ConcurrentExecutor::new(self.max_workers)
            .with_batch_size(request.batch_size)
            .run(tasks)
            .await;
        outcomes.push(anchor_outcome);
        tables.insert(ANCHOR_QUERY_NAME, staged.clone());
        let report = StatusReport::new(&outcomes, &tables);
        if report.has_failures() {
            warn!(failed = ?report.failed_queries(), "Some feature queries failed");
            if request.stop_on_error {
                return Err(Error::QueriesFailed {
                    failed: report.failed_queries(),
                    undropped: report.succeeded_tables(),
                    report,
                });
            }
        }
        stage = Self::advance(stage);

        let clean_tables = report.succeeded_tables();
        let columns = collect_metadata(self.executor.as_ref(), self.namer.schema(), &clean_tables)
            .await
            .map_err(|e| e.at_stage(stage, clean_tables.clone()))?;
        stage = Self::advance(stage);

        let join = synthesize_join(
            &self.namer,
            &columns,
            &tables,
            request.feature_table.as_deref(),
        )
        .map_err(|e| e.at_stage(stage, clean_tables.clone()))?;
        run_query(self.executor.as_ref(), &join.sql, false)
            .await
            .map_err(|e| e.at_stage(stage, clean_tables.clone()))?;
        let rows = if request.return_rows {
            let read_back = format!("SELECT * FROM {}", join.destination);
            run_query(self.executor.as_ref(), &read_back, true)
                .await
                .map_err(|e| e.at_stage(stage, clean_tables.clone()))?
        } else {
            None
        };
        info!(table = %join.destination, "Feature table materialized");
        stage = Self::advance(stage);

        let dropped = if request.drop_intermediate_tables {
            drop_tables(&self.executor, &clean_tables, self.max_workers).await
        } else {
            info!(tables = clean_tables.len(), "Keeping intermediate tables");
            Vec::new()
        };
        stage = Self::advance(stage);
        Self::advance(stage);

        Ok(RunOutput {
            table: join.destination,
            rows,
            report,
            dropped,
        })
    }
}
