use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::domain::{QueryOutcome, QueryResult};
use crate::error::Result;
use crate::executor::ExecutorBackend;
use crate::metrics;

/// One statement bound to the engine it runs on.
#[derive(Clone)]
pub struct QueryTask {
    pub name: String,
    pub executor: Arc<dyn ExecutorBackend>,
    pub sql: String,
    pub fetch_rows: bool,
}

impl QueryTask {
    pub fn new(name: impl Into<String>, executor: Arc<dyn ExecutorBackend>, sql: String) -> Self {
        Self {
            name: name.into(),
            executor,
            sql,
            fetch_rows: false,
        }
    }
}

impl std::fmt::Debug for QueryTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTask")
            .field("name", &self.name)
            .field("mode", &self.executor.mode())
            .field("fetch_rows", &self.fetch_rows)
            .finish()
    }
}

/// Runs one statement. Engine errors propagate unchanged.
pub async fn run_query(
    executor: &dyn ExecutorBackend,
    sql: &str,
    fetch_rows: bool,
) -> Result<Option<QueryResult>> {
    if fetch_rows {
        Ok(Some(executor.execute_query(sql).await?))
    } else {
        executor.execute_statement(sql).await?;
        Ok(None)
    }
}

/// Runs a task and folds any engine error into a FAILURE outcome.
pub async fn run_task(task: QueryTask) -> QueryOutcome {
    let start = Instant::now();
    let outcome = match run_query(task.executor.as_ref(), &task.sql, task.fetch_rows).await {
        Ok(_) => {
            debug!(query = %task.name, elapsed_ms = start.elapsed().as_millis() as u64, "Query succeeded");
            QueryOutcome::success(&task.name, start.elapsed())
        }
        Err(e) => {
            warn!(query = %task.name, error = %e, "Query failed");
            QueryOutcome::failure(&task.name, e.to_string())
        }
    };
    metrics::record_query_outcome(&outcome);
    outcome
}
