use std::sync::Arc;

use tracing::info;

use crate::domain::QueryOutcome;
use crate::executor::ExecutorBackend;
use crate::metrics;

use super::concurrent::ConcurrentExecutor;
use super::runner::QueryTask;

/// Drops intermediate tables concurrently. Failures come back as outcomes
/// keyed by table name and are never raised.
pub async fn drop_tables(
    executor: &Arc<dyn ExecutorBackend>,
    tables: &[String],
    max_workers: usize,
) -> Vec<QueryOutcome> {
    let tasks: Vec<QueryTask> = tables
        .iter()
        .map(|table| {
            QueryTask::new(
                table.clone(),
                Arc::clone(executor),
                format!("DROP TABLE IF EXISTS {}", table),
            )
        })
        .collect();

    let outcomes = ConcurrentExecutor::new(max_workers).run(tasks).await;

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = outcomes.len() - succeeded;
    metrics::record_tables_dropped(succeeded, failed);
    info!(dropped = succeeded, failed = failed, "Intermediate tables dropped");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QueryStatus;
    use crate::executor::{ScriptedExecutor, YachtSqlExecutor};

    #[tokio::test]
    async fn test_drop_missing_table_reports_success() {
        let executor: Arc<dyn ExecutorBackend> = Arc::new(YachtSqlExecutor::new());
        executor
            .execute_statement("CREATE TABLE proj.ds.present (id INT64)")
            .await
            .unwrap();

        let outcomes = drop_tables(
            &executor,
            &["proj.ds.present".to_string(), "proj.ds.absent".to_string()],
            2,
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == QueryStatus::Success));
        assert!(executor
            .execute_query("SELECT * FROM proj.ds.present")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_drop_failures_are_outcomes() {
        let scripted = Arc::new(ScriptedExecutor::new().fail_on("ds.locked"));
        let executor: Arc<dyn ExecutorBackend> = scripted.clone();

        let outcomes = drop_tables(
            &executor,
            &["ds.locked".to_string(), "ds.free".to_string()],
            4,
        )
        .await;

        let locked = outcomes.iter().find(|o| o.query_name == "ds.locked").unwrap();
        assert_eq!(locked.status, QueryStatus::Failure);
        let free = outcomes.iter().find(|o| o.query_name == "ds.free").unwrap();
        assert_eq!(free.status, QueryStatus::Success);
        assert_eq!(scripted.executed_matching("DROP TABLE IF EXISTS").len(), 2);
    }

    #[tokio::test]
    async fn test_drop_nothing() {
        let executor: Arc<dyn ExecutorBackend> = Arc::new(ScriptedExecutor::new());
        assert!(drop_tables(&executor, &[], 8).await.is_empty());
    }
}
