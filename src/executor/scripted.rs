use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{
    information_schema_table_columns, ColumnMetadata, ExecutorBackend, ExecutorMode, QueryResult,
};
use crate::error::{Error, Result};

/// In-process backend that records every statement and answers from a script:
/// SQL containing a failure marker errors, SQL containing a result marker
/// returns the canned result, and `table_columns` answers from a map keyed by
/// table-name fragments when one is configured.
#[derive(Default)]
pub struct ScriptedExecutor {
    mode: ExecutorMode,
    executed: Mutex<Vec<String>>,
    failures: Vec<String>,
    results: Vec<(String, QueryResult)>,
    columns: Option<BTreeMap<String, Vec<String>>>,
    delays: Vec<(String, Duration)>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ExecutorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn fail_on(mut self, marker: &str) -> Self {
        self.failures.push(marker.to_string());
        self
    }

    pub fn with_result(mut self, marker: &str, result: QueryResult) -> Self {
        self.results.push((marker.to_string(), result));
        self
    }

    pub fn with_table_columns(mut self, table_fragment: &str, columns: &[&str]) -> Self {
        self.columns
            .get_or_insert_with(BTreeMap::new)
            .insert(
                table_fragment.to_string(),
                columns.iter().map(|c| c.to_string()).collect(),
            );
        self
    }

    pub fn with_delay(mut self, marker: &str, delay: Duration) -> Self {
        self.delays.push((marker.to_string(), delay));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn executed_matching(&self, needle: &str) -> Vec<String> {
        self.executed
            .lock()
            .iter()
            .filter(|sql| sql.contains(needle))
            .cloned()
            .collect()
    }

    async fn record(&self, sql: &str) -> Result<()> {
        self.executed.lock().push(sql.to_string());

        if let Some((_, delay)) = self.delays.iter().find(|(m, _)| sql.contains(m.as_str())) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(marker) = self.failures.iter().find(|m| sql.contains(m.as_str())) {
            return Err(Error::Executor(format!("scripted failure on '{}'", marker)));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutorBackend for ScriptedExecutor {
    fn mode(&self) -> ExecutorMode {
        self.mode
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql).await?;
        Ok(self
            .results
            .iter()
            .find(|(m, _)| sql.contains(m.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        self.record(sql).await?;
        Ok(0)
    }

    async fn table_columns(&self, schema: &str, tables: &[String]) -> Result<Vec<ColumnMetadata>> {
        let Some(map) = &self.columns else {
            return information_schema_table_columns(self, schema, tables).await;
        };
        self.record(&format!("-- table_columns {}", tables.join(", ")))
            .await?;
        Ok(tables
            .iter()
            .flat_map(|t| {
                map.iter()
                    .find(|(fragment, _)| t.contains(fragment.as_str()))
                    .map(|(_, columns)| columns)
                    .into_iter()
                    .flatten()
                    .map(move |c| ColumnMetadata::new(t.clone(), c.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_statements_in_order() {
        let executor = ScriptedExecutor::new();
        executor.execute_statement("CREATE TABLE a").await.unwrap();
        executor.execute_statement("DROP TABLE a").await.unwrap();
        assert_eq!(executor.executed(), vec!["CREATE TABLE a", "DROP TABLE a"]);
    }

    #[tokio::test]
    async fn test_fails_on_marker() {
        let executor = ScriptedExecutor::new().fail_on("broken");
        assert!(executor.execute_statement("SELECT broken").await.is_err());
        assert!(executor.execute_statement("SELECT fine").await.is_ok());
        assert_eq!(executor.executed_matching("broken").len(), 1);
    }

    #[tokio::test]
    async fn test_table_columns_from_map() {
        let executor = ScriptedExecutor::new().with_table_columns("ds.t", &["idx", "a"]);
        let columns = executor
            .table_columns("ds", &["ds.t".to_string(), "ds.missing".to_string()])
            .await
            .unwrap();
        assert_eq!(
            columns,
            vec![ColumnMetadata::new("ds.t", "idx"), ColumnMetadata::new("ds.t", "a")]
        );
    }
}
