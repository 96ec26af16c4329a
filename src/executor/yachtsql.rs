use async_trait::async_trait;
use serde_json::Value as JsonValue;
use yachtsql::{AsyncQueryExecutor, Table};

use super::converters::{datatype_to_bq_type, yacht_value_into_json};
use super::{ColumnInfo, ColumnMetadata, ExecutorBackend, ExecutorMode, QueryResult};
use crate::error::{Error, Result};

/// In-memory BigQuery-dialect engine used as the mock backend.
#[derive(Clone)]
pub struct YachtSqlExecutor {
    executor: AsyncQueryExecutor,
}

impl YachtSqlExecutor {
    pub fn new() -> Self {
        Self {
            executor: AsyncQueryExecutor::new(),
        }
    }

    async fn run(&self, sql: &str) -> Result<Table> {
        self.executor
            .execute_sql(sql)
            .await
            .map_err(|e| Error::Executor(format!("{}\n\nSQL: {}", e, sql)))
    }
}

impl Default for YachtSqlExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutorBackend for YachtSqlExecutor {
    fn mode(&self) -> ExecutorMode {
        ExecutorMode::Mock
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let result = self.run(sql).await?;
        table_to_query_result(&result)
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        let result = self.run(sql).await?;
        Ok(result.row_count() as u64)
    }

    /// No information schema here: columns come from a zero-row select on each table.
    async fn table_columns(&self, _schema: &str, tables: &[String]) -> Result<Vec<ColumnMetadata>> {
        let mut columns = Vec::new();
        for table in tables {
            let empty = self.run(&format!("SELECT * FROM {} LIMIT 0", table)).await?;
            columns.extend(
                empty
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| ColumnMetadata::new(table.clone(), f.name.clone())),
            );
        }
        Ok(columns)
    }
}

fn table_to_query_result(table: &Table) -> Result<QueryResult> {
    let schema = table.schema();
    let columns: Vec<ColumnInfo> = schema
        .fields()
        .iter()
        .map(|f| ColumnInfo {
            name: f.name.clone(),
            data_type: datatype_to_bq_type(&f.data_type),
        })
        .collect();

    let records = table
        .to_records()
        .map_err(|e| Error::Executor(e.to_string()))?;
    let rows: Vec<Vec<JsonValue>> = records
        .into_iter()
        .map(|record| {
            record
                .into_values()
                .into_iter()
                .map(yacht_value_into_json)
                .collect()
        })
        .collect();

    Ok(QueryResult { columns, rows })
}
