mod bigquery;
mod converters;
mod yachtsql;

#[cfg(test)]
mod scripted;

pub use self::bigquery::BigQueryExecutor;
pub use self::yachtsql::YachtSqlExecutor;
pub use crate::domain::{ColumnInfo, ColumnMetadata, QueryResult};

#[cfg(test)]
pub use self::scripted::ScriptedExecutor;

use crate::error::{Error, Result};
use crate::validation::quote_literal;
use async_trait::async_trait;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutorMode {
    #[default]
    Mock,
    BigQuery,
}

#[async_trait]
pub trait ExecutorBackend: Send + Sync {
    fn mode(&self) -> ExecutorMode;

    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    async fn execute_statement(&self, sql: &str) -> Result<u64>;

    /// Columns of each qualified table, grouped by table in the order the
    /// engine reports them.
    async fn table_columns(&self, schema: &str, tables: &[String]) -> Result<Vec<ColumnMetadata>> {
        information_schema_table_columns(self, schema, tables).await
    }
}

pub(crate) async fn information_schema_table_columns<E: ExecutorBackend + ?Sized>(
    executor: &E,
    schema: &str,
    tables: &[String],
) -> Result<Vec<ColumnMetadata>> {
    if tables.is_empty() {
        return Ok(Vec::new());
    }
    let sql = information_schema_columns_sql(schema, tables);
    let result = executor.execute_query(&sql).await?;
    parse_information_schema_columns(&result, schema, tables)
}

fn unqualified(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

pub(crate) fn information_schema_columns_sql(schema: &str, tables: &[String]) -> String {
    let names: Vec<String> = tables.iter().map(|t| quote_literal(unqualified(t))).collect();
    format!(
        "SELECT table_name, column_name FROM {}.INFORMATION_SCHEMA.COLUMNS WHERE table_name IN ({}) ORDER BY table_name, ordinal_position",
        schema,
        names.join(", ")
    )
}

pub(crate) fn parse_information_schema_columns(
    result: &QueryResult,
    schema: &str,
    tables: &[String],
) -> Result<Vec<ColumnMetadata>> {
    let table_idx = result.column_index("table_name").ok_or_else(|| {
        Error::Executor("INFORMATION_SCHEMA result has no table_name column".into())
    })?;
    let column_idx = result.column_index("column_name").ok_or_else(|| {
        Error::Executor("INFORMATION_SCHEMA result has no column_name column".into())
    })?;

    let mut columns = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let (Some(table), Some(column)) = (
            row.get(table_idx).and_then(|v| v.as_str()),
            row.get(column_idx).and_then(|v| v.as_str()),
        ) else {
            continue;
        };
        let qualified = tables
            .iter()
            .find(|t| unqualified(t) == table)
            .cloned()
            .unwrap_or_else(|| format!("{}.{}", schema, table));
        columns.push(ColumnMetadata::new(qualified, column));
    }
    Ok(columns)
}
