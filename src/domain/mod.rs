use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Reserved query name the staged anchor table is registered under.
pub const ANCHOR_QUERY_NAME: &str = "leftMostTable";
/// Synthetic join key carried by the staged table and every feature table.
pub const KEY_COLUMN: &str = "idx";
pub const OUTCOME_COLUMN: &str = "y";
pub const MIN_DATE_COLUMN: &str = "min_date";
pub const MAX_DATE_COLUMN: &str = "max_date";
/// Placeholder catalog queries use to reference the staged anchor table.
pub const LEFTMOST_PLACEHOLDER: &str = "{LEFTMOST_TABLE}";

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl QueryResult {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &JsonValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row.get(idx).unwrap_or(&JsonValue::Null)))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Success,
    Failure,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Success => f.write_str("SUCCESS"),
            QueryStatus::Failure => f.write_str("FAILURE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub query_name: String,
    pub status: QueryStatus,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn success(query_name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            query_name: query_name.into(),
            status: QueryStatus::Success,
            elapsed_secs: elapsed.as_secs_f64(),
            error: None,
        }
    }

    /// Failed outcomes always report zero elapsed time.
    pub fn failure(query_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            status: QueryStatus::Failure,
            elapsed_secs: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub name: String,
    pub dialect: String,
    pub entity: String,
    pub domain: String,
    pub sql: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub min_date: String,
    pub max_date: String,
}

impl DateRange {
    pub fn new(min_date: impl Into<String>, max_date: impl Into<String>) -> Self {
        Self {
            min_date: min_date.into(),
            max_date: max_date.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorSpec {
    pub leftmost_table: String,
    pub entity_id: String,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    pub table_name: String,
    pub column_name: String,
}

impl ColumnMetadata {
    pub fn new(table_name: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
        }
    }
}

/// Query name to destination table, with the reverse lookup used for join aliasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationTableMap {
    by_query: BTreeMap<String, String>,
    by_table: BTreeMap<String, String>,
}

impl DestinationTableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query_name: impl Into<String>, table_name: impl Into<String>) {
        let query_name = query_name.into();
        let table_name = table_name.into();
        if let Some(previous) = self.by_query.insert(query_name.clone(), table_name.clone()) {
            self.by_table.remove(&previous);
        }
        self.by_table.insert(table_name, query_name);
    }

    pub fn table_for(&self, query_name: &str) -> Option<&str> {
        self.by_query.get(query_name).map(String::as_str)
    }

    pub fn query_for(&self, table_name: &str) -> Option<&str> {
        self.by_table.get(table_name).map(String::as_str)
    }

    pub fn anchor_table(&self) -> Option<&str> {
        self.table_for(ANCHOR_QUERY_NAME)
    }

    /// Resolves an outcome name to its table. Names that are not query names
    /// (drop outcomes are keyed by table) resolve to themselves.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.table_for(name).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.by_query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_query.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Staging,
    ResolvingCatalog,
    Templating,
    Executing,
    Metadata,
    Joining,
    Dropping,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Staging => "STAGING",
            PipelineStage::ResolvingCatalog => "RESOLVING_CATALOG",
            PipelineStage::Templating => "TEMPLATING",
            PipelineStage::Executing => "EXECUTING",
            PipelineStage::Metadata => "METADATA",
            PipelineStage::Joining => "JOINING",
            PipelineStage::Dropping => "DROPPING",
            PipelineStage::Done => "DONE",
        }
    }

    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Staging => Some(PipelineStage::ResolvingCatalog),
            PipelineStage::ResolvingCatalog => Some(PipelineStage::Templating),
            PipelineStage::Templating => Some(PipelineStage::Executing),
            PipelineStage::Executing => Some(PipelineStage::Metadata),
            PipelineStage::Metadata => Some(PipelineStage::Joining),
            PipelineStage::Joining => Some(PipelineStage::Dropping),
            PipelineStage::Dropping => Some(PipelineStage::Done),
            PipelineStage::Done => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub query_name: String,
    pub status: QueryStatus,
    pub elapsed_secs: f64,
    pub table_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusReport {
    pub rows: Vec<StatusRow>,
}

impl StatusReport {
    pub fn new(outcomes: &[QueryOutcome], tables: &DestinationTableMap) -> Self {
        let rows = outcomes
            .iter()
            .map(|o| StatusRow {
                query_name: o.query_name.clone(),
                status: o.status,
                elapsed_secs: o.elapsed_secs,
                table_name: tables.resolve(&o.query_name).to_string(),
            })
            .collect();
        Self { rows }
    }

    pub fn failed_queries(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.status == QueryStatus::Failure)
            .map(|r| r.query_name.clone())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.rows.iter().any(|r| r.status == QueryStatus::Failure)
    }

    /// Distinct tables of successful rows, in report order.
    pub fn succeeded_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for row in self.rows.iter().filter(|r| r.status == QueryStatus::Success) {
            if !tables.contains(&row.table_name) {
                tables.push(row.table_name.clone());
            }
        }
        tables
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_width = self
            .rows
            .iter()
            .map(|r| r.query_name.len())
            .max()
            .unwrap_or(0)
            .max("query_name".len());
        writeln!(
            f,
            "{:<name_width$}  {:<7}  {:>13}  table_name",
            "query_name", "status", "query_seconds"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<name_width$}  {:<7}  {:>13.3}  {}",
                row.query_name, row.status, row.elapsed_secs, row.table_name
            )?;
        }
        Ok(())
    }
}
