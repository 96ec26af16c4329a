use tracing::debug;

use crate::domain::ColumnMetadata;
use crate::error::Result;
use crate::executor::ExecutorBackend;

/// Introspects the columns of every given table. An empty list never
/// reaches the engine.
pub async fn collect_metadata(
    executor: &dyn ExecutorBackend,
    schema: &str,
    tables: &[String],
) -> Result<Vec<ColumnMetadata>> {
    if tables.is_empty() {
        return Ok(Vec::new());
    }
    let columns = executor.table_columns(schema, tables).await?;
    debug!(tables = tables.len(), columns = columns.len(), "Metadata collected");
    Ok(columns)
}
