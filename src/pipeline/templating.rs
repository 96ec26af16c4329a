use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{DestinationTableMap, QueryDescriptor, LEFTMOST_PLACEHOLDER};
use crate::executor::ExecutorBackend;

use super::naming::TableNamer;
use super::runner::QueryTask;

/// Binds the staged table into each query body and gives every query its own
/// destination table. Bodies are not validated.
pub fn template_queries(
    executor: &Arc<dyn ExecutorBackend>,
    namer: &TableNamer,
    staged_table: &str,
    queries: &BTreeMap<String, QueryDescriptor>,
) -> (DestinationTableMap, Vec<QueryTask>) {
    let mut tables = DestinationTableMap::new();
    let mut tasks = Vec::with_capacity(queries.len());

    for (name, descriptor) in queries {
        let destination = namer.name(name);
        let sql = format!(
            "CREATE TABLE {} AS {}",
            destination,
            descriptor.sql.replace(LEFTMOST_PLACEHOLDER, staged_table)
        );
        tasks.push(QueryTask::new(name.clone(), Arc::clone(executor), sql));
        tables.insert(name.clone(), destination);
    }

    (tables, tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedExecutor;
    use std::path::PathBuf;

    fn descriptor(name: &str, sql: &str) -> QueryDescriptor {
        QueryDescriptor {
            name: name.to_string(),
            dialect: "bigquery".to_string(),
            entity: "team_id".to_string(),
            domain: "wins".to_string(),
            sql: sql.to_string(),
            path: PathBuf::from(format!("{}.sql", name)),
        }
    }

    #[test]
    fn test_template_queries_binds_every_placeholder() {
        let executor: Arc<dyn ExecutorBackend> = Arc::new(ScriptedExecutor::new());
        let namer = TableNamer::new("ds", "coldstart");
        let mut queries = BTreeMap::new();
        queries.insert(
            "team_wins".to_string(),
            descriptor(
                "team_wins",
                "-- DIALECT: bigquery\nSELECT a.idx FROM {LEFTMOST_TABLE} a JOIN {LEFTMOST_TABLE} b USING (idx)",
            ),
        );
        queries.insert("plain".to_string(), descriptor("plain", "SELECT 1 AS idx"));

        let (tables, tasks) = template_queries(&executor, &namer, "ds.staged", &queries);

        assert_eq!(tasks.len(), 2);
        assert_eq!(tables.len(), 2);
        for task in &tasks {
            let destination = tables.table_for(&task.name).unwrap();
            assert!(task.sql.starts_with(&format!("CREATE TABLE {} AS ", destination)));
            assert!(!task.sql.contains(LEFTMOST_PLACEHOLDER));
            assert!(!task.fetch_rows);
            assert_eq!(namer.logical_name(destination).as_deref(), Some(task.name.as_str()));
        }
        let wins = tasks.iter().find(|t| t.name == "team_wins").unwrap();
        assert_eq!(wins.sql.matches("ds.staged").count(), 2);
    }

    #[test]
    fn test_template_queries_empty() {
        let executor: Arc<dyn ExecutorBackend> = Arc::new(ScriptedExecutor::new());
        let namer = TableNamer::new("ds", "coldstart");
        let (tables, tasks) = template_queries(&executor, &namer, "ds.staged", &BTreeMap::new());
        assert!(tables.is_empty());
        assert!(tasks.is_empty());
    }
}
