use std::collections::HashSet;

use crate::domain::{ColumnMetadata, DestinationTableMap, KEY_COLUMN, OUTCOME_COLUMN};
use crate::error::{Error, Result};

use super::naming::TableNamer;

const ANCHOR_ALIAS: &str = "LMOST";
const FINAL_TABLE_NAME: &str = "final";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub sql: String,
    pub destination: String,
}

/// Builds the statement joining every feature table onto the staged anchor
/// table by `idx`. Feature columns are aliased `<query>_<column>`.
pub fn synthesize_join(
    namer: &TableNamer,
    rows: &[ColumnMetadata],
    tables: &DestinationTableMap,
    feature_table: Option<&str>,
) -> Result<JoinSpec> {
    let anchor = tables
        .anchor_table()
        .ok_or_else(|| Error::Internal("no staged table registered for the join".into()))?;

    let outcome_column = rows
        .iter()
        .filter(|r| r.table_name == anchor)
        .find(|r| r.column_name.eq_ignore_ascii_case(OUTCOME_COLUMN))
        .map(|r| r.column_name.as_str())
        .ok_or_else(|| {
            if rows.iter().any(|r| r.table_name == anchor) {
                Error::Internal(format!("staged table {} has no {} column", anchor, OUTCOME_COLUMN))
            } else {
                Error::Internal(format!("metadata does not include staged table {}", anchor))
            }
        })?;

    let mut used_names: HashSet<String> = HashSet::new();
    used_names.insert(KEY_COLUMN.to_lowercase());
    used_names.insert(outcome_column.to_lowercase());
    let mut used_aliases: HashSet<String> = HashSet::new();
    used_aliases.insert(ANCHOR_ALIAS.to_lowercase());

    let mut select = vec![
        format!("{}.{}", ANCHOR_ALIAS, KEY_COLUMN),
        format!("{}.{}", ANCHOR_ALIAS, outcome_column),
    ];
    let mut joins: Vec<(String, String)> = Vec::new();

    for row in rows.iter().filter(|r| r.table_name != anchor) {
        let alias = match joins.iter().find(|(table, _)| *table == row.table_name) {
            Some((_, alias)) => alias.clone(),
            None => {
                let base = tables
                    .query_for(&row.table_name)
                    .map(str::to_string)
                    .or_else(|| namer.logical_name(&row.table_name))
                    .unwrap_or_else(|| format!("t{}", joins.len() + 1));
                let alias = unique_name(&base, &mut used_aliases);
                joins.push((row.table_name.clone(), alias.clone()));
                alias
            }
        };

        if row.column_name.eq_ignore_ascii_case(KEY_COLUMN) {
            continue;
        }
        let output = unique_name(&format!("{}_{}", alias, row.column_name), &mut used_names);
        select.push(format!("{}.{} AS {}", alias, row.column_name, output));
    }

    let destination = match feature_table {
        Some(table) => table.to_string(),
        None => namer.name(FINAL_TABLE_NAME),
    };

    let mut sql = format!(
        "CREATE OR REPLACE TABLE {} AS SELECT {} FROM {} AS {}",
        destination,
        select.join(", "),
        anchor,
        ANCHOR_ALIAS
    );
    for (table, alias) in &joins {
        sql.push_str(&format!(
            " LEFT JOIN {table} AS {alias} ON {anchor_alias}.{key} = {alias}.{key}",
            table = table,
            alias = alias,
            anchor_alias = ANCHOR_ALIAS,
            key = KEY_COLUMN
        ));
    }

    Ok(JoinSpec { sql, destination })
}

/// Returns `base`, or `base_<n>` for the first free n, and reserves it.
/// Comparison is case-insensitive to match engine identifier rules.
fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while used.contains(&candidate.to_lowercase()) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    used.insert(candidate.to_lowercase());
    candidate
}
