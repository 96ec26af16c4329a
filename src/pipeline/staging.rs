use std::time::Instant;

use serde_json::Value as JsonValue;
use tracing::info;

use crate::domain::{
    AnchorSpec, PipelineStage, QueryOutcome, QueryResult, ANCHOR_QUERY_NAME, MAX_DATE_COLUMN,
    MIN_DATE_COLUMN, OUTCOME_COLUMN,
};
use crate::error::{Error, Result};
use crate::executor::ExecutorBackend;
use crate::metrics;
use crate::validation::{
    is_valid_date, quote_literal, validate_date_range, validate_identifier, validate_table_name,
};

use super::naming::TableNamer;

/// Validates the anchor table and materializes it with the synthetic `idx`
/// key. Nothing is created when validation fails.
pub async fn stage_leftmost_table(
    executor: &dyn ExecutorBackend,
    namer: &TableNamer,
    spec: &AnchorSpec,
) -> Result<(String, QueryOutcome)> {
    validate_table_name(&spec.leftmost_table)?;
    validate_identifier("entity_id", &spec.entity_id)?;
    if let Some(range) = &spec.date_range {
        validate_date_range(range)?;
    }

    let anchor = executor
        .execute_query(&format!("SELECT * FROM {}", spec.leftmost_table))
        .await
        .map_err(|e| e.with_context(PipelineStage::Staging, Some(ANCHOR_QUERY_NAME)))?;
    validate_anchor(&anchor, spec)?;

    let staged = namer.name(ANCHOR_QUERY_NAME);
    let sql = staging_sql(&staged, spec);

    let start = Instant::now();
    executor
        .execute_statement(&sql)
        .await
        .map_err(|e| e.with_context(PipelineStage::Staging, Some(ANCHOR_QUERY_NAME)))?;
    let outcome = QueryOutcome::success(ANCHOR_QUERY_NAME, start.elapsed());
    metrics::record_query_outcome(&outcome);

    info!(
        table = %staged,
        rows = anchor.row_count(),
        elapsed_secs = outcome.elapsed_secs,
        "Leftmost table staged"
    );
    Ok((staged, outcome))
}

fn validate_anchor(anchor: &QueryResult, spec: &AnchorSpec) -> Result<()> {
    for column in [spec.entity_id.as_str(), OUTCOME_COLUMN] {
        if !anchor.has_column(column) {
            return Err(Error::Validation(format!(
                "{} column was not found in {}",
                column, spec.leftmost_table
            )));
        }
    }

    if spec.date_range.is_some() {
        return Ok(());
    }

    for column in [MIN_DATE_COLUMN, MAX_DATE_COLUMN] {
        let values = anchor.column_values(column).ok_or_else(|| {
            Error::Validation(format!(
                "{} column was not found in {} and no date_range was given",
                column, spec.leftmost_table
            ))
        })?;
        for value in values {
            let valid = matches!(value, JsonValue::String(s) if is_valid_date(s));
            if !valid {
                return Err(Error::Validation(format!(
                    "{} contains a value that is not a yyyy-mm-dd date: {}",
                    column, value
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn staging_sql(staged: &str, spec: &AnchorSpec) -> String {
    let (lo, hi) = match &spec.date_range {
        Some(range) => (quote_literal(&range.min_date), quote_literal(&range.max_date)),
        None => (
            format!("CAST(LT.{} AS STRING)", MIN_DATE_COLUMN),
            format!("CAST(LT.{} AS STRING)", MAX_DATE_COLUMN),
        ),
    };
    format!(
        "CREATE TABLE {staged} AS SELECT CONCAT(CAST(LT.{entity} AS STRING), '_', {lo}, '_', {hi}) AS idx, \
         LT.{entity}, LT.{y}, CAST({lo} AS DATE) AS {min}, CAST({hi} AS DATE) AS {max} FROM {anchor} AS LT",
        staged = staged,
        entity = spec.entity_id,
        y = OUTCOME_COLUMN,
        lo = lo,
        hi = hi,
        min = MIN_DATE_COLUMN,
        max = MAX_DATE_COLUMN,
        anchor = spec.leftmost_table,
    )
}
