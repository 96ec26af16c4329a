use metrics::{counter, gauge, histogram};

use crate::domain::{PipelineStage, QueryOutcome, QueryStatus};

pub fn record_query_outcome(outcome: &QueryOutcome) {
    let status = outcome.status.to_string();
    counter!("feature_queries_total", "status" => status).increment(1);
    if outcome.status == QueryStatus::Success {
        histogram!("feature_query_duration_seconds").record(outcome.elapsed_secs);
    }
}

pub fn record_stage_complete(stage: PipelineStage) {
    counter!("pipeline_stages_completed_total", "stage" => stage.as_str()).increment(1);
}

pub fn set_in_flight_queries(count: usize) {
    gauge!("feature_queries_in_flight").set(count as f64);
}

pub fn record_tables_dropped(succeeded: usize, failed: usize) {
    counter!("intermediate_tables_dropped_total").increment(succeeded as u64);
    counter!("intermediate_tables_drop_failed_total").increment(failed as u64);
}
