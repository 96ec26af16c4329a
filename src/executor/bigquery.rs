use std::time::{Duration, Instant};

use async_trait::async_trait;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::job::get::GetJobRequest;
use google_cloud_bigquery::http::job::get_query_results::GetQueryResultsRequest;
use google_cloud_bigquery::http::job::query::QueryRequest;
use google_cloud_bigquery::http::job::JobState;
use google_cloud_bigquery::http::table::{TableFieldType, TableSchema};
use google_cloud_bigquery::http::tabledata::list::{Tuple, Value as BqValue};
use serde_json::Value as JsonValue;

use super::{ColumnInfo, ExecutorBackend, ExecutorMode, QueryResult};
use crate::error::{Error, Result};

pub struct BigQueryExecutor {
    client: Client,
    project_id: String,
    location: Option<String>,
}

impl BigQueryExecutor {
    /// Authenticates with application default credentials. `project_id`
    /// overrides the project bound to the credentials.
    pub async fn new(project_id: Option<String>, location: Option<String>) -> Result<Self> {
        let (config, credentials_project) = ClientConfig::new_with_auth()
            .await
            .map_err(|e| Error::BigQuery(format!("Failed to authenticate: {}", e)))?;

        let project_id = project_id.or(credentials_project).ok_or_else(|| {
            Error::Config("project_id needs to be specified for the bigquery backend".into())
        })?;

        let client = Client::new(config)
            .await
            .map_err(|e| Error::BigQuery(format!("Failed to create BigQuery client: {}", e)))?;

        Ok(Self {
            client,
            project_id,
            location,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Blocks until the job reaches DONE. There is no deadline: a long query
    /// holds its worker until BigQuery finishes it.
    async fn wait_for_job(&self, job_id: &str) -> Result<()> {
        let start = Instant::now();
        let mut interval = Duration::from_millis(500);
        let max_interval = Duration::from_secs(30);
        let mut poll_count = 0u32;

        loop {
            poll_count += 1;
            if poll_count % 10 == 0 {
                tracing::info!(
                    job_id = %job_id,
                    poll_count = poll_count,
                    elapsed_secs = start.elapsed().as_secs(),
                    "BigQuery job polling in progress"
                );
            }

            let request = GetJobRequest {
                location: self.location.clone(),
            };
            let job = self
                .client
                .job()
                .get(&self.project_id, job_id, &request)
                .await
                .map_err(|e| Error::BigQuery(format!("Failed to get job status: {}", e)))?;

            if job.status.state == JobState::Done {
                if let Some(err) = &job.status.error_result {
                    return Err(Error::BigQuery(format!(
                        "Job {} failed: {:?}",
                        job_id, err.message
                    )));
                }
                tracing::debug!(
                    job_id = %job_id,
                    poll_count = poll_count,
                    elapsed_secs = start.elapsed().as_secs(),
                    "BigQuery job completed"
                );
                return Ok(());
            }

            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(max_interval);
        }
    }

    async fn fetch_result_pages(
        &self,
        job_id: &str,
        mut page_token: Option<String>,
        columns: &mut Vec<ColumnInfo>,
        rows: &mut Vec<Vec<JsonValue>>,
    ) -> Result<()> {
        loop {
            let request = GetQueryResultsRequest {
                page_token: page_token.clone(),
                location: self.location.clone(),
                ..Default::default()
            };
            let page = self
                .client
                .job()
                .get_query_results(&self.project_id, job_id, &request)
                .await
                .map_err(|e| Error::BigQuery(format!("Failed to fetch query results: {}", e)))?;

            if columns.is_empty() {
                *columns = schema_columns(page.schema.as_ref());
            }
            rows.extend(page.rows.unwrap_or_default().into_iter().map(tuple_to_row));

            match page.page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(()),
            }
        }
    }

    async fn submit(&self, sql: &str) -> Result<QueryResult> {
        let request = QueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
            ..Default::default()
        };

        let response = self
            .client
            .job()
            .query(&self.project_id, &request)
            .await
            .map_err(|e| Error::BigQuery(format!("Query failed: {}\n\nSQL: {}", e, sql)))?;

        let job_id = response.job_reference.job_id.clone();
        tracing::debug!(job_id = %job_id, complete = response.job_complete, "BigQuery job submitted");

        let mut columns = schema_columns(response.schema.as_ref());
        let mut rows: Vec<Vec<JsonValue>> = response
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(tuple_to_row)
            .collect();

        if !response.job_complete {
            self.wait_for_job(&job_id).await?;
            rows.clear();
            self.fetch_result_pages(&job_id, None, &mut columns, &mut rows)
                .await?;
        } else if let Some(token) = response.page_token.filter(|t| !t.is_empty()) {
            self.fetch_result_pages(&job_id, Some(token), &mut columns, &mut rows)
                .await?;
        }

        Ok(QueryResult { columns, rows })
    }

    async fn submit_statement(&self, sql: &str) -> Result<u64> {
        let request = QueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
            ..Default::default()
        };

        let response = self
            .client
            .job()
            .query(&self.project_id, &request)
            .await
            .map_err(|e| Error::BigQuery(format!("Statement failed: {}\n\nSQL: {}", e, sql)))?;

        if !response.job_complete {
            self.wait_for_job(&response.job_reference.job_id).await?;
        }

        Ok(response.num_dml_affected_rows.unwrap_or(0) as u64)
    }
}

#[async_trait]
impl ExecutorBackend for BigQueryExecutor {
    fn mode(&self) -> ExecutorMode {
        ExecutorMode::BigQuery
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.submit(sql).await
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        self.submit_statement(sql).await
    }
}

fn schema_columns(schema: Option<&TableSchema>) -> Vec<ColumnInfo> {
    schema
        .map(|s| {
            s.fields
                .iter()
                .map(|field| ColumnInfo {
                    name: field.name.clone(),
                    data_type: bq_type_to_string(&field.data_type).to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn tuple_to_row(tuple: Tuple) -> Vec<JsonValue> {
    tuple.f.into_iter().map(|cell| bq_value_to_json(cell.v)).collect()
}

fn bq_type_to_string(field_type: &TableFieldType) -> &'static str {
    match field_type {
        TableFieldType::String => "STRING",
        TableFieldType::Bytes => "BYTES",
        TableFieldType::Integer | TableFieldType::Int64 => "INT64",
        TableFieldType::Float | TableFieldType::Float64 => "FLOAT64",
        TableFieldType::Boolean | TableFieldType::Bool => "BOOLEAN",
        TableFieldType::Timestamp => "TIMESTAMP",
        TableFieldType::Record | TableFieldType::Struct => "STRUCT",
        TableFieldType::Date => "DATE",
        TableFieldType::Time => "TIME",
        TableFieldType::Datetime => "DATETIME",
        TableFieldType::Numeric | TableFieldType::Decimal => "NUMERIC",
        TableFieldType::Bignumeric | TableFieldType::Bigdecimal => "BIGNUMERIC",
        TableFieldType::Interval => "INTERVAL",
        TableFieldType::Json => "JSON",
    }
}

fn bq_value_to_json(value: BqValue) -> JsonValue {
    match value {
        BqValue::Null => JsonValue::Null,
        BqValue::String(s) => JsonValue::String(s),
        BqValue::Array(cells) => {
            JsonValue::Array(cells.into_iter().map(|c| bq_value_to_json(c.v)).collect())
        }
        BqValue::Struct(tuple) => JsonValue::Array(tuple_to_row(tuple)),
    }
}
