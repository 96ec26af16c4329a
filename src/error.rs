use thiserror::Error;

use crate::domain::{PipelineStage, StatusReport};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("BigQuery error: {0}")]
    BigQuery(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("One or more feature queries failed: {}", .failed.join(", "))]
    QueriesFailed {
        failed: Vec<String>,
        report: StatusReport,
        undropped: Vec<String>,
    },

    #[error("{stage} stage failed: {message}")]
    Stage {
        stage: PipelineStage,
        message: String,
        undropped: Vec<String>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Validation(_) => 3,
            Error::QueriesFailed { .. } => 4,
            Error::Stage { .. } => 5,
            Error::Catalog(_) => 6,
            Error::Executor(_) | Error::BigQuery(_) => 7,
            Error::Json(_) | Error::Io(_) | Error::Internal(_) => 1,
        }
    }

    pub fn with_context(self, stage: PipelineStage, query: Option<&str>) -> Self {
        let context = match query {
            Some(name) => format!("[stage={}, query={}]", stage, name),
            None => format!("[stage={}]", stage),
        };

        match self {
            Error::Executor(msg) => Error::Executor(format!("{} {}", context, msg)),
            Error::BigQuery(msg) => Error::BigQuery(format!("{} {}", context, msg)),
            Error::Internal(msg) => Error::Internal(format!("{} {}", context, msg)),
            other => other,
        }
    }

    /// Wraps an engine failure in a later stage, recording the intermediate
    /// tables that were not dropped.
    pub fn at_stage(self, stage: PipelineStage, undropped: Vec<String>) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                message: other.to_string(),
                undropped,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("schema needs to be specified".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: schema needs to be specified"
        );
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("y column was not found".to_string());
        assert_eq!(format!("{}", err), "Validation error: y column was not found");
    }

    #[test]
    fn test_error_display_queries_failed() {
        let err = Error::QueriesFailed {
            failed: vec!["team_wins".to_string(), "team_losses".to_string()],
            report: StatusReport::default(),
            undropped: vec![],
        };
        assert_eq!(
            format!("{}", err),
            "One or more feature queries failed: team_wins, team_losses"
        );
    }

    #[test]
    fn test_error_display_stage() {
        let err = Error::Stage {
            stage: PipelineStage::Metadata,
            message: "boom".to_string(),
            undropped: vec![],
        };
        assert_eq!(format!("{}", err), "METADATA stage failed: boom");
    }

    #[test]
    fn test_error_display_json() {
        let json_err: serde_json::Error = serde_json::from_str::<()>("invalid").unwrap_err();
        let err = Error::Json(json_err);
        assert!(format!("{}", err).starts_with("JSON error:"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Config("x".into()).exit_code(), 2);
        assert_eq!(Error::Validation("x".into()).exit_code(), 3);
        let failed = Error::QueriesFailed {
            failed: vec![],
            report: StatusReport::default(),
            undropped: vec![],
        };
        assert_eq!(failed.exit_code(), 4);
        assert_eq!(Error::Executor("x".into()).exit_code(), 7);
        assert_eq!(Error::Internal("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_with_context_executor_with_query() {
        let err = Error::Executor("failed".to_string());
        let contextualized = err.with_context(PipelineStage::Executing, Some("team_wins"));
        match contextualized {
            Error::Executor(msg) => {
                assert!(msg.contains("[stage=EXECUTING, query=team_wins]"));
                assert!(msg.contains("failed"));
            }
            _ => panic!("Expected Executor variant"),
        }
    }

    #[test]
    fn test_with_context_executor_without_query() {
        let err = Error::Executor("failed".to_string());
        match err.with_context(PipelineStage::Staging, None) {
            Error::Executor(msg) => assert!(msg.starts_with("[stage=STAGING] ")),
            _ => panic!("Expected Executor variant"),
        }
    }

    #[test]
    fn test_with_context_passthrough_validation() {
        let err = Error::Validation("bad".to_string());
        match err.with_context(PipelineStage::Staging, None) {
            Error::Validation(msg) => assert_eq!(msg, "bad"),
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn test_at_stage_records_undropped_tables() {
        let err = Error::Executor("metadata query failed".to_string())
            .at_stage(PipelineStage::Metadata, vec!["ds.a".to_string()]);
        match err {
            Error::Stage {
                stage,
                message,
                undropped,
            } => {
                assert_eq!(stage, PipelineStage::Metadata);
                assert!(message.contains("metadata query failed"));
                assert_eq!(undropped, vec!["ds.a".to_string()]);
            }
            _ => panic!("Expected Stage variant"),
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
