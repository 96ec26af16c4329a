pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod pipeline;
pub mod validation;

pub use catalog::{Catalog, FileLoader, LoadedFile, QuerySelection};
pub use config::{Backend, Config, EngineConfig, LogFormat, RunConfig};
pub use domain::{
    ColumnMetadata, DateRange, PipelineStage, QueryDescriptor, QueryOutcome, QueryStatus,
    StatusReport,
};
pub use error::{Error, Result};
pub use executor::{
    BigQueryExecutor, ColumnInfo, ExecutorBackend, ExecutorMode, QueryResult, YachtSqlExecutor,
};
pub use pipeline::{FeatureFactory, RunOutput, RunRequest};
