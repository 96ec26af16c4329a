use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use feature_factory::{
    Config, DateRange, Error, FeatureFactory, LogFormat, QueryResult, QuerySelection, RunOutput,
    RunRequest,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Mock,
    Bigquery,
}

impl From<Backend> for feature_factory::Backend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Mock => feature_factory::Backend::Mock,
            Backend::Bigquery => feature_factory::Backend::Bigquery,
        }
    }
}

#[derive(Parser)]
#[command(name = "feature-factory")]
#[command(about = "Builds coldstart feature tables from a catalog of SQL feature queries")]
struct Cli {
    #[arg(long, global = true, help = "Path to configuration file (TOML)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory holding the query catalog")]
    catalog_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "SQL dialect of the engine (bigquery)")]
    dialect: Option<String>,

    #[arg(long, global = true, help = "Dataset that receives generated tables")]
    schema: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        help = "Execution backend: mock (YachtSQL) or bigquery (real BigQuery)"
    )]
    backend: Option<Backend>,

    #[arg(long, global = true, help = "GCP project for the bigquery backend")]
    project_id: Option<String>,

    #[arg(long, global = true, help = "Upper bound on concurrently running queries")]
    max_workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stage the leftmost table, run the selected feature queries and join them.
    Run(RunArgs),
    /// Dialects present in the catalog.
    ListDialects,
    /// Entities available for the configured dialect.
    ListEntities,
    /// Domains available for an entity.
    ListDomains {
        #[arg(long)]
        entity_id: String,
    },
    /// Queries available for an entity, optionally narrowed to some domains.
    ListQueries {
        #[arg(long)]
        entity_id: String,
        #[arg(long, value_delimiter = ',')]
        domains: Option<Vec<String>>,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, help = "Fully qualified anchor table with the entity and y columns")]
    leftmost_table: String,

    #[arg(long)]
    entity_id: String,

    #[arg(long, help = "Destination of the joined feature table")]
    feature_table: Option<String>,

    #[arg(long, value_delimiter = ',')]
    domains: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',', help = "Query names; takes priority over --domains")]
    queries: Option<Vec<String>>,

    #[arg(long, requires = "max_date", help = "yyyy-mm-dd lower bound applied to every row")]
    min_date: Option<String>,

    #[arg(long, requires = "min_date", help = "yyyy-mm-dd upper bound applied to every row")]
    max_date: Option<String>,

    #[arg(long, help = "Copy the selected query files into this directory")]
    export_dir: Option<PathBuf>,

    #[arg(long)]
    stop_on_error: bool,

    #[arg(long, help = "Leave intermediate tables in place after the join")]
    keep_intermediate_tables: bool,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long, help = "Write the feature rows to this file as JSON")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return exit_code(e.exit_code());
        }
    };

    init_tracing(&config);

    match execute(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "feature-factory failed");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            exit_code(code)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn load_config(cli: &Cli) -> feature_factory::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(dir) = &cli.catalog_dir {
        config.run.catalog_dir = Some(dir.clone());
    }
    if let Some(dialect) = &cli.dialect {
        config.engine.dialect = Some(dialect.clone());
    }
    if let Some(schema) = &cli.schema {
        config.engine.schema = Some(schema.clone());
    }
    if let Some(backend) = cli.backend {
        config.engine.backend = backend.into();
    }
    if let Some(project_id) = &cli.project_id {
        config.engine.project_id = Some(project_id.clone());
    }
    if let Some(max_workers) = cli.max_workers {
        config.run.max_workers = max_workers;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn execute(command: Command, config: &Config) -> anyhow::Result<()> {
    let factory = FeatureFactory::from_config(config).await?;

    match command {
        Command::Run(args) => {
            let output_path = args.output.clone();
            let request = build_request(args, config)?;
            let output = factory.run(&request).await.inspect_err(report_failure)?;
            report(&output);
            if let (Some(path), Some(rows)) = (output_path, &output.rows) {
                write_rows(&path, rows)?;
            }
        }
        Command::ListDialects => print_list(factory.list_dialects()),
        Command::ListEntities => print_list(factory.list_entities()?),
        Command::ListDomains { entity_id } => print_list(factory.list_domains(&entity_id)?),
        Command::ListQueries { entity_id, domains } => {
            print_list(factory.list_queries(&entity_id, domains.as_deref())?)
        }
    }
    Ok(())
}

fn build_request(args: RunArgs, config: &Config) -> feature_factory::Result<RunRequest> {
    let mut request =
        RunRequest::new(args.leftmost_table, args.entity_id).with_run_config(&config.run);
    request.feature_table = args.feature_table;
    request.selection = QuerySelection::from_parts(args.domains, args.queries);
    request.date_range = match (args.min_date, args.max_date) {
        (Some(min), Some(max)) => Some(DateRange::new(min, max)),
        (None, None) => None,
        _ => {
            return Err(Error::Config(
                "min_date and max_date must be given together".into(),
            ))
        }
    };
    request.export_dir = args.export_dir;
    request.stop_on_error |= args.stop_on_error;
    if args.keep_intermediate_tables {
        request.drop_intermediate_tables = false;
    }
    if args.batch_size.is_some() {
        request.batch_size = args.batch_size;
    }
    request.return_rows = args.output.is_some();
    Ok(request)
}

fn report(output: &RunOutput) {
    print!("{}", output.report);
    info!(
        table = %output.table,
        failed = output.report.failed_queries().len(),
        dropped = output.dropped.len(),
        "Run finished"
    );
    println!("feature table: {}", output.table);
}

/// Aborted runs still print what ran and which tables were left behind.
fn report_failure(err: &Error) {
    let undropped = match err {
        Error::QueriesFailed {
            report, undropped, ..
        } => {
            print!("{}", report);
            undropped
        }
        Error::Stage { undropped, .. } => undropped,
        _ => return,
    };
    for table in undropped {
        println!("not dropped: {}", table);
    }
}

fn write_rows(path: &Path, rows: &QueryResult) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(rows).context("Failed to serialize feature rows")?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write feature rows to {}", path.display()))?;
    Ok(())
}

fn print_list(values: Vec<String>) {
    for value in values {
        println!("{}", value);
    }
}
