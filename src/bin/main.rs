//! dashq CLI - Compile and run dashboard query descriptors
//!
//! Usage:
//!   dashq compile <spec.json> [--project <id>] [--dialect <dialect>]
//!   dashq columns [--table <name>]
//!   dashq run <spec.json> --project <id>
//!
//! Examples:
//!   dashq compile tokens_by_model.json --project p1
//!   dashq compile tokens_by_model.json --project p1 --dialect clickhouse --output verbose
//!   dashq run tokens_by_model.json --project p1 --filter-column timestamp

use clap::{Parser, Subcommand, ValueEnum};
use dashq::access::{AllowAll, QueryContext, Subject};
use dashq::config::Settings;
use dashq::engine::QueryEngine;
use dashq::executor::{QueryExecutor, WorkerBackend};
use dashq::planner::ColumnRewrite;
use dashq::registry::ColumnRegistry;
use dashq::spec::QuerySpec;
use dashq::sql::Dialect;
use dashq::worker::WorkerClient;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dashq")]
#[command(about = "dashq - Declarative dashboard queries compiled to validated SQL")]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults to $DASHQ_CONFIG, ./dashq.toml, ~/.config/dashq/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a query descriptor and print its SQL
    Compile {
        /// Path to the JSON query descriptor
        file: PathBuf,

        /// Project the query is scoped to
        #[arg(short, long, default_value = "local")]
        project: String,

        /// SQL dialect to generate (defaults to query.dialect from config)
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        /// Force every filter onto this column
        #[arg(long)]
        filter_column: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,
    },

    /// List registry tables and their columns
    Columns {
        /// Only list this table
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Execute a query descriptor through the database worker
    Run {
        /// Path to the JSON query descriptor
        file: PathBuf,

        /// Project the query is scoped to
        #[arg(short, long)]
        project: String,

        /// Force every filter onto this column
        #[arg(long)]
        filter_column: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Postgres,
    Duckdb,
    Clickhouse,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Clickhouse => Dialect::ClickHouse,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Output SQL only
    Sql,
    /// Output SQL with output columns as comments
    Verbose,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings);

    let registry = match settings.registry() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Compile {
            file,
            project,
            dialect,
            filter_column,
            output,
        } => cmd_compile(
            &settings,
            registry,
            file,
            &project,
            dialect,
            rewrite(filter_column),
            output,
        ),
        Commands::Columns { table } => cmd_columns(&registry, table),
        Commands::Run {
            file,
            project,
            filter_column,
        } => cmd_run(&settings, registry, file, &project, rewrite(filter_column)),
    }
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(
            std::env::var("RUST_LOG").unwrap_or_else(|_| settings.logging.filter.clone()),
        );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn rewrite(filter_column: Option<String>) -> ColumnRewrite {
    filter_column.map(ColumnRewrite::Force).unwrap_or_default()
}

fn read_spec(file: &Path) -> Result<QuerySpec, String> {
    let source = fs::read_to_string(file)
        .map_err(|e| format!("Error reading file '{}': {}", file.display(), e))?;
    QuerySpec::from_json(&source).map_err(|e| e.to_string())
}

fn context(project: &str) -> QueryContext {
    let user = std::env::var("USER").unwrap_or_else(|_| "cli".to_string());
    QueryContext::new(Subject::new(&user), project)
}

fn cmd_compile(
    settings: &Settings,
    registry: Arc<ColumnRegistry>,
    file: PathBuf,
    project: &str,
    dialect: Option<DialectArg>,
    rewrite: ColumnRewrite,
    output: OutputFormat,
) -> ExitCode {
    let spec = match read_spec(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // Compilation never reaches a backend, so an empty one is enough.
    let backend = Arc::new(dashq::executor::MemoryBackend::default());
    let engine = QueryEngine::from_settings(settings, registry, Arc::new(AllowAll), backend);

    let plan = match engine.compile(&context(project), &spec, &rewrite) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Compilation error ({}): {}", e.stage(), e);
            return ExitCode::FAILURE;
        }
    };

    let dialect = dialect.map(Dialect::from).unwrap_or(settings.query.dialect);
    let sql = plan.to_sql(dialect);

    match output {
        OutputFormat::Sql => println!("{}", sql),
        OutputFormat::Verbose => {
            println!("-- dashq compiled SQL");
            println!("-- Source: {}", file.display());
            println!("-- Table: {} ({})", plan.table, plan.physical_table);
            println!("-- Dialect: {}", dialect);
            for output in &plan.outputs {
                println!("-- Output: {} ({})", output.name, output.value_type());
            }
            println!();
            println!("{}", sql);
        }
    }
    ExitCode::SUCCESS
}

fn cmd_columns(registry: &ColumnRegistry, table: Option<String>) -> ExitCode {
    let tables: Vec<String> = match table {
        Some(t) => vec![t],
        None => registry.table_names().map(String::from).collect(),
    };

    for name in &tables {
        let columns = match registry.list_columns(name) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        };

        println!("{}:", name);
        for col in columns {
            let mut line = format!("  - {} ({}, physical: {})", col.name, col.value_type, col.physical);
            if col.aggregatable {
                line.push_str(" [aggregatable]");
            }
            if !col.variants.is_empty() {
                line.push_str(&format!(" [{}]", col.variants.join(", ")));
            }
            println!("{}", line);
        }
        println!();
    }

    ExitCode::SUCCESS
}

fn cmd_run(
    settings: &Settings,
    registry: Arc<ColumnRegistry>,
    file: PathBuf,
    project: &str,
    rewrite: ColumnRewrite,
) -> ExitCode {
    let spec = match read_spec(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let worker = &settings.worker;
        let (path, connection_string) =
            match (worker.worker_path(), worker.resolved_connection_string()) {
                (Ok(p), Ok(c)) => (p, c),
                (Err(e), _) | (_, Err(e)) => {
                    eprintln!("Configuration error: {}", e);
                    return ExitCode::FAILURE;
                }
            };

        // The worker's own deadline sits just past the executor's.
        let client_timeout = Duration::from_millis(settings.query.timeout_ms + 1000);
        let client =
            match WorkerClient::spawn_with_args_and_timeout(&path, &worker.args, client_timeout)
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Failed to start worker '{}': {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            };
        info!(path = %path.display(), driver = %worker.driver, "worker started");

        let backend = WorkerBackend::new(client, &worker.driver, &connection_string)
            .with_statement_timeout_ms(settings.query.timeout_ms)
            .with_max_rows(settings.query.hard_row_cap);
        let executor =
            QueryExecutor::new(Arc::new(backend)).with_options(settings.query.executor_options());
        let engine = QueryEngine::new(registry, Arc::new(AllowAll), executor)
            .with_max_rows(settings.query.max_rows);

        match engine
            .run(&context(project), &spec, &rewrite, &CancellationToken::new())
            .await
        {
            Ok(rows) => {
                info!(rows = rows.len(), "query finished");
                match serde_json::to_string_pretty(&rows) {
                    Ok(json) => {
                        println!("{}", json);
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        eprintln!("Failed to serialize rows: {}", e);
                        ExitCode::FAILURE
                    }
                }
            }
            Err(e) => {
                eprintln!("Query failed ({}): {}", e.stage(), e);
                if let Some(after) = e.retry_after() {
                    eprintln!("Retriable after {} ms", after.as_millis());
                }
                ExitCode::FAILURE
            }
        }
    })
}
