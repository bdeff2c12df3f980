use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dgrep::client::{load_workers, Dispatcher, QueryResult};
use dgrep::config::{DispatchConfig, ServerConfig};
use dgrep::server::Server;
use dgrep::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "dgrep")]
#[command(version)]
#[command(about = "Run a grep query on a roster of worker machines and collect the results")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a worker server that answers grep queries
    Server(ServerArgs),

    /// Send a grep query to every worker and print the results
    Query(QueryArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, short = 'l', default_value = "0.0.0.0:6120")]
    listen: SocketAddr,

    /// Maximum number of connections handled at once
    #[arg(long, default_value = "256")]
    max_connections: usize,

    /// Milliseconds a client has to send its query after connecting
    #[arg(long, default_value = "5000")]
    read_timeout_ms: u64,

    /// Milliseconds shutdown waits for in-flight connections
    #[arg(long, default_value = "5000")]
    drain_timeout_ms: u64,

    /// Maximum number of query bytes read from a client
    #[arg(long, default_value = "1024")]
    query_buffer_size: usize,

    /// Shell used to run queries
    #[arg(long, default_value = "sh")]
    shell: String,
}

// =============================================================================
// Query Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct QueryArgs {
    /// File listing worker addresses, one host:port per line
    #[arg(long, short = 's', required_unless_present = "workers", conflicts_with = "workers")]
    servers: Option<PathBuf>,

    /// Worker address (repeatable), instead of a servers file
    #[arg(long = "worker", short = 'w')]
    workers: Vec<String>,

    /// Milliseconds allowed for connecting to a worker
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// Milliseconds allowed for sending the query and reading the response
    #[arg(long, default_value = "5000")]
    io_timeout_ms: u64,

    /// Maximum number of workers queried at once
    #[arg(long, default_value = "64")]
    max_in_flight: usize,

    /// Responses longer than this many bytes are truncated
    #[arg(long, default_value = "2048")]
    response_buffer_size: usize,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    /// The grep command to run (e.g., "grep -c 'POST /' app.log")
    query: String,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct QueryOutput<'a> {
    query: &'a str,
    responded: usize,
    results: &'a [QueryResult],
}

// =============================================================================
// Command Handlers
// =============================================================================

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::new(args.listen)
        .with_max_connections(args.max_connections)
        .with_read_timeout_ms(args.read_timeout_ms)
        .with_drain_timeout_ms(args.drain_timeout_ms)
        .with_query_buffer_size(args.query_buffer_size)
        .with_shell(args.shell);

    tracing::info!(
        listen_addr = %config.listen_addr,
        max_connections = config.max_connections,
        read_timeout_ms = config.read_timeout_ms,
        drain_timeout_ms = config.drain_timeout_ms,
        shell = %config.executor.shell,
        "Starting dgrep worker"
    );

    let shutdown = install_shutdown_handler();
    let server = Server::bind(config).await?;
    server.run(shutdown).await?;
    Ok(())
}

async fn run_query(args: QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    // A worker list that cannot be read skips the dispatch entirely
    let workers = match &args.servers {
        Some(path) => load_workers(path).await?,
        None => args.workers.clone(),
    };

    let config = DispatchConfig::default()
        .with_connect_timeout_ms(args.connect_timeout_ms)
        .with_io_timeout_ms(args.io_timeout_ms)
        .with_max_in_flight(args.max_in_flight)
        .with_response_buffer_size(args.response_buffer_size);

    let results = Dispatcher::new(config).dispatch(&workers, &args.query).await;

    match args.output {
        OutputFormat::Json => {
            let output = QueryOutput {
                query: &args.query,
                responded: results.iter().filter(|r| r.is_success()).count(),
                results: &results,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            // Failed and empty workers stay in the aggregate but are not shown
            for line in results.iter().filter_map(QueryResult::display_line) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Query(query_args) => run_query(query_args).await?,
    }

    Ok(())
}
