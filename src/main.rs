use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nomad_tail::api::exec::ExecTransport;
use nomad_tail::api::http::HttpClient;
use nomad_tail::api::AllocationClient;
use nomad_tail::config::{parse_job_specs, WatchConfig};
use nomad_tail::error::Result;
use nomad_tail::shutdown;
use nomad_tail::watch::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "nomad-tail")]
#[command(version)]
#[command(about = "Tails live logs from running Nomad allocations")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Watch jobs and stream their allocation logs to stdout
    Watch(WatchArgs),

    /// Print every job:task pair visible in current allocations
    List(ListArgs),
}

#[derive(Parser, Debug)]
struct WatchArgs {
    /// Comma-separated job:task pairs to watch (the task may be empty,
    /// e.g. "svc:worker,api:")
    #[arg(long, env = "NOMAD_TAIL_JOBS")]
    jobs: String,

    /// Nomad HTTP API address
    #[arg(long, short = 'a', env = "NOMAD_TAIL_ADDR", default_value = "http://127.0.0.1:4646")]
    addr: String,

    /// Seconds between allocation discovery polls (at least 1)
    #[arg(
        long,
        env = "NOMAD_TAIL_POLL_INTERVAL_SECS",
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval_secs: u64,

    /// Stream logs by shelling out to the nomad CLI instead of the HTTP API
    #[arg(long, env = "NOMAD_TAIL_EXEC")]
    exec: bool,

    /// Command prefix for --exec (e.g. "vagrant ssh client -- nomad")
    #[arg(long, env = "NOMAD_TAIL_EXEC_COMMAND", default_value = "nomad")]
    exec_command: String,
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// Nomad HTTP API address
    #[arg(long, short = 'a', env = "NOMAD_TAIL_ADDR", default_value = "http://127.0.0.1:4646")]
    addr: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("nomad-tail: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Commands::Watch(watch_args) => run_watch(watch_args).await,
        Commands::List(list_args) => run_list(list_args).await,
    }
}

async fn run_watch(args: WatchArgs) -> Result<()> {
    // Validate the spec list before touching the network.
    let specs = parse_job_specs(&args.jobs)?;

    let config = WatchConfig {
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        ..WatchConfig::default()
    };

    let http = HttpClient::new(&args.addr)?;
    let client: Arc<dyn AllocationClient> = if args.exec {
        let command = args
            .exec_command
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Arc::new(ExecTransport::new(http, command)?)
    } else {
        Arc::new(http)
    };

    let shutdown = shutdown::install_shutdown_handler()?;
    Supervisor::new(config, client)
        .run(specs, shutdown, tokio::io::stdout())
        .await
}

async fn run_list(args: ListArgs) -> Result<()> {
    let client = HttpClient::new(&args.addr)?;

    let mut pairs = BTreeSet::new();
    for stub in client.list_allocations().await? {
        let detail = match client.get_allocation(&stub.id).await {
            Ok(detail) => detail,
            Err(e) => {
                tracing::debug!(alloc_id = %stub.id, error = %e, "allocation gone, skipping");
                continue;
            }
        };
        for task in &detail.task_names {
            pairs.insert(format!("{}:{}", detail.job_id, task));
        }
    }

    for pair in pairs {
        println!("{pair}");
    }
    Ok(())
}
