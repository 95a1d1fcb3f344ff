use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use sift_core::ContentItemRepository;
use sift_worker::{init_tracing, spawn_graph_scheduler, Backends, SiftConfig, SiftService};

#[derive(Parser)]
#[command(name = "sift-worker", version, about = "Content processing worker for sift")]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Use the in-memory store instead of Postgres
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the job worker and graph scheduler until interrupted (default)
    Run,
    /// Recluster topics now, for one organization or all of them
    RebuildGraph {
        #[arg(long)]
        organization: Option<Uuid>,
    },
    /// Print an item's processing status as JSON
    Status { item_id: Uuid },
    /// Retry a failed item from the step that failed
    Retry { item_id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = SiftConfig::from_env();
    if let Some(url) = cli.database_url {
        config = config.with_database_url(url);
    }
    if cli.in_memory {
        config = config.in_memory();
    }

    let _log_guard = init_tracing(&config.log);
    info!(
        log_format = ?config.log.format,
        log_file = ?config.log.file,
        "Logging initialized"
    );

    let service = SiftService::connect(Backends::from_env(), config).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(service).await?,
        Command::RebuildGraph { organization } => {
            let organizations = match organization {
                Some(id) => vec![id],
                None => service.stores().items.list_organization_ids().await?,
            };
            for organization_id in organizations {
                let summary = service.rebuild_knowledge_graph(organization_id).await?;
                info!(%organization_id, "Rebuilt knowledge graph");
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Command::Status { item_id } => {
            let view = service.get_processing_status(item_id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Retry { item_id } => {
            let outcome = service.retry(item_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}

async fn run(service: SiftService) -> anyhow::Result<()> {
    let worker = service.start_worker().await;
    let scheduler = spawn_graph_scheduler(service.clone(), service.config().graph_rebuild_interval);
    info!("sift worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    worker.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}
