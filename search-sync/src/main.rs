//! Search sync entry point.
//!
//! `run` consumes change events until Ctrl-C. The other sub-commands are
//! operator tools: seeding the products index, publishing a single todo event
//! in place of the write side, and querying an index.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use uuid::Uuid;

use search_sync::{logging, Dependencies, Settings, SyncError};
use search_sync_pipeline::backfill::{seed_products, DEFAULT_SEED_COUNT};
use search_sync_shared::{ChangeEvent, EntityKind, SearchQuery, TodoSnapshot};

#[derive(Parser)]
#[command(name = "search-sync")]
#[command(about = "Keeps the search read model in sync with the write side", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the indices and consume change events until interrupted
    Run,
    /// Write generated products straight into the products index
    SeedProducts {
        /// Number of products to generate
        #[arg(long, default_value_t = DEFAULT_SEED_COUNT)]
        count: usize,
    },
    /// Publish one todo change event
    Publish {
        #[arg(value_enum)]
        operation: PublishOperation,
        /// Todo id; generated for creations when omitted
        #[arg(long)]
        id: Option<Uuid>,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        completed: bool,
    },
    /// Query an index and print one page of results as JSON
    Search {
        #[arg(long, value_enum, default_value_t = Kind::Todo)]
        kind: Kind,
        /// `*`, `field:value [AND|OR field:value]...` or free text
        #[arg(long, default_value = "*")]
        query: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PublishOperation {
    Created,
    Updated,
    Deleted,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Todo,
    Product,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    logging::init(settings.log_format);

    if let Err(e) = execute(cli.command, settings).await {
        error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

async fn execute(command: Commands, settings: Settings) -> Result<(), SyncError> {
    let deps = Dependencies::new(settings)?;

    match command {
        Commands::Run => {
            let report = deps.orchestrator()?.run().await;
            let failed = report.streams.iter().filter(|s| s.result.is_err()).count();
            if failed > 0 {
                warn!(failed, "Some streams stopped with an error");
            }
            Ok(())
        }
        Commands::SeedProducts { count } => {
            let ids = seed_products(&deps.products(), count).await?;
            info!(count = ids.len(), "Seed complete");
            Ok(())
        }
        Commands::Publish {
            operation,
            id,
            title,
            description,
            priority,
            completed,
        } => {
            let mut snapshot = TodoSnapshot::new(title).with_priority(priority).completed(completed);
            snapshot.description = description;

            let event = match (operation, id) {
                (PublishOperation::Created, id) => {
                    ChangeEvent::created(id.unwrap_or_else(Uuid::new_v4), snapshot, Utc::now())
                }
                (PublishOperation::Updated, Some(id)) => ChangeEvent::updated(id, snapshot, Utc::now()),
                (PublishOperation::Deleted, Some(id)) => ChangeEvent::deleted(EntityKind::Todo, id),
                (_, None) => return Err(SyncError::config("--id is required for updates and deletions")),
            };

            let publisher = deps.publisher()?;
            let topic = deps.settings().todos.topic.clone();
            let result = publisher.publish(&topic, &event).await;
            publisher.close().await?;
            result?;

            info!(id = %event.id, operation = %event.operation(), topic = %topic, "Event published");
            Ok(())
        }
        Commands::Search {
            kind,
            query,
            page,
            page_size,
        } => {
            let query = SearchQuery::parse(&query)
                .map_err(search_sync_repository::SearchError::from)?
                .page(page, page_size);

            let rendered = match kind {
                Kind::Todo => serde_json::to_string_pretty(&deps.todos().search(&query).await?),
                Kind::Product => serde_json::to_string_pretty(&deps.products().search(&query).await?),
            }
            .map_err(std::io::Error::from)?;
            println!("{}", rendered);
            Ok(())
        }
    }
}
