use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use friend_ratings::render::{ConsoleRenderer, RenderOptions};
use friend_ratings::sources::{dedup_sources, load_source_file, parse_source_args};
use friend_ratings::store::import_legacy;
use friend_ratings::subject::prompt_subject_type;
use friend_ratings::{
    FetchConfig, Fetcher, KeyValueStore, MemoryStore, RankingComputer, RatingsPipeline, RefreshScheduler, RunConfig,
    SqliteStore, SubjectType,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "friend-ratings", about = "Leaderboard of your Bangumi friends' ratings")]
struct Cli {
    /// SQLite database holding the aggregated ratings
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:friend_ratings.db", global = true)]
    database_url: String,

    /// Keep ratings in memory only (nothing is persisted)
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every friend's collections and rebuild the leaderboard
    Run(RunArgs),
    /// Print the leaderboard from what is already stored
    Show(RenderArgs),
    /// Load a JSON export of flat legacy records into the store
    Import { file: PathBuf },
}

#[derive(Args)]
struct RunArgs {
    /// 1 Book, 2 Anime, 3 Music, 4 Game, 6 Real; prompted for when omitted
    #[arg(long)]
    subject_type: Option<SubjectType>,

    /// Friend ids, repeatable or comma separated
    #[arg(long = "source")]
    sources: Vec<String>,

    /// File with one friend id per line
    #[arg(long)]
    sources_file: Option<PathBuf>,

    #[arg(long, env = "BANGUMI_API_URL", default_value = "https://api.bgm.tv/v0")]
    base_url: String,

    #[arg(long)]
    user_agent: Option<String>,

    #[arg(long, default_value_t = 50)]
    page_limit: u32,

    /// Merges between leaderboard refreshes
    #[arg(long, default_value_t = 1000)]
    batch_size: u64,

    /// Friends fetched at the same time
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args)]
struct RenderArgs {
    /// Only list subjects rated by at least this many friends
    #[arg(long)]
    min_raters: Option<usize>,

    /// Only list the first N subjects
    #[arg(long)]
    top: Option<usize>,

    #[arg(long, default_value = "bangumi.tv")]
    site_host: String,
}

impl From<&RenderArgs> for RenderOptions {
    fn from(args: &RenderArgs) -> Self {
        Self {
            site_host: args.site_host.clone(),
            min_raters: args.min_raters,
            top: args.top,
        }
    }
}

async fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    if cli.in_memory {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::connect(&cli.database_url)
        .await
        .with_context(|| format!("opening ratings store {}", cli.database_url))?;
    Ok(Arc::new(store))
}

async fn run(cli: &Cli, args: &RunArgs) -> anyhow::Result<()> {
    let mut source_ids = parse_source_args(&args.sources);
    if let Some(path) = &args.sources_file {
        let from_file = load_source_file(path).with_context(|| format!("reading {}", path.display()))?;
        source_ids.extend(from_file);
    }
    let source_ids = dedup_sources(source_ids);
    if source_ids.is_empty() {
        bail!("no friend ids given; use --source or --sources-file");
    }

    let subject_type = match args.subject_type {
        Some(subject_type) => subject_type,
        None => prompt_subject_type(&mut io::stdin().lock(), &mut io::stdout())?,
    };

    let mut fetch_config = FetchConfig {
        base_url: args.base_url.clone(),
        page_limit: args.page_limit,
        ..FetchConfig::default()
    };
    if let Some(user_agent) = &args.user_agent {
        fetch_config.user_agent = user_agent.clone();
    }
    let page_limit = fetch_config.page_limit;

    let store = open_store(cli).await?;
    let fetcher = Arc::new(Fetcher::new(fetch_config)?);
    let sink = Arc::new(ConsoleRenderer::new(RenderOptions::from(&args.render)));
    let run_config = RunConfig {
        batch_size: args.batch_size,
        max_concurrent_sources: args.concurrency,
    };

    let pipeline = Arc::new(RatingsPipeline::new(fetcher, store, sink, page_limit, run_config));

    // Show what earlier runs left behind before fetching anything.
    pipeline.refresh().await;

    let completion = pipeline.clone().spawn_run(source_ids, subject_type);
    match completion.await {
        Ok(summary) => {
            info!("All friends' collections have been fetched");
            println!(
                "Done: {} friends ({} failed), {} collections fetched, {} ratings saved",
                summary.sources_completed, summary.sources_failed, summary.total_fetched, summary.total_saved
            );
        }
        Err(_) => bail!("run aborted before completion"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Run(args) => run(&cli, args).await?,
        Command::Show(args) => {
            let store = open_store(&cli).await?;
            let sink = Arc::new(ConsoleRenderer::new(RenderOptions::from(args)));
            let scheduler = RefreshScheduler::new(RankingComputer::new(store), sink, RunConfig::default().batch_size);
            scheduler.refresh().await;
        }
        Command::Import { file } => {
            let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            let export: serde_json::Value = serde_json::from_str(&content)?;
            let store = open_store(&cli).await?;
            match import_legacy(store.as_ref(), &export).await {
                Ok((imported, skipped)) => println!("Imported {} records ({} skipped)", imported, skipped),
                Err(e) => {
                    error!("Import failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
