#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the company search API ingestion tool.

mod interactive;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use company_etl_cli_utils::{IndicatifProgress, MultiProgress};
use company_etl_database::db::{self, Store};
use company_etl_database::sink::DatabaseSink;
use company_etl_database::{queries, schema};
use company_etl_ingest::archive::{FileArchive, NullArchive, ResponseArchive};
use company_etl_ingest::checkpoint::{CheckpointStore, FileCheckpointStore, load_campaign, load_unit};
use company_etl_ingest::config::{
    ControllerConfig, DEFAULT_BASE_DELAY_MS, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONSECUTIVE_ERRORS,
};
use company_etl_ingest::controller::PaginationController;
use company_etl_ingest::orchestrator::CampaignOrchestrator;
use company_etl_ingest::partition::{PartitionMode, Partitioner};
use company_etl_ingest_models::PaginationContext;
use company_etl_scraper::Transport as _;
use company_etl_scraper::http::HttpTransport;
use company_etl_source::SourceError;
use company_etl_source::extract::{describe_shape, extract_records, extract_total};
use company_etl_source::registry::{all_sources, find_source};
use company_etl_source::request::PageRequest;
use company_etl_source::source_def::SourceDefinition;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "company_etl_ingest", about = "Company search API ingestion tool")]
struct Cli {
    #[command(flatten)]
    options: Options,
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command.
#[derive(Args)]
struct Options {
    /// Source definition id
    #[arg(long, global = true, env = "COMPANY_ETL_SOURCE", default_value = "pomanda")]
    source: String,
    /// Directory holding checkpoints (`checkpoints/`) and the raw response
    /// archive (`raw/`)
    #[arg(long, global = true, env = "COMPANY_ETL_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,
    /// Write to this `SQLite` file instead of Postgres (`DATABASE_URL`)
    #[arg(long, global = true, env = "COMPANY_ETL_SQLITE")]
    sqlite: Option<PathBuf>,
    /// How to partition the search space when planning a new campaign
    #[arg(
        long,
        global = true,
        value_enum,
        env = "COMPANY_ETL_MODE",
        default_value_t = PartitionMode::Alphabet
    )]
    mode: PartitionMode,
}

impl Options {
    fn checkpoints(&self) -> FileCheckpointStore {
        FileCheckpointStore::new(self.data_dir.join("checkpoints"))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the campaign, resuming from the last checkpoint
    Run(RunArgs),
    /// Print the work units a new campaign would process
    Plan,
    /// Print the persisted campaign and unit checkpoints
    Status {
        /// Also print row counts of the company tables
        #[arg(long)]
        tables: bool,
    },
    /// List all configured sources
    Sources,
    /// Create the company tables
    Migrate,
    /// Delete every stored company
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Also delete the campaign and unit checkpoints
        #[arg(long)]
        checkpoints: bool,
    },
    /// Fetch one page and describe the response without storing anything
    Probe {
        /// Name prefix to query (empty for the whole range)
        #[arg(default_value = "")]
        prefix: String,
        #[arg(long, default_value = "0")]
        offset: u64,
        #[arg(long, default_value = "10")]
        size: u64,
        /// Route the request through this proxy
        #[arg(long, env = "COMPANY_ETL_PROXY")]
        proxy: Option<String>,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Records requested per page
    #[arg(long, env = "COMPANY_ETL_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: u64,
    /// Base politeness and backoff delay in milliseconds
    #[arg(long, env = "COMPANY_ETL_BASE_DELAY_MS", default_value_t = DEFAULT_BASE_DELAY_MS)]
    base_delay_ms: u64,
    /// Consecutive failures after which a unit is aborted for this run
    #[arg(
        long,
        env = "COMPANY_ETL_MAX_CONSECUTIVE_ERRORS",
        default_value_t = DEFAULT_MAX_CONSECUTIVE_ERRORS
    )]
    max_consecutive_errors: u32,
    /// Companies upserted concurrently within a page
    #[arg(long, env = "COMPANY_ETL_UPSERT_CONCURRENCY", default_value_t = 1)]
    upsert_concurrency: usize,
    /// Do not archive raw responses
    #[arg(long)]
    no_archive: bool,
    /// Use exact politeness delays
    #[arg(long)]
    no_jitter: bool,
    /// Route requests through this proxy
    #[arg(long, env = "COMPANY_ETL_PROXY")]
    proxy: Option<String>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            upsert_concurrency: 1,
            no_archive: false,
            no_jitter: false,
            proxy: None,
        }
    }
}

impl RunArgs {
    const fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            batch_size: self.batch_size,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_consecutive_errors: self.max_consecutive_errors,
            upsert_concurrency: self.upsert_concurrency,
            jitter: !self.no_jitter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = company_etl_cli_utils::init_logger();
    let cli = Cli::parse();

    let command = match cli.command {
        Some(command) => command,
        None => interactive::choose_command()?,
    };

    match command {
        Commands::Run(args) => run(&cli.options, &args, &multi).await?,
        Commands::Plan => plan(&cli.options)?,
        Commands::Status { tables } => status(&cli.options, tables).await?,
        Commands::Sources => {
            println!("{:<20} NAME", "ID");
            println!("{}", "-".repeat(50));
            for source in all_sources() {
                println!("{:<20} {}", source.id, source.name);
            }
        }
        Commands::Migrate => {
            log::info!("Creating company tables...");
            open_store(cli.options.sqlite.as_deref()).await?;
            log::info!("Schema ready.");
        }
        Commands::Reset { yes, checkpoints } => {
            reset(&cli.options, yes, checkpoints).await?;
        }
        Commands::Probe {
            prefix,
            offset,
            size,
            proxy,
        } => probe(&cli.options, &prefix, offset, size, proxy).await?,
    }

    Ok(())
}

fn load_source(id: &str) -> Result<SourceDefinition, SourceError> {
    let source = find_source(id).ok_or_else(|| SourceError::UnknownSource(id.to_string()))?;
    source.validate()?;
    Ok(source)
}

/// Opens the configured store and makes sure the schema exists.
async fn open_store(sqlite: Option<&Path>) -> Result<Store, company_etl_database::DbError> {
    let store = match sqlite {
        Some(path) => db::open_sqlite(path)?,
        None => db::connect_from_env().await?,
    };
    schema::ensure_schema(store.db.as_ref(), store.dialect).await?;
    Ok(store)
}

async fn run(
    options: &Options,
    args: &RunArgs,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = load_source(&options.source)?;
    if let Some(proxy) = &args.proxy {
        source.request.proxy = Some(proxy.clone());
    }

    let store = open_store(options.sqlite.as_deref()).await?;
    let sink = DatabaseSink::new(store);
    let transport = HttpTransport::new(source.request.accept_invalid_certs);
    let checkpoints = options.checkpoints();
    let archive: Box<dyn ResponseArchive> = if args.no_archive {
        Box::new(NullArchive)
    } else {
        Box::new(FileArchive::new(options.data_dir.join("raw")))
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Shutdown requested, finishing the current batch...");
            shutdown.cancel();
        }
    });

    let orchestrator = CampaignOrchestrator {
        controller: PaginationController {
            source: &source,
            transport: &transport,
            sink: &sink,
            checkpoints: &checkpoints,
            archive: archive.as_ref(),
            progress: IndicatifProgress::campaign_bars(multi),
            config: args.controller_config(),
            cancel,
            rest_token: source.credentials.rest_token(),
        },
        partitioner: Partitioner::new(options.mode, &source.partition),
    };

    log::info!(
        "Running '{}' campaign (checkpoints in {})",
        source.id,
        checkpoints.dir().display()
    );
    let summary = orchestrator.run().await?;

    println!();
    println!("Units completed this run: {}", summary.units_completed);
    if !summary.units_aborted.is_empty() {
        println!("Units aborted:            {}", summary.units_aborted.join(", "));
    }
    println!("Units remaining:          {}", summary.units_remaining);
    println!("Entities this run:        {}", summary.entities_this_run);
    println!("Entities in total:        {}", summary.total_entities_processed);
    println!(
        "Elapsed:                  {:.1}s",
        summary.duration.as_secs_f64()
    );

    let counts = queries::table_counts(sink.db()).await?;
    log::info!("Store now holds {} companies", counts.companies);
    Ok(())
}

fn plan(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let source = load_source(&options.source)?;
    let partitioner = Partitioner::new(options.mode, &source.partition);

    let keys = partitioner.plan();
    for key in &keys {
        println!("{key:<8} {}", partitioner.volume_class(key));
    }

    let subdivided: Vec<String> = partitioner
        .subdivision()
        .into_iter()
        .filter(|(_, decision)| decision.subdivided)
        .map(|(letter, _)| letter)
        .collect();
    println!();
    println!("{} work unit(s)", keys.len());
    if !subdivided.is_empty() {
        println!("Subdivided letters: {}", subdivided.join(" "));
    }
    Ok(())
}

async fn status(options: &Options, tables: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = options.checkpoints();

    match load_campaign(&store).await? {
        None => println!("No campaign in {}", store.dir().display()),
        Some(campaign) => {
            println!(
                "Units: {} completed, {} pending, {} total",
                campaign.completed.len(),
                campaign.pending.len(),
                campaign.unit_count()
            );
            println!("Entities processed: {}", campaign.total_entities_processed);
            if let Some(started_at) = campaign.started_at {
                println!("Started: {}", started_at.to_rfc3339());
            }
            println!(
                "In progress: {}",
                campaign.in_progress.as_deref().unwrap_or("-")
            );

            println!();
            println!(
                "{:<8} {:>10} {:>10} {:>10} {:>7} STATUS",
                "UNIT", "OFFSET", "PROCESSED", "TOTAL", "ERRORS"
            );
            for key in campaign.in_progress.iter().chain(&campaign.pending) {
                let Some(checkpoint) = load_unit(&store, key).await? else {
                    continue;
                };
                println!(
                    "{:<8} {:>10} {:>10} {:>10} {:>7} {}",
                    checkpoint.key,
                    checkpoint.cursor_offset,
                    checkpoint.processed_count,
                    checkpoint
                        .total_known
                        .map_or_else(|| "?".to_string(), |t| t.to_string()),
                    checkpoint.consecutive_error_count,
                    checkpoint.status,
                );
            }
        }
    }

    if tables {
        let db = open_store(options.sqlite.as_deref()).await?;
        let counts = queries::table_counts(db.db.as_ref()).await?;
        println!();
        println!("companies:       {}", counts.companies);
        println!("financial_facts: {}", counts.financial_facts);
        println!("activities:      {}", counts.activities);
        println!("trading_areas:   {}", counts.trading_areas);
        println!("industry_mix:    {}", counts.industry_mix);
    }
    Ok(())
}

async fn reset(
    options: &Options,
    yes: bool,
    checkpoints: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !yes && !interactive::confirm_reset(checkpoints)? {
        println!("Aborted.");
        return Ok(());
    }

    let store = open_store(options.sqlite.as_deref()).await?;
    let removed = queries::reset_companies(store.db.as_ref()).await?;
    println!("Deleted {removed} companies.");

    if checkpoints {
        options.checkpoints().clear().await?;
        println!("Cleared checkpoints.");
    }
    Ok(())
}

async fn probe(
    options: &Options,
    prefix: &str,
    offset: u64,
    size: u64,
    proxy: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = load_source(&options.source)?;
    if proxy.is_some() {
        source.request.proxy = proxy;
    }

    let transport = HttpTransport::new(source.request.accept_invalid_certs);
    let page = PageRequest {
        unit_key: prefix,
        offset,
        size,
    };
    let request = source.build_request(
        &page,
        &mut PaginationContext::default(),
        &source.credentials.rest_token(),
    )?;

    let response = transport.fetch(&request).await?;
    println!("HTTP {}", response.status);

    let payload: serde_json::Value = serde_json::from_str(&response.body)?;
    let shape = describe_shape(&payload);
    println!("Top-level keys: {}", shape.top_level_keys.join(", "));
    for (path, len, keys) in &shape.arrays {
        println!("  {path}[{len}] {}", keys.join(", "));
    }
    if let Some(message) = &shape.error_message {
        println!("Error message: {message}");
    }

    match extract_records(&payload, &source.response.records_paths) {
        Some(records) => println!("Records: {}", records.len()),
        None => println!("Records: unrecognized shape"),
    }
    println!(
        "Total: {}",
        extract_total(&payload, &source.response.total_paths)
            .map_or_else(|| "unknown".to_string(), |t| t.to_string())
    );
    Ok(())
}
