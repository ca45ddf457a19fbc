//! twecrawl CLI
//!
//! Long-running crawl loop plus the one-shot maintenance and capture tools.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use twecrawl::{
    error::{AppError, Result},
    models::Config,
    pipeline::{
        self, AddQueriesOptions, CrawlDriver, Direction, NetworkOptions, NetworkOutcome,
        NormalizeOptions, TimelineJob, timeline::DEFAULT_TIMELINE_MAX,
    },
    services::TwitterClient,
    state::{CycleLock, QueryStore, QuotaStore},
    storage::{self, DocumentStore, RecordKind, RecordSink},
};

/// Quota-aware keyword crawler for the Twitter v2 API
#[derive(Parser, Debug)]
#[command(name = "twecrawl", version, about = "Quota-aware Twitter keyword crawler")]
struct Cli {
    /// Path to storage directory holding config and state files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run crawl cycles until interrupted
    Crawl,

    /// Run a single crawl cycle and exit
    Cycle,

    /// Fold newly observed terms into the query set
    AddQueries {
        /// Candidate terms, one per line
        #[arg(short, long = "new")]
        new_file: PathBuf,

        /// Query file to compare against (default: the configured query file)
        #[arg(short, long)]
        existing: Option<PathBuf>,

        /// Write surviving terms here
        #[arg(short, long)]
        delta_output: Option<PathBuf>,

        /// Prefix surviving terms with '#'
        #[arg(long)]
        hashtag: bool,

        /// Append surviving terms to the query file
        #[arg(short, long)]
        update: bool,
    },

    /// Capture an account's followers and/or followed accounts
    Followers {
        #[arg(short, long)]
        username: String,

        /// Fetch accounts following the user
        #[arg(long)]
        followers: bool,

        /// Fetch accounts the user follows
        #[arg(long)]
        following: bool,

        /// Do not ask before fetching large lists
        #[arg(short, long)]
        yes: bool,

        #[command(flatten)]
        sinks: SinkFlags,
    },

    /// Capture recent tweets posted by one or more accounts
    Timeline {
        #[arg(short, long, conflicts_with = "in_file", required_unless_present = "in_file")]
        username: Option<String>,

        /// File with one username per line
        #[arg(short, long)]
        in_file: Option<PathBuf>,

        /// Tweets per account
        #[arg(short, long, default_value_t = DEFAULT_TIMELINE_MAX)]
        max: u32,

        #[command(flatten)]
        sinks: SinkFlags,
    },

    /// Validate configuration and state files
    Validate,

    /// Show quota and query set status
    Info,
}

#[derive(clap::Args, Debug, Clone, Copy, Default)]
struct SinkFlags {
    /// Skip the graph database sink
    #[arg(long)]
    no_graph: bool,

    /// Skip the document store sink
    #[arg(long)]
    no_documents: bool,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Build the sinks enabled in config and not switched off on the command line.
async fn build_sinks(
    config: &Config,
    root: &Path,
    flags: SinkFlags,
) -> Result<Vec<Box<dyn RecordSink>>> {
    let mut sinks: Vec<Box<dyn RecordSink>> = Vec::new();

    if config.sinks.graph.enabled && !flags.no_graph {
        #[cfg(feature = "graph")]
        sinks.push(Box::new(
            storage::GraphSink::from_config(&config.sinks.graph).await?,
        ));
        #[cfg(not(feature = "graph"))]
        log::warn!("Graph sink enabled in config but this build lacks the 'graph' feature");
    }

    if config.sinks.documents.enabled && !flags.no_documents {
        let dir = config.paths.document_dir(root);
        log::info!("Document store at {}", dir.display());
        sinks.push(Box::new(DocumentStore::new(dir)));
    }

    if sinks.is_empty() {
        log::warn!("No sinks enabled; fetched records will be discarded");
    }
    Ok(sinks)
}

fn quota_store(config: &Config, root: &Path) -> QuotaStore {
    QuotaStore::new(config.paths.quota_file(root), config.quota.budget_max)
}

async fn build_driver(config: &Config, root: &Path) -> Result<CrawlDriver> {
    let client = TwitterClient::from_config(&config.api)?;
    let mut driver = CrawlDriver::new(
        config.crawler.clone(),
        Arc::new(client),
        quota_store(config, root),
        QueryStore::new(config.paths.query_file(root)),
        CycleLock::new(config.paths.lock_file(root)),
    );
    for sink in build_sinks(config, root, SinkFlags::default()).await? {
        driver = driver.with_sink(sink);
    }
    Ok(driver)
}

/// Ask on stdin whether to fetch a large list. Only an answer starting
/// with 'n' declines.
fn confirm_on_stdin(username: &str, direction: Direction, size: u64) -> Result<bool> {
    println!(
        "Warning: {} has a large number of {}: {}. Proceed? y/n",
        username,
        direction.field(),
        size
    );
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(!answer.trim().to_lowercase().starts_with('n'))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let root = cli.storage_dir.as_path();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| root.join("config.toml"));
    let config = Config::load_or_default(&config_path);
    config.validate()?;

    match cli.command {
        Command::Crawl => {
            let mut driver = build_driver(&config, root).await?;
            driver.run().await?;
        }

        Command::Cycle => {
            let mut driver = build_driver(&config, root).await?;
            let outcome = driver.run_cycle().await?;
            log::info!("Cycle finished: {}", outcome);
        }

        Command::AddQueries {
            new_file,
            existing,
            delta_output,
            hashtag,
            update,
        } => {
            let options = AddQueriesOptions {
                new_file,
                existing_file: existing.unwrap_or_else(|| config.paths.query_file(root)),
                delta_output,
                hashtag,
                update,
            };
            let report = pipeline::add_queries(&options).await?;
            for term in &report.delta {
                println!("{term}");
            }
            log::info!(
                "{} new of {} candidates, {} appended",
                report.delta.len(),
                report.candidates,
                report.appended
            );
        }

        Command::Followers {
            username,
            followers,
            following,
            yes,
            sinks,
        } => {
            let mut directions = Vec::new();
            if followers {
                directions.push(Direction::Followers);
            }
            if following {
                directions.push(Direction::Following);
            }
            if directions.is_empty() {
                return Err(AppError::config(
                    "nothing to fetch: pass --followers and/or --following",
                ));
            }

            let client = TwitterClient::from_config(&config.api)?;
            let options = NetworkOptions {
                username: username.clone(),
                directions,
            };
            let outcome = pipeline::capture_network(&client, &options, |direction, size| {
                if yes {
                    Ok(true)
                } else {
                    confirm_on_stdin(&username, direction, size)
                }
            })
            .await?;

            match outcome {
                NetworkOutcome::UserNotFound => {
                    return Err(AppError::validation(format!("no account named {username}")));
                }
                NetworkOutcome::Aborted => log::info!("Nothing inserted"),
                NetworkOutcome::Fetched(users) => {
                    let sinks = build_sinks(&config, root, sinks).await?;
                    storage::insert_all(&sinks, RecordKind::Users, &users).await?;
                    log::info!("Inserted {} users for {}", users.len(), username);
                }
            }
        }

        Command::Timeline {
            username,
            in_file,
            max,
            sinks,
        } => {
            let usernames = match (username, in_file) {
                (Some(username), _) => vec![username],
                (None, Some(path)) => pipeline::read_usernames(&path).await?,
                (None, None) => {
                    return Err(AppError::config("pass --username or --in-file"));
                }
            };

            let client = TwitterClient::from_config(&config.api)?;
            let quota = quota_store(&config, root);
            let sinks = build_sinks(&config, root, sinks).await?;
            let job = TimelineJob {
                api: &client,
                quota: &quota,
                sinks: &sinks,
                campaign: &config.crawler.campaign,
                options: NormalizeOptions {
                    dedupe: config.crawler.dedupe,
                },
                max_results: max,
            };
            for report in job.run(&usernames).await? {
                log::info!(
                    "{}: {} tweets, {} users, {} calls charged",
                    report.username,
                    report.tweets,
                    report.users,
                    report.charged
                );
            }
        }

        Command::Validate => {
            log::info!("Config OK ({})", config_path.display());

            let quota = quota_store(&config, root)
                .load(Local::now().naive_local())
                .await?;
            log::info!(
                "Quota OK: {} of {} used since {}",
                quota.used,
                quota.budget_max,
                quota.window_start
            );

            let queries = QueryStore::new(config.paths.query_file(root)).load().await?;
            if queries.active_count() == 0 {
                log::warn!("Query set has no active queries; crawl would stop immediately");
            }
            log::info!(
                "Queries OK: {} active of {}",
                queries.active_count(),
                queries.len()
            );
            log::info!("All validations passed!");
        }

        Command::Info => {
            let now = Local::now().naive_local();
            let quota = quota_store(&config, root).load(now).await?;
            let queries = QueryStore::new(config.paths.query_file(root)).load().await?;
            let lock = CycleLock::new(config.paths.lock_file(root));

            println!("Storage directory: {}", root.display());
            println!(
                "Quota: {} of {} used, {} remaining",
                quota.used,
                quota.budget_max,
                quota.remaining_calls()
            );
            println!(
                "Window: {} to {} ({}s left)",
                quota.window_start,
                quota.window_end(),
                quota.remaining_window_secs(now)
            );
            println!(
                "Queries: {} active of {}",
                queries.active_count(),
                queries.len()
            );
            println!(
                "Cycle lock: {}",
                if lock.is_present() {
                    "present (a cycle is running or the last one failed)"
                } else {
                    "clear"
                }
            );
        }
    }

    Ok(())
}
