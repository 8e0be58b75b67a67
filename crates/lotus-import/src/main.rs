//! LOTUS Import - reconcile and publish natural-product occurrences

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lotus_common::logging::{init_logging, LogConfig, LogLevel};
use lotus_common::types::EntityKind;
use lotus_import::config::{ApiConfig, ImportConfig};
use lotus_import::export::{self, Exporter};
use lotus_import::ingest::{DatasetBuilder, TsvRecordSource};
use lotus_import::publish::{DryRunPublisher, PublishConfig, PublishPipeline, Publisher};
use lotus_import::reconcile::{BatchResolver, ChunkProgress, HttpTransport, RemoteApiClient};
use lotus_import::remote::crossref::CrossrefClient;
use lotus_import::remote::sparql::{SparqlQueryStore, WikibaseDialect};
use lotus_import::remote::wikibase::{Credentials, WikibasePublisher};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lotus-import")]
#[command(author, version, about = "Reconcile and publish LOTUS occurrence records")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export compounds, references, taxa and their associations as TSV
    Export {
        /// SPARQL endpoint to read from (defaults to LOTUS_SPARQL_URL)
        #[arg(short, long)]
        store: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Publish the records of a TSV file, reusing existing items
    Publish {
        /// Input TSV file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the failure list
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keys per batch lookup query
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Only process the first N records
        #[arg(long)]
        limit: Option<usize>,

        /// Log documents instead of creating items
        #[arg(long)]
        dry_run: bool,

        /// Do not complete references from CrossRef
        #[arg(long)]
        no_enrich: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("lotus-import")
        .build();

    // Environment variables take precedence
    let log_config = log_config.with_env_overrides().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring logging environment: {}", e);
        LogConfig::builder()
            .level(log_level)
            .log_file_prefix("lotus-import")
            .build()
    });
    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    if let Err(e) = run(cli.command).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        drop(guard);
        process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let config = ImportConfig::load().context("Invalid configuration")?;

    match command {
        Command::Export { store, output } => {
            let endpoint = store.unwrap_or_else(|| config.wikibase.sparql_url.clone());
            info!(endpoint = %endpoint, output = %output.display(), "Exporting");

            let client = api_client("sparql", &config.sparql_api, &config.user_agent)?;
            let store = SparqlQueryStore::new(client, endpoint);
            let summary = Exporter::new(&store, &output, config.wikibase.entity_prefix.as_str())?
                .run()
                .await?;

            println!(
                "Exported {} compounds, {} references, {} taxa, {} associations to {}",
                summary.compounds,
                summary.references,
                summary.taxa,
                summary.compound_reference_taxon,
                output.display()
            );
        },
        Command::Publish {
            input,
            output,
            chunk_size,
            limit,
            dry_run,
            no_enrich,
        } => {
            let mut config = config;
            if let Some(chunk_size) = chunk_size {
                config.resolver.chunk_size = chunk_size;
                config.validate().context("Invalid --chunk-size")?;
            }
            if let Some(output) = &output {
                export::ensure_writable(output)?;
            }
            publish(&config, input, output, limit, dry_run, !no_enrich).await?;
        },
    }

    Ok(())
}

async fn publish(
    config: &ImportConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    limit: Option<usize>,
    dry_run: bool,
    enrich: bool,
) -> Result<()> {
    let source = TsvRecordSource::open(&input)?;
    let mut builder = DatasetBuilder::new();
    let stats = builder.ingest(&source, limit)?;
    let dataset = builder.finish();
    if stats.skipped + stats.malformed > 0 {
        warn!(skipped = stats.skipped, malformed = stats.malformed, "Some records were not usable");
    }

    let sparql = api_client("sparql", &config.sparql_api, &config.user_agent)?;
    let store = Arc::new(SparqlQueryStore::new(sparql, config.wikibase.sparql_url.as_str()));
    let dialect = Arc::new(WikibaseDialect::new(config.wikibase.entity_prefix.as_str()));
    let resolver = BatchResolver::new(store, dialect).with_config(config.resolver.clone());

    let publisher: Arc<dyn Publisher> = if dry_run {
        Arc::new(DryRunPublisher::new())
    } else {
        let client = api_client("wikibase", &config.wikibase_api, &config.user_agent)?;
        let mut publisher = WikibasePublisher::new(client, config.wikibase.api_url.as_str());
        if let (Some(username), Some(password)) = (&config.wikibase.username, &config.wikibase.password) {
            publisher = publisher.with_credentials(Credentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
        Arc::new(publisher)
    };

    let bar = progress_bar();
    let hook_bar = bar.clone();
    let mut pipeline = PublishPipeline::new(resolver, publisher)
        .with_config(PublishConfig {
            retry: config.wikibase_api.retry_policy(),
            ..PublishConfig::default()
        })
        .with_progress(Box::new(move |kind: EntityKind, progress: &ChunkProgress| {
            hook_bar.set_message(format!("Resolving {}", kind));
            hook_bar.set_length(progress.total as u64);
            hook_bar.set_position(progress.completed as u64);
        }));
    if enrich {
        let client = api_client("crossref", &config.crossref_api, &config.user_agent)?;
        pipeline = pipeline.with_crossref(CrossrefClient::new(client, config.crossref_url.as_str()));
    }

    let summary = pipeline.run(&dataset).await;
    bar.finish_and_clear();
    let summary = summary?;

    println!("{}", summary.summary());
    if let Some(output) = output {
        let path = output.join("failures.tsv");
        let written = summary.write_failures(&path)?;
        println!("{} failures written to {}", written, path.display());
    }

    Ok(())
}

fn api_client(name: &str, api: &ApiConfig, user_agent: &str) -> Result<Arc<RemoteApiClient>> {
    let transport = HttpTransport::new(user_agent, Duration::from_secs(api.timeout_secs))
        .with_context(|| format!("Failed to set up {} client", name))?;
    Ok(Arc::new(api.client(name, Arc::new(transport))))
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} chunks")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}
