//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, Format, ResearchArgs};
use glean_core::config::{self, GleanConfig};
use glean_core::research::{
    CorpusProvider, HeuristicStrategist, OutputFormat, ParallelFetcher, ProgressSink,
    ProviderClient, ResearchEvent, ResearchOrchestrator, load_corpus, render_session,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Research(args) => {
            let report = run_research(&args, workspace).await?;
            println!("{report}");
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace).await,
    }
}

/// Effective configuration for a research run: layered config plus flags.
fn research_config(args: &ResearchArgs, workspace: &Path) -> anyhow::Result<GleanConfig> {
    let mut config = config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(rounds) = args.max_rounds {
        config.research.max_rounds_ceiling = rounds;
    }
    if let Some(budget) = args.token_budget {
        config.selection.token_budget = budget;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid option: {}", e))?;
    Ok(config)
}

/// Run one session over a corpus file and render the result.
async fn run_research(args: &ResearchArgs, workspace: &Path) -> anyhow::Result<String> {
    let config = research_config(args, workspace)?;

    let corpus_path = if args.corpus.is_absolute() {
        args.corpus.clone()
    } else {
        workspace.join(&args.corpus)
    };
    let sources = load_corpus(&corpus_path)?;
    if sources.is_empty() {
        anyhow::bail!("Corpus {} contains no sources", corpus_path.display());
    }
    info!(
        corpus = %corpus_path.display(),
        sources = sources.len(),
        "Loaded corpus"
    );

    let clients: Vec<Arc<dyn ProviderClient>> = CorpusProvider::split_by_provenance(sources)
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn ProviderClient>)
        .collect();
    let fetcher = ParallelFetcher::from_config(clients, &config.fetch);
    let mut orchestrator =
        ResearchOrchestrator::new(Arc::new(HeuristicStrategist::new()), fetcher, &config);

    let printer = if args.events {
        let (sink, rx) = ProgressSink::channel(EVENT_CHANNEL_CAPACITY);
        orchestrator = orchestrator.with_progress(sink);
        Some(spawn_event_printer(rx))
    } else {
        None
    };

    let result = orchestrator.run_session(&args.query).await;
    // Dropping the orchestrator closes the event channel.
    drop(orchestrator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let format = match args.format {
        Format::Json => OutputFormat::Json,
        Format::Markdown => OutputFormat::Markdown,
    };
    Ok(render_session(&result, format)?)
}

fn spawn_event_printer(mut rx: broadcast::Receiver<ResearchEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => eprintln!("{line}"),
                    Err(e) => warn!(error = %e, "Failed to serialize progress event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress printer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = config::workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let written = config::write_default_config(workspace)?;
            println!("Created default configuration at: {}", written.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", config::to_toml(&config)?);
            Ok(())
        }
    }
}
