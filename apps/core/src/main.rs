// textsense command-line entry point.
// Plumbing only: configuration, logging, argument parsing and JSON output.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use textsense_core::actors::HistoryHandle;
use textsense_core::config::{EngineConfig, LogFormat};
use textsense_core::engine::{Analyzer, BatchOrchestrator};
use textsense_core::llm::OllamaClient;
use textsense_core::models::{AnalysisMode, AnalysisOptions, AnalysisRequest, DetailLevel};
use textsense_core::preflight::run_preflight_checks;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "textsense")]
#[command(about = "Structured text analysis (sentiment, topic, summary) on a local Ollama model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single text (read from stdin when TEXT is omitted)
    Analyze {
        text: Option<String>,
        #[arg(long, value_enum, default_value_t = ModeArg::Sentiment)]
        mode: ModeArg,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Analyze one text per line from a file or stdin
    Batch {
        /// Input file; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ModeArg::BatchItem)]
        mode: ModeArg,
        /// Overrides MAX_CONCURRENCY
        #[arg(long)]
        concurrency: Option<usize>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Check the model server and the default model
    Health,
    /// List the models installed on the model server
    Models,
}

#[derive(Args)]
struct OptionArgs {
    #[arg(long, value_enum, default_value_t = DetailArg::Brief)]
    detail: DetailArg,
    /// What the text is about, e.g. a product name
    #[arg(long)]
    subject: Option<String>,
    /// Overrides DEFAULT_MODEL
    #[arg(long)]
    model: Option<String>,
    /// Overrides DEFAULT_TEMPERATURE
    #[arg(long)]
    temperature: Option<f32>,
}

impl From<OptionArgs> for AnalysisOptions {
    fn from(args: OptionArgs) -> Self {
        Self {
            temperature: args.temperature,
            model_name: args.model,
            detail_level: args.detail.into(),
            subject: args.subject,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Sentiment,
    Summary,
    Topic,
    BatchItem,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sentiment => AnalysisMode::Sentiment,
            ModeArg::Summary => AnalysisMode::Summary,
            ModeArg::Topic => AnalysisMode::Topic,
            ModeArg::BatchItem => AnalysisMode::BatchItem,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DetailArg {
    Brief,
    Detailed,
    Bullets,
}

impl From<DetailArg> for DetailLevel {
    fn from(detail: DetailArg) -> Self {
        match detail {
            DetailArg::Brief => DetailLevel::Brief,
            DetailArg::Detailed => DetailLevel::Detailed,
            DetailArg::Bullets => DetailLevel::Bullets,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load().context("Failed to load configuration")?;
    init_tracing(config.log_format)?;

    let client = OllamaClient::from_config(&config)?;

    match cli.command {
        Commands::Analyze {
            text,
            mode,
            options,
        } => {
            let text = match text {
                Some(text) => text,
                None => read_lines(tokio::io::stdin()).await?.join("\n"),
            };
            let analyzer = build_analyzer(client, &config);
            let request = AnalysisRequest::new(text, mode.into()).with_options(options.into());
            let result = analyzer.analyze(&request).await?;
            print_json(&result)?;
        }
        Commands::Batch {
            input,
            mode,
            concurrency,
            options,
        } => {
            let lines = match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    read_lines(file).await?
                }
                None => read_lines(tokio::io::stdin()).await?,
            };
            let options: AnalysisOptions = options.into();
            let requests: Vec<AnalysisRequest> = lines
                .into_iter()
                .map(|line| AnalysisRequest::new(line, mode.into()).with_options(options.clone()))
                .collect();

            let analyzer = Arc::new(build_analyzer(client, &config));
            let orchestrator =
                BatchOrchestrator::new(analyzer, concurrency.unwrap_or(config.max_concurrency));

            let token = CancellationToken::new();
            let ctrl_c_token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling batch");
                    ctrl_c_token.cancel();
                }
            });

            let outcome = orchestrator.analyze_batch_with_cancel(requests, token).await;
            print_json(&outcome)?;
        }
        Commands::Health => {
            let report = run_preflight_checks(&config, &client).await;
            print_json(&report)?;
            if !report.all_passed {
                std::process::exit(1);
            }
        }
        Commands::Models => {
            let models = client.list_models().await?;
            print_json(&models)?;
        }
    }

    Ok(())
}

fn build_analyzer(client: OllamaClient, config: &EngineConfig) -> Analyzer<OllamaClient> {
    let history = HistoryHandle::new(config.history_capacity);
    Analyzer::new(Arc::new(client), history, config)
}

/// Non-blank lines, trimmed.
async fn read_lines<R: AsyncRead + Unpin>(reader: R) -> Result<Vec<String>> {
    let mut lines = BufReader::new(reader).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            out.push(line.to_string());
        }
    }
    info!("Read {} input lines", out.len());
    Ok(out)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new(
                env!("CARGO_PKG_NAME").into(),
                std::io::stderr,
            ))
            .try_init()?,
    }
    Ok(())
}
