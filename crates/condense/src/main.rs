use clap::Parser;
use condense_common::{logger, AppConfig, CondenseError, Result};
use condense_llm::{split_paragraphs, GenerationEngine, Summarizer};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        // Fallback to default dotenv behavior
        dotenv::dotenv().ok();
    }
}

#[derive(Parser, Debug)]
#[command(name = "condense")]
#[command(about = "Condense - two-stage chunk-then-combine summarizer", long_about = None)]
struct Cli {
    /// Paragraphs as a JSON array of strings (stdin when omitted)
    paragraphs: Option<String>,

    /// Read the payload from a file
    #[arg(short, long, conflicts_with = "paragraphs")]
    input: Option<PathBuf>,

    /// Payload is plain text; paragraphs are separated by blank lines
    #[arg(long)]
    plain: bool,

    /// Model directory (config.json, tokenizer.json, model.safetensors)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Paragraphs per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Chunk summaries generated at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

impl Cli {
    /// Override configuration with CLI arguments
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(size) = self.chunk_size {
            config.pipeline.chunk_size = size;
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
    }
}

/// The single successful result
#[derive(Debug, Serialize)]
struct SummaryOutput<'a> {
    summary: &'a str,
}

/// Read the raw payload from the argument, a file, or stdin
fn read_payload(cli: &Cli) -> Result<String> {
    if let Some(raw) = &cli.paragraphs {
        return Ok(raw.clone());
    }

    if let Some(path) = &cli.input {
        return std::fs::read_to_string(path).map_err(|e| {
            CondenseError::input(format!("Failed to read {}: {}", path.display(), e))
        });
    }

    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| CondenseError::input(format!("Failed to read stdin: {}", e)))?;
    Ok(buf)
}

/// Decode the payload into paragraphs
fn parse_paragraphs(raw: &str, plain: bool) -> Result<Vec<String>> {
    if plain {
        return Ok(split_paragraphs(raw));
    }

    if raw.trim().is_empty() {
        return Err(CondenseError::input("No input provided"));
    }

    serde_json::from_str::<Vec<String>>(raw)
        .map_err(|e| CondenseError::input(format!("Expected a JSON array of strings: {}", e)))
}

fn render_output(summary: &str, pretty: bool) -> Result<String> {
    let output = SummaryOutput { summary };
    let json = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    Ok(json)
}

#[cfg(feature = "candle")]
fn load_engine(config: &AppConfig) -> Result<Arc<dyn GenerationEngine>> {
    let engine = condense_llm::T5Engine::load(&config.model_dir)?;
    tracing::info!("Engine backend: {:?}", engine.backend());
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "candle"))]
fn load_engine(_config: &AppConfig) -> Result<Arc<dyn GenerationEngine>> {
    Err(CondenseError::config(
        "Built without a generation engine; enable the `candle` feature",
    ))
}

async fn run(cli: Cli) -> Result<String> {
    let mut config = AppConfig::from_env()?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    config.ensure_directories()?;

    logger::setup_logging(config.log_dir.as_deref(), &config.log_level)?;

    // Input problems surface before the model is touched
    let raw = read_payload(&cli)?;
    let paragraphs = parse_paragraphs(&raw, cli.plain)?;
    tracing::info!("Read {} paragraphs", paragraphs.len());

    let engine = load_engine(&config)?;
    let summarizer = Summarizer::new(engine, config.pipeline.clone())?;

    let report = summarizer.summarize_report(&paragraphs).await?;
    tracing::info!(
        "Summarized {} paragraphs through {} chunks",
        paragraphs.len(),
        report.chunk_count()
    );

    render_output(&report.summary, cli.pretty)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load environment variables from .env at project root
    load_dotenv_from_project_root();

    match run(cli).await {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
