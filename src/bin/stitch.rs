use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use stitch::{
    init_logging, Config, EventSink, FsStore, GenerationRequest, Mode, Orchestrator, RepairEngine,
    ReplaySource, RunState, StreamEvent,
};

#[derive(Parser)]
#[command(name = "stitch", version, about = "Demux and repair streamed model output into project files")]
struct Cli {
    /// JSON config file; `STITCH_*` variables override it.
    #[arg(long, global = true, env = "STITCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a recorded transcript through the full pipeline.
    Replay {
        transcript: PathBuf,
        /// Project directory to write into.
        #[arg(long)]
        out: PathBuf,
        /// Characters per delta; 0 sends the whole transcript at once.
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,
        #[arg(long, value_enum, default_value_t = CliMode::Generate)]
        mode: CliMode,
        /// Request text (the replayed output does not depend on it).
        #[arg(long, default_value = "replay")]
        prompt: String,
        #[arg(long, default_value = "cli")]
        project: String,
    },
    /// Repair a single file.
    Validate {
        /// Project-relative path, used to pick the repair passes.
        path: String,
        /// Read content from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMode {
    Generate,
    FixError,
}

impl From<CliMode> for Mode {
    fn from(m: CliMode) -> Self {
        match m {
            CliMode::Generate => Mode::Generate,
            CliMode::FixError => Mode::FixError,
        }
    }
}

/// One JSON object per event on stdout.
struct JsonLines;

impl EventSink for JsonLines {
    fn emit(&self, event: StreamEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{line}");
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(p) => Config::from_file(p)?,
        None => Config::default(),
    };
    Ok(config.with_env()?)
}

async fn replay(
    config: Config,
    transcript: PathBuf,
    out: PathBuf,
    chunk_size: usize,
    request: GenerationRequest,
    project: String,
) -> Result<()> {
    let text = tokio::fs::read_to_string(&transcript)
        .await
        .with_context(|| format!("reading transcript {}", transcript.display()))?;
    let engine = Arc::new(RepairEngine::from_config(&config));
    let store = FsStore::new(out.clone(), Arc::clone(&engine), config.allowed_extensions.clone());
    let orchestrator = Orchestrator::new(
        Arc::new(ReplaySource::new(text, chunk_size)),
        Arc::new(store),
        Arc::new(JsonLines),
        config,
    )
    .with_engine(engine);

    let report = orchestrator.run(&project, request).await?;
    info!(
        "{} file(s) written to {}",
        report.artifacts.len(),
        out.display()
    );
    if report.state != RunState::Completed {
        bail!(
            "run ended {:?}: {}",
            report.state,
            report.error.unwrap_or_default()
        );
    }
    Ok(())
}

fn validate(config: &Config, path: &str, file: Option<PathBuf>) -> Result<()> {
    let content = match file {
        Some(f) => std::fs::read_to_string(&f).with_context(|| format!("reading {}", f.display()))?,
        None => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).context("reading stdin")?;
            s
        }
    };
    let v = RepairEngine::from_config(config).validate(path, &content);
    for d in &v.diagnostics {
        eprintln!("{path}: {d}");
    }
    io::stdout().write_all(v.content.as_bytes())?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Replay {
            transcript,
            out,
            chunk_size,
            mode,
            prompt,
            project,
        } => {
            let request = GenerationRequest {
                mode: mode.into(),
                ..GenerationRequest::generate(prompt)
            };
            replay(config, transcript, out, chunk_size, request, project).await
        }
        Command::Validate { path, file } => validate(&config, &path, file),
    }
}
