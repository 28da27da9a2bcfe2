//! steplens - evaluation harness for hosted AI agents
//!
//! ## Commands
//!
//! - `run`: evaluate a batch of questions against the configured agent
//! - `inspect`: replay recorded trace fragments through the reducer offline
//! - `describe`: print the descriptor of the configured agent

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use steplens_core::invoker::fragment_usage;
use steplens_core::{
    fetch_descriptor, render_summary_md, summarize, trace_digest, BatchInput, CancelSignal,
    EvalError, HarnessConfig, Orchestrator, ReasoningStep, StepSummary, TokenUsage, TraceReducer,
};
use steplens_remote::http::{
    HttpAgentRuntime, HttpJudgeModel, JudgeClientConfig, LangfuseSink, RuntimeClientConfig,
    SinkClientConfig,
};
use steplens_remote::{AgentRuntime, RawTraceEvent, TraceFragment};

const ENV_JUDGE_API_KEY: &str = "STEPLENS_JUDGE_API_KEY";
const ENV_SINK_PUBLIC_KEY: &str = "STEPLENS_SINK_PUBLIC_KEY";
const ENV_SINK_SECRET_KEY: &str = "STEPLENS_SINK_SECRET_KEY";

#[derive(Parser)]
#[command(name = "steplens")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate hosted AI agents by replaying and judging their reasoning traces", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every question of a batch file
    Run {
        /// Harness configuration (TOML)
        #[arg(short, long, default_value = "steplens.toml")]
        config: PathBuf,

        /// Batch input (JSON: trajectory -> questions)
        #[arg(short, long)]
        batch: PathBuf,
    },

    /// Reduce and summarize recorded trace fragments (JSON lines)
    Inspect {
        /// File with one trace fragment (or `{"chunk": ...}`) per line
        fragments: PathBuf,

        /// Harness configuration for reducer and query settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the inspection as JSON instead of text
        #[arg(long)]
        as_json: bool,
    },

    /// Fetch and print the configured agent's descriptor
    Describe {
        /// Harness configuration (TOML)
        #[arg(short, long, default_value = "steplens.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    steplens_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { config, batch } => cmd_run(&config, &batch).await,
        Commands::Inspect {
            fragments,
            config,
            as_json,
        } => cmd_inspect(&fragments, config.as_deref(), as_json),
        Commands::Describe { config } => cmd_describe(&config).await,
    }
}

/// Load the harness config and fill secrets from the environment.
fn load_config(path: &Path) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load(path)
        .with_context(|| format!("Failed to load config {:?}", path))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Environment values win over the file for secrets.
fn apply_env_overrides(config: &mut HarnessConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup(ENV_JUDGE_API_KEY) {
        config.judge.api_key = Some(key);
    }
    if let Some(key) = lookup(ENV_SINK_PUBLIC_KEY) {
        config.sink.public_key = Some(key);
    }
    if let Some(key) = lookup(ENV_SINK_SECRET_KEY) {
        config.sink.secret_key = Some(key);
    }
}

fn build_runtime(config: &HarnessConfig) -> Result<HttpAgentRuntime> {
    let client_config = RuntimeClientConfig {
        endpoint: config.runtime.endpoint.clone(),
        token: config.runtime.token.clone(),
        timeout_secs: config.runtime.timeout_secs,
    };
    HttpAgentRuntime::new(client_config).context("Failed to build agent runtime client")
}

fn build_judge(config: &HarnessConfig) -> Result<HttpJudgeModel> {
    let mut client_config = JudgeClientConfig::new(&config.judge.endpoint);
    client_config.api_key = config.judge.api_key.clone();
    HttpJudgeModel::new(client_config).context("Failed to build judge client")
}

fn build_sink(config: &HarnessConfig) -> Result<LangfuseSink> {
    let (Some(public_key), Some(secret_key)) = (&config.sink.public_key, &config.sink.secret_key)
    else {
        bail!(
            "sink credentials missing: set sink.public_key/sink.secret_key or {} and {}",
            ENV_SINK_PUBLIC_KEY,
            ENV_SINK_SECRET_KEY
        );
    };
    let mut client_config = SinkClientConfig::new(&config.sink.host, public_key, secret_key);
    client_config.flush_every = config.sink.flush_every;
    LangfuseSink::new(client_config).context("Failed to build telemetry sink client")
}

/// Evaluate a batch and print its summary
async fn cmd_run(config_path: &Path, batch_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let text = std::fs::read_to_string(batch_path)
        .with_context(|| format!("Failed to read batch {:?}", batch_path))?;
    let batch = BatchInput::from_json(&text)
        .with_context(|| format!("Failed to parse batch {:?}", batch_path))?;

    let runtime = Arc::new(build_runtime(&config)?);
    let judge = Arc::new(build_judge(&config)?);
    let sink = Arc::new(build_sink(&config)?);

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if on_interrupt.is_cancelled() {
                warn!("second interrupt, exiting without flushing");
                std::process::exit(130);
            }
            warn!("interrupt received, stopping after recording the current question");
            on_interrupt.cancel();
        }
    });

    let orchestrator = Orchestrator::connect(runtime, judge, sink, config, cancel)
        .await
        .context("Failed to prepare evaluation")?;
    info!(
        agent = %orchestrator.descriptor().agent_name,
        model = %orchestrator.descriptor().model_id,
        questions = batch.question_count(),
        cooldown_secs = orchestrator.config().pacing.cooldown_secs,
        "starting evaluation"
    );

    match orchestrator.run_batch(&batch).await {
        Ok(summary) => {
            print!("{}", render_summary_md(&summary));
            Ok(())
        }
        Err(EvalError::Cancelled) => bail!("evaluation stopped by operator"),
        Err(e) => Err(e).context("Evaluation batch failed"),
    }
}

/// Print the fetched agent descriptor as JSON
async fn cmd_describe(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let runtime = build_runtime(&config)?;
    let descriptor = fetch_descriptor(
        &runtime as &dyn AgentRuntime,
        &config.agent.agent_id,
        &config.agent.alias_id,
    )
    .await
    .context("Failed to fetch agent descriptor")?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

/// Offline view of one recorded invocation.
#[derive(Debug, Serialize)]
struct Inspection {
    steps: Vec<ReasoningStep>,
    summary: StepSummary,
    answer: Option<String>,
    usage: TokenUsage,
    trace_digest: String,
}

/// Parse JSON lines into trace fragments and answer text. Blank lines are
/// skipped; `{"chunk": ...}` lines are answer chunks.
fn read_fragments(text: &str) -> Result<(Vec<TraceFragment>, Option<String>)> {
    let mut fragments = Vec::new();
    let mut answer: Option<String> = None;
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid JSON", n + 1))?;
        let is_chunk = value.as_object().is_some_and(|m| m.len() == 1 && m.contains_key("chunk"));
        if is_chunk {
            if let RawTraceEvent::Chunk(chunk) = serde_json::from_value(value)
                .with_context(|| format!("line {}: invalid answer chunk", n + 1))?
            {
                answer.get_or_insert_with(String::new).push_str(&chunk.text());
            }
            continue;
        }
        match TraceFragment::from_value(value) {
            Some(fragment) => fragments.push(fragment),
            None => bail!("line {}: trace fragment must be a JSON object", n + 1),
        }
    }
    Ok((fragments, answer))
}

fn inspect(text: &str, config: &HarnessConfig) -> Result<Inspection> {
    let (fragments, answer) = read_fragments(text)?;
    let mut usage = TokenUsage::default();
    for fragment in &fragments {
        usage += fragment_usage(fragment);
    }
    let steps = TraceReducer::new(config.reducer.clone()).reduce(&fragments);
    let summary = summarize(&steps, &config.query.extraction);
    let trace_digest = trace_digest(&steps)?;
    Ok(Inspection {
        steps,
        summary,
        answer,
        usage,
        trace_digest,
    })
}

fn render_inspection(inspection: &Inspection) -> String {
    let mut out = String::new();
    out.push_str(&format!("Steps: {}\n", inspection.steps.len()));
    for step in &inspection.steps {
        let kinds: Vec<&str> = step.payloads.keys().map(String::as_str).collect();
        out.push_str(&format!(
            "  {:>3}  {}  [{}]\n",
            step.ordinal + 1,
            step.correlation_key.as_deref().unwrap_or("-"),
            kinds.join(", ")
        ));
    }
    out.push_str("\nTranscript:\n");
    out.push_str(&inspection.summary.transcript);
    if !inspection.summary.collaborators.is_empty() {
        let names: Vec<&str> = inspection.summary.collaborators.iter().map(String::as_str).collect();
        out.push_str(&format!("\nCollaborators: {}\n", names.join(", ")));
    }
    if !inspection.summary.generated_query.is_empty() {
        out.push_str(&format!("\nGenerated query: {}\n", inspection.summary.generated_query));
    }
    if !inspection.summary.retrieval_contexts.is_empty() {
        out.push_str(&format!(
            "\nRetrieval contexts: {}\n",
            inspection.summary.retrieval_contexts.len()
        ));
    }
    if let Some(answer) = &inspection.answer {
        out.push_str(&format!("\nAnswer: {}\n", answer));
    }
    out.push_str(&format!(
        "\nTokens: {} in / {} out\nDigest: {}\n",
        inspection.usage.input_tokens, inspection.usage.output_tokens, inspection.trace_digest
    ));
    out
}

/// Replay recorded fragments through the reducer and summarizer
fn cmd_inspect(fragments_path: &Path, config_path: Option<&Path>, as_json: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        // Only reducer and query settings matter offline.
        None => HarnessConfig::new("offline", "offline"),
    };
    let text = std::fs::read_to_string(fragments_path)
        .with_context(|| format!("Failed to read fragments {:?}", fragments_path))?;
    let inspection = inspect(&text, &config)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print!("{}", render_inspection(&inspection));
    }
    Ok(())
}
