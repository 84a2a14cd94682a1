//! CLI binary for edgequake-pdf-highlight.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `HighlightConfig`, picks an object store and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_highlight::{
    highlight, AssumedCanvas, HighlightConfig, HighlightProgressCallback, HighlightRecord,
    HttpObjectStore, LocalObjectStore, ObjectLocation, ObjectStore, ToolCallError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per accepted or rejected tool call.
struct CliProgressCallback {
    bar: ProgressBar,
    rejected: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Fetching PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            rejected: AtomicUsize::new(0),
        })
    }
}

impl HighlightProgressCallback for CliProgressCallback {
    fn on_conversation_start(&self, page_count: usize) {
        self.bar.set_prefix("Reviewing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Agent reviewing {page_count} pages…"))
        ));
    }

    fn on_turn_start(&self, turn: u32) {
        self.bar.set_message(format!("turn {turn}"));
    }

    fn on_highlight_accepted(&self, index: usize, record: &HighlightRecord) {
        let reason = if record.reason.chars().count() > 60 {
            let cut: String = record.reason.chars().take(59).collect();
            format!("{cut}\u{2026}")
        } else {
            record.reason.clone()
        };
        self.bar.println(format!(
            "  {} #{:<3} page {:>3}  {}",
            green("✓"),
            index + 1,
            record.page_number,
            dim(&reason),
        ));
    }

    fn on_tool_call_rejected(&self, call_id: &str, error: &ToolCallError) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("↺"),
            dim(call_id),
            yellow(&error.to_string())
        ));
    }

    fn on_conversation_complete(&self, turns: u32, accepted: usize) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message(format!("{accepted} highlights"));
        let rejected = self.rejected.load(Ordering::SeqCst);
        self.bar.println(format!(
            "{} agent finished after {} turns  ({} accepted, {} rejected)",
            cyan("◆"),
            turns,
            accepted,
            rejected
        ));
    }

    fn on_render_complete(&self, artifact: &ObjectLocation) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", green("✔"), bold(&artifact.to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Annotate ./data/contracts/lease.pdf → ./data/contracts/lease_annotated.pdf
  pdf-highlight --store-root ./data --bucket contracts --key lease.pdf

  # Custom instructions, strict tool-call validation
  pdf-highlight --bucket docs --key a.pdf --prompt-file review.txt --strict

  # Objects behind an HTTP gateway, A4 canvas, JSON result
  pdf-highlight --endpoint https://objects.example.com --bucket docs --key a.pdf \
      --canvas 595x842 --json

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (required)
  ANTHROPIC_BASE_URL      Override the Messages API base URL
  PDF_HIGHLIGHT_MODEL     Override the model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Tracing filter, overrides -v/-q
"#;

/// Let an LLM agent review a PDF and render its highlights onto the document.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-highlight",
    version,
    about = "Let an LLM agent review a PDF and render its highlights onto the document",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Bucket holding the source PDF.
    #[arg(long, env = "PDF_HIGHLIGHT_BUCKET")]
    bucket: String,

    /// Object key of the source PDF.
    #[arg(long)]
    key: String,

    /// Directory acting as the object store root (`root/bucket/key`).
    #[arg(long, env = "PDF_HIGHLIGHT_STORE_ROOT", default_value = ".", conflicts_with = "endpoint")]
    store_root: PathBuf,

    /// HTTP object endpoint (`GET`/`PUT {endpoint}/{bucket}/{key}`).
    #[arg(long, env = "PDF_HIGHLIGHT_ENDPOINT")]
    endpoint: Option<String>,

    /// Text file with custom review instructions.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Text file with a custom system prompt.
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,

    /// Model ID (e.g. claude-sonnet-4-20250514).
    #[arg(long, env = "PDF_HIGHLIGHT_MODEL")]
    model: Option<String>,

    /// Maximum agent turns before giving up.
    #[arg(long, env = "PDF_HIGHLIGHT_MAX_TURNS", default_value_t = 25)]
    max_turns: u32,

    /// Max output tokens per agent turn.
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature (0.0–1.0).
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Abort on the first malformed tool call.
    #[arg(long)]
    strict: bool,

    /// Clamp highlights to the page box.
    #[arg(long)]
    clamp: bool,

    /// Canvas the agent reasons in, as WIDTHxHEIGHT points.
    #[arg(long, default_value = "612x792", value_parser = parse_canvas)]
    canvas: AssumedCanvas,

    /// Suffix inserted before the extension of the output key.
    #[arg(long, default_value = "_annotated")]
    suffix: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_HIGHLIGHT_PASSWORD")]
    password: Option<String>,

    /// Output structured JSON (HighlightOutput).
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli, show_progress).await?;
    let store: Box<dyn ObjectStore> = match cli.endpoint {
        Some(ref endpoint) => Box::new(
            HttpObjectStore::new(endpoint.as_str()).context("Invalid object endpoint")?,
        ),
        None => Box::new(LocalObjectStore::new(&cli.store_root)),
    };
    let source = ObjectLocation::new(&cli.bucket, &cli.key);

    // ── Run ──────────────────────────────────────────────────────────────
    let output = highlight(&source, store.as_ref(), &config)
        .await
        .with_context(|| format!("Highlighting {source} failed"))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    println!("{}", output.summary.trim_end());
    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} highlights  {} turns  {}ms  →  {}",
            green("✔"),
            output.highlights.len(),
            stats.conversation.turns,
            stats.total_duration_ms,
            bold(&output.artifact.to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.conversation.input_tokens.to_string()),
            dim(&stats.conversation.output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `HighlightConfig`.
async fn build_config(cli: &Cli, show_progress: bool) -> Result<HighlightConfig> {
    let mut builder = HighlightConfig::builder()
        .assumed_canvas(cli.canvas)
        .max_turns(cli.max_turns)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .strict_tool_calls(cli.strict)
        .clamp_to_page(cli.clamp)
        .output_suffix(cli.suffix.as_str());

    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(ref path) = cli.system_prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.as_str());
    }
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new());
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--canvas 612x792`.
fn parse_canvas(s: &str) -> Result<AssumedCanvas, String> {
    let (w, h) = s
        .trim()
        .to_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width: f64 = w.parse().map_err(|_| format!("invalid canvas width '{w}'"))?;
    let height: f64 = h.parse().map_err(|_| format!("invalid canvas height '{h}'"))?;
    let canvas = AssumedCanvas::new(width, height);
    if !canvas.is_valid() {
        return Err(format!("canvas must be positive, got '{s}'"));
    }
    Ok(canvas)
}
