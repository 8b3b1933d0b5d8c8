//! CLI binary for edgequake-flashcards.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GenerationConfig`, stores results in a local SQLite database, and prints
//! the generated cards.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_flashcards::config::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MODEL};
use edgequake_flashcards::generate::read_input;
use edgequake_flashcards::media::{MIME_DOCX, MIME_PDF, MIME_TEXT};
use edgequake_flashcards::{
    inspect, FlashcardPipeline, GeminiModel, GenerationConfig, GenerationProgressCallback,
    GenerativeModel, ModelConfig, PersistedFlashcard, ProgressCallback, ProviderModel,
    SqliteStore, Stage, Topic, TopicRef, UserRef,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that logs one line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style =
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Validate => "Checking upload…",
        Stage::Stage => "Staging file…",
        Stage::Extract => "Extracting text…",
        Stage::Model => "Waiting for the model…",
        Stage::Parse => "Reading flashcards…",
        Stage::Persist => "Saving flashcards…",
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.as_str());
        self.bar.set_message(stage_message(stage));
    }

    fn on_stage_complete(&self, stage: Stage) {
        self.bar.println(format!("  {} {}", green("✓"), stage));
    }

    fn on_flashcard_saved(&self, index: usize, total: usize) {
        self.bar.set_message(format!("{index}/{total} saved"));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        // Keep the line readable; the full error is printed on exit.
        let first_line = error.lines().next().unwrap_or_default();
        self.bar.println(format!("  {} {}  {}", red("✗"), stage, red(first_line)));
        self.bar.finish_and_clear();
    }

    fn on_run_complete(&self, saved: usize) {
        self.bar.finish_and_clear();
        eprintln!("{} {} flashcards saved", green("✔"), bold(&saved.to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate flashcards from a PDF into a new topic
  flashcards notes.pdf --topic "Cell biology"

  # Word document, JSON output
  flashcards lecture.docx --topic History --json > cards.json

  # Use another provider through edgequake-llm
  flashcards notes.txt --topic Physics --provider openai --model gpt-4.1-nano

  # See what text would be sent to the model (no API key needed)
  flashcards --inspect-only scan.pdf

  # Print the flashcards stored under topic 3
  flashcards --show-topic 3

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  GEMINI_BASE_URL         Override the Generative Language API root
  FLASHCARDS_PROVIDER     gemini (default), openai, anthropic, ollama, ...
  FLASHCARDS_MODEL        Model ID (default: gemini-2.0-flash)
  FLASHCARDS_USER         Owner recorded on topics and flashcards
  FLASHCARDS_DB           SQLite database path (default: flashcards.db)
  OPENAI_API_KEY, ANTHROPIC_API_KEY, ...
                          Read by edgequake-llm for non-Gemini providers

  A .env file in the working directory is loaded before flags are parsed.
"#;

/// Generate study flashcards from text, PDF, and Word documents.
#[derive(Parser, Debug)]
#[command(
    name = "flashcards",
    version,
    about = "Generate study flashcards from text, PDF, and Word documents",
    long_about = "Extract the text of a document, ask a generative model for question/answer \
pairs, and store them under a topic in a local SQLite database. The file format is detected \
from content, not from the extension.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to turn into flashcards (.txt, .pdf, .docx).
    #[arg(required_unless_present = "show_topic")]
    input: Option<PathBuf>,

    /// Name of the topic to create for the generated cards.
    #[arg(long, required_unless_present_any = ["inspect_only", "show_topic"])]
    topic: Option<String>,

    /// Owner of the topic and its flashcards.
    #[arg(long, env = "FLASHCARDS_USER", default_value = "local")]
    user: String,

    /// SQLite database file.
    #[arg(long, env = "FLASHCARDS_DB", default_value = "flashcards.db")]
    db: PathBuf,

    /// Declared content type. Default: guessed from the file extension.
    /// Only consulted when the content itself is ambiguous.
    #[arg(long)]
    content_type: Option<String>,

    /// Model backend: gemini, or any edgequake-llm provider name.
    #[arg(long, env = "FLASHCARDS_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Model ID.
    #[arg(long, env = "FLASHCARDS_MODEL")]
    model: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini API root.
    #[arg(long, env = "GEMINI_BASE_URL")]
    base_url: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "FLASHCARDS_TEMPERATURE")]
    temperature: Option<f32>,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "FLASHCARDS_MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    max_file_size: u64,

    /// Largest amount of text extraction may produce (default: 4 × max file size).
    #[arg(long, env = "FLASHCARDS_MAX_EXTRACTED_BYTES")]
    max_extracted_bytes: Option<u64>,

    /// Model call timeout in seconds.
    #[arg(long, env = "FLASHCARDS_TIMEOUT")]
    timeout: Option<u64>,

    /// Fail instead of prompting the model when the document has no text.
    #[arg(long)]
    reject_blank: bool,

    /// Output JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Print the detected type and extracted text only; no model call.
    #[arg(long)]
    inspect_only: bool,

    /// Print the flashcards stored under this topic id and exit.
    #[arg(long, conflicts_with_all = ["inspect_only", "topic"])]
    show_topic: Option<i64>,

    /// Disable the progress spinner.
    #[arg(long, env = "FLASHCARDS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FLASHCARDS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FLASHCARDS_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    topic: &'a Topic,
    flashcards: &'a [PersistedFlashcard],
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; flags and the real environment still apply.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters, so INFO logs are
    // muted while it is active.
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

    let user = UserRef::new(cli.user.clone());

    // ── Show-topic mode ──────────────────────────────────────────────────
    if let Some(id) = cli.show_topic {
        let store = open_store(&cli.db)?;
        let topic = store
            .topic(id)
            .await
            .context("Failed to read topic")?
            .with_context(|| format!("Topic {id} not found in {}", cli.db.display()))?;
        let cards = store
            .flashcards_for_topic(TopicRef { id }, &user)
            .await
            .context("Failed to read flashcards")?;
        print_cards(&cli, &topic, &cards)?;
        return Ok(());
    }

    let input = cli.input.clone().context("An input file is required")?;
    let declared = cli
        .content_type
        .clone()
        .unwrap_or_else(|| content_type_for(&input).to_string());

    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.inspect_only {
        Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let bytes = read_input(&config, &input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let document = inspect(&config, &bytes, &declared)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&document).context("Failed to serialise document")?
            );
        } else {
            println!("File:         {}", input.display());
            println!("Declared:     {}", declared);
            println!("Detected:     {}", document.media_type);
            println!("Characters:   {}", document.char_count());
            println!();
            println!("{}", document.text);
        }
        return Ok(());
    }

    // ── Generate ─────────────────────────────────────────────────────────
    let topic_name = cli.topic.clone().context("--topic is required")?;
    let model = build_model(&cli, &config)?;
    let store = Arc::new(open_store(&cli.db)?);
    let pipeline = FlashcardPipeline::new(config, model, store);

    let (topic, cards) = pipeline
        .run_for_new_topic(&bytes, &declared, &topic_name, &user)
        .await
        .context("Flashcard generation failed")?;

    print_cards(&cli, &topic, &cards)?;
    if !cli.quiet && !cli.json {
        eprintln!(
            "{}",
            dim(&format!("topic {} stored in {}", topic.id, cli.db.display()))
        );
    }
    Ok(())
}

/// Map CLI args to `GenerationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GenerationConfig> {
    let mut model = ModelConfig::new(
        cli.api_key.clone().unwrap_or_default(),
        cli.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
    );
    if let Some(ref url) = cli.base_url {
        model = model.with_base_url(url.clone());
    }
    if let Some(t) = cli.temperature {
        model = model.with_temperature(t);
    }

    let mut builder = GenerationConfig::builder()
        .max_file_size(cli.max_file_size)
        .reject_blank_text(cli.reject_blank)
        .model(model);
    if let Some(bytes) = cli.max_extracted_bytes {
        builder = builder.max_extracted_bytes(bytes);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.model_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Pick the model backend named by `--provider`.
fn build_model(cli: &Cli, config: &GenerationConfig) -> Result<Arc<dyn GenerativeModel>> {
    if cli.provider.eq_ignore_ascii_case("gemini") {
        let model = GeminiModel::new(config.model.clone()).context("Gemini is not configured")?;
        return Ok(Arc::new(model));
    }

    let model_id = cli
        .model
        .as_deref()
        .with_context(|| format!("--model is required for provider '{}'", cli.provider))?;
    let mut model = ProviderModel::from_factory(&cli.provider, model_id)
        .with_context(|| format!("Provider '{}' is not configured", cli.provider))?;
    if let Some(t) = cli.temperature {
        model = model.with_temperature(t);
    }
    Ok(Arc::new(model))
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Declared content type implied by a file extension.
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("md") | Some("text") => MIME_TEXT,
        Some("pdf") => MIME_PDF,
        Some("docx") => MIME_DOCX,
        _ => "application/octet-stream",
    }
}

fn print_cards(cli: &Cli, topic: &Topic, cards: &[PersistedFlashcard]) -> Result<()> {
    if cli.json {
        let out = RunOutput {
            topic,
            flashcards: cards,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("Failed to serialise output")?
        );
        return Ok(());
    }

    println!("{}  {}", bold(&topic.name), dim(&format!("({} cards)", cards.len())));
    for (i, card) in cards.iter().enumerate() {
        println!();
        println!("{:>3}. Q: {}", i + 1, card.question);
        println!("     A: {}", card.answer);
    }
    Ok(())
}
