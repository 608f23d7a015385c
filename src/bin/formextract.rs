//! CLI binary for formextract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` / `PersistenceConfig`, drives a `FormSession` and
//! prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use formextract::form::display_value;
use formextract::{
    AccuracyReport, CanonicalFieldList, DraftFile, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, FormDraft, FormSession, FormVariant, Persisted, PersistenceConfig,
    ProgressCallback, SqliteSink, Submission, Upload,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the image currently being read.
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar length is set by `on_extraction_start` once the images are
    /// known.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Looking for images…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_images: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_images as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Reading");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_images} image(s)"))
        ));
    }

    fn on_image_start(&self, image: usize, _total: usize) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_message(format!("image {image}"));
    }

    fn on_image_complete(&self, image: usize, total: usize, fields: usize) {
        self.bar.println(format!(
            "  {} Image {:>2}/{:<2}  {:<10}  {}",
            green("✓"),
            image,
            total,
            dim(&format!("{fields:>3} keys")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, image: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Image {:>2}/{:<2}  {}  {}",
            red("✗"),
            image,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_images: usize, usable_images: usize) {
        let failed = total_images.saturating_sub(usable_images);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} image(s) read successfully",
                green("✔"),
                bold(&usable_images.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) usable  ({} skipped)",
                if failed == total_images {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&usable_images.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read a scanned form and print the autofilled fields
  formextract extract application.jpg

  # Save an editable draft, fix it by hand, then submit it
  formextract extract application.pdf -o draft.json
  formextract submit draft.json

  # Correct fields on the terminal and store the result
  formextract extract application.docx --edit --submit

  # The 15-field layout with a different model
  formextract --variant basic --model openai/gpt-4.1-mini extract form.png

  # Full extraction report as JSON
  formextract extract application.pdf --json > report.json

  # List the fields of a layout
  formextract --variant extended fields

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY        OpenRouter API key (default provider)
  OPENAI_API_KEY            OpenAI API key
  FORMEXTRACT_LLM_PROVIDER  Override provider (openrouter, openai, gemini, ollama)
  FORMEXTRACT_MODEL         Override model ID
  FORMEXTRACT_DB_URL        Database for submitted forms (path or sqlite://path)

A .env file in the working directory is read on start-up.
"#;

/// Extract merchant application forms with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "formextract",
    version,
    about = "Extract merchant application forms from images, PDFs and DOCX files using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Built-in form layout: basic (15 fields), extended (25), full (42).
    #[arg(long, global = true, env = "FORMEXTRACT_VARIANT", default_value = "full")]
    variant: FormVariant,

    /// JSON file holding a custom array of field names.
    #[arg(long, global = true, env = "FORMEXTRACT_FIELDS_FILE")]
    fields_file: Option<PathBuf>,

    /// LLM model ID (default: meta-llama/llama-4-scout).
    #[arg(long, global = true, env = "FORMEXTRACT_MODEL")]
    model: Option<String>,

    /// LLM provider: openrouter, openai, anthropic, gemini, ollama.
    #[arg(long, global = true, env = "FORMEXTRACT_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "FORMEXTRACT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per image.
    #[arg(long, global = true, env = "FORMEXTRACT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Per-image LLM call timeout in seconds.
    #[arg(long, global = true, env = "FORMEXTRACT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Primary database for submitted forms.
    #[arg(long, global = true, env = "FORMEXTRACT_DB_URL")]
    db_url: Option<String>,

    /// Fallback database (default: the platform data directory).
    #[arg(long, global = true, env = "FORMEXTRACT_DB_FALLBACK")]
    db_fallback: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FORMEXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "FORMEXTRACT_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "FORMEXTRACT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a form file and autofill the fields.
    Extract {
        /// Image (jpg, jpeg, png), PDF or DOCX file.
        file: PathBuf,

        /// Write an editable JSON draft to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full extraction report as JSON.
        #[arg(long)]
        json: bool,

        /// Review and correct every field on the terminal.
        #[arg(long)]
        edit: bool,

        /// Submit the form after extraction (and editing).
        #[arg(long)]
        submit: bool,

        /// Submit without storing the form.
        #[arg(long)]
        no_save: bool,
    },

    /// Submit a draft written by `extract -o`.
    Submit {
        draft: PathBuf,

        /// Submit without storing the form.
        #[arg(long)]
        no_save: bool,
    },

    /// List the fields of the selected layout.
    Fields,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are suppressed while the progress bar is
    // shown; the bar carries the same information.
    let json = matches!(cli.command, Command::Extract { json: true, .. });
    let show_progress = !cli.quiet && !cli.no_progress && !json;
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

    let custom_fields = load_fields(&cli).await?;

    match cli.command {
        Command::Fields => {
            let fields = custom_fields.unwrap_or_else(|| cli.variant.fields());
            for (i, field) in fields.iter().enumerate() {
                println!("{:>3}. {}", i + 1, field);
            }
            Ok(())
        }
        Command::Extract {
            ref file,
            ref output,
            json,
            edit,
            submit,
            no_save,
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
            } else {
                None
            };
            let config = build_config(&cli, custom_fields.clone(), progress)?;
            run_extract(&cli, &config, file, output.as_deref(), json, edit, submit, no_save).await
        }
        Command::Submit { ref draft, no_save } => run_submit(&cli, draft, no_save).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_extract(
    cli: &Cli,
    config: &ExtractionConfig,
    file: &Path,
    draft_path: Option<&Path>,
    json: bool,
    edit: bool,
    submit: bool,
    no_save: bool,
) -> Result<()> {
    let upload = Upload::from_path(file)
        .await
        .with_context(|| format!("Cannot read {}", file.display()))?;
    let client = formextract::extract::ocr_client(config);

    let mut session = FormSession::from_config(config);
    session.accept(upload)?;
    let output = session
        .extract(&client, config)
        .await
        .context("Extraction failed")?
        .clone();

    if json {
        let text = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{text}");
    } else {
        print_output(&output, session.form());
    }

    if edit {
        tokio::task::block_in_place(|| edit_form(session.form_mut()))
            .context("Failed to read corrections")?;
    }

    if let Some(path) = draft_path {
        let file = DraftFile::new(
            config.variant,
            config.fields.clone(),
            Some(output.file_name.clone()),
            output.autofill.clone(),
            session.form(),
        );
        file.save(path).await.context("Failed to write draft")?;
        if !cli.quiet {
            eprintln!("{} draft written to {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if submit {
        let submission = submit_session(cli, &mut session, no_save)?;
        let report = AccuracyReport::compare(&output.autofill, &submission.record);
        print_submission(&submission, &report);
    } else if !cli.quiet && !json {
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  {}ms total",
            dim(&output.stats.total_input_tokens.to_string()),
            dim(&output.stats.total_output_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

async fn run_submit(cli: &Cli, draft_path: &Path, no_save: bool) -> Result<()> {
    let file = DraftFile::load(draft_path)
        .await
        .with_context(|| format!("Cannot load draft {}", draft_path.display()))?;
    let draft = file.to_draft().context("Draft does not match its field list")?;

    let label = if file.fields.is_some() {
        "custom".to_string()
    } else {
        file.variant.to_string()
    };
    let mut session = FormSession::new(label, file.canonical());
    *session.form_mut() = draft;

    let submission = submit_session(cli, &mut session, no_save)?;
    let report = AccuracyReport::compare(&file.autofill, &submission.record);
    print_submission(&submission, &report);
    Ok(())
}

fn submit_session(cli: &Cli, session: &mut FormSession, no_save: bool) -> Result<Submission> {
    let submission = if no_save {
        session.submit_unsaved()?
    } else {
        let persistence = PersistenceConfig::new(cli.db_url.clone(), cli.db_fallback.clone());
        session.submit_with(|| SqliteSink::connect(&persistence))?
    };
    Ok(submission)
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(
    cli: &Cli,
    fields: Option<CanonicalFieldList>,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .variant(cli.variant)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout);

    if let Some(fields) = fields {
        builder = builder.fields(fields);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Read `--fields-file`, if given.
async fn load_fields(cli: &Cli) -> Result<Option<CanonicalFieldList>> {
    let Some(ref path) = cli.fields_file else {
        return Ok(None);
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read field list from {:?}", path))?;
    let fields: CanonicalFieldList = serde_json::from_str(&text)
        .with_context(|| format!("{:?} must hold a JSON array of unique field names", path))?;
    Ok(Some(fields))
}

fn print_output(output: &ExtractionOutput, form: &FormDraft) {
    println!("{}", bold("Combined extraction"));
    for (key, value) in &output.combined {
        println!("  {}: {}", key, display_value(value));
    }

    println!();
    println!(
        "{}  {}",
        bold("Autofilled form"),
        dim(&format!(
            "{}/{} fields",
            output.stats.matched_fields, output.stats.total_fields
        ))
    );
    let width = form.fields().iter().map(|f| f.chars().count()).max().unwrap_or(0);
    for (field, value) in form.values() {
        if value.is_empty() {
            println!("  {:<width$}  {}", field, dim("(empty)"));
        } else {
            println!("  {:<width$}  {}", field, value);
        }
    }
}

fn print_submission(submission: &Submission, report: &AccuracyReport) {
    println!();
    println!("{}", bold("Submitted form"));
    for (field, value) in &submission.record.values {
        println!("  {}: {}", field, display_value(value));
    }

    println!();
    println!(
        "Field accuracy: {:.2}%   Average character accuracy: {:.2}%",
        report.field_accuracy, report.average_char_accuracy
    );

    match submission.persisted {
        Persisted::Saved { ref id } => eprintln!("{} form saved ({})", green("✔"), dim(id)),
        Persisted::Failed { ref reason } => {
            eprintln!("{} form not saved: {}", red("✘"), reason)
        }
        Persisted::Skipped => eprintln!("{} form not saved (--no-save)", cyan("⚠")),
    }
}

/// Prompt for each field. Empty input keeps the value, `-` clears it.
fn edit_form(form: &mut FormDraft) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let fields: Vec<String> = form.fields().iter().map(str::to_string).collect();

    eprintln!("{}", dim("Enter keeps a value, '-' clears it."));
    for field in fields {
        let current = form.get(&field).unwrap_or_default().to_string();
        eprint!("{} [{}]: ", bold(&field), current);
        io::stderr().flush().ok();

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        match line.trim() {
            "" => {}
            "-" => form.set(&field, "")?,
            value => form.set(&field, value)?,
        }
    }
    Ok(())
}
