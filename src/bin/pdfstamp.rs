//! CLI binary for pdf-filing-stamp.
//!
//! Maps flags and `PDFSTAMP_*` variables onto `StampConfig`, runs one
//! document and prints a summary.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_filing_stamp::{
    inspect, stamp_file, ProgressCallback, StampConfig, StampProgressCallback,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

/// Terminal progress: one bar covering both page loops (render, then OCR),
/// so its length is twice the page count.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total_steps: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} steps  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_steps as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }
}

impl StampProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages * 2);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Stamping {total_pages} pages…"))
        ));
    }

    fn on_page_rendered(&self, index: usize, total_pages: usize) {
        self.bar
            .set_message(format!("page {}/{}", index + 1, total_pages));
        self.bar.inc(1);
    }

    fn on_page_recognized(&self, index: usize, total_pages: usize, word_count: usize) {
        self.bar.set_prefix("Recognising");
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total_pages,
            dim(&format!("{word_count:>5} words")),
        ));
        self.bar.inc(1);
    }

    fn on_stamped(&self, _total_pages: usize) {
        self.bar.set_prefix("Stamping");
    }

    // The summary line is printed by `main` once the file is written.
    fn on_run_complete(&self, _total_pages: usize, _elapsed_ms: u64) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR and stamp, writing document.stamped.pdf next to the input
  pdfstamp document.pdf

  # Explicit output, organisation and date
  pdfstamp filing.pdf -o out/filing.pdf --organization "Acme Corp" --date 2024-03-07

  # Inspect page count and sizes (no OCR engine needed)
  pdfstamp --inspect-only document.pdf

  # Machine-readable run report
  pdfstamp --json document.pdf -o stamped.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDFSTAMP_TESSDATA       Directory with tesseract language models
  PDFSTAMP_LANGUAGE       OCR language(s), e.g. eng or eng+deu
  PDFSTAMP_ORGANIZATION   Organisation printed in the stamp
  RUST_LOG                Override the log filter

SETUP:
  Requires libpdfium and libtesseract with the chosen language model
  installed (e.g. apt install libtesseract-dev tesseract-ocr-eng).
"#;

/// OCR a PDF and stamp its first page with a dated filing label.
#[derive(Parser, Debug)]
#[command(
    name = "pdfstamp",
    version,
    about = "Make a PDF searchable and stamp its first page with a filing label",
    long_about = "Rasterises every page of a PDF, runs OCR to add an invisible text layer, \
and stamps the first page with \"FILED <date> <organization>\". The output keeps the \
source page sizes.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input PDF file.
    input: PathBuf,

    /// Output file. Default: <input>.stamped.pdf
    #[arg(short, long, env = "PDFSTAMP_OUTPUT")]
    output: Option<PathBuf>,

    /// Organisation printed after the date.
    #[arg(long, env = "PDFSTAMP_ORGANIZATION")]
    organization: Option<String>,

    /// Word printed before the date.
    #[arg(long, env = "PDFSTAMP_PREFIX")]
    prefix: Option<String>,

    /// Stamp date as YYYY-MM-DD. Default: today.
    #[arg(long, env = "PDFSTAMP_DATE", value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// chrono strftime pattern for the date in the label.
    #[arg(long, env = "PDFSTAMP_DATE_FORMAT")]
    date_format: Option<String>,

    /// Size of the embedded first page relative to the page (0–1].
    #[arg(long, env = "PDFSTAMP_FIT", default_value_t = 0.9)]
    fit: f32,

    /// Title written to the output document info.
    #[arg(long, env = "PDFSTAMP_TITLE")]
    title: Option<String>,

    /// Supersampling factor before OCR (1, 2, 4 or 8).
    #[arg(long, env = "PDFSTAMP_SCALE", default_value_t = 4.0)]
    scale: f32,

    /// Encode rendered pages as PNG instead of JPEG.
    #[arg(long, env = "PDFSTAMP_LOSSLESS")]
    lossless: bool,

    /// JPEG quality for rendered pages (1–100).
    #[arg(long, env = "PDFSTAMP_JPEG_QUALITY", default_value_t = 92,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// OCR language model(s).
    #[arg(long, env = "PDFSTAMP_LANGUAGE", default_value = "eng")]
    language: String,

    /// Directory holding tesseract language models.
    #[arg(long, env = "PDFSTAMP_TESSDATA")]
    tessdata: Option<PathBuf>,

    /// libpdfium file or directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSTAMP_PASSWORD")]
    password: Option<String>,

    /// Print a JSON run report (or document info with --inspect-only).
    #[arg(long, env = "PDFSTAMP_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFSTAMP_NO_PROGRESS")]
    no_progress: bool,

    /// Print page count and sizes only, no OCR.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSTAMP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSTAMP_QUIET")]
    quiet: bool,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}.stamped.pdf"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO lines would tear the progress bar; only errors get through.
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let bytes = tokio::fs::read(&cli.input)
            .await
            .with_context(|| format!("Failed to read {}", cli.input.display()))?;
        let info = inspect(&bytes).context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            println!("Encrypted:    {}", info.is_encrypted);
            for page in &info.pages {
                println!(
                    "  page {:>3}:  {:.1} × {:.1} pt",
                    page.index + 1,
                    page.size.width,
                    page.size.height
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn StampProgressCallback>)
    } else {
        None
    };

    // Ctrl-C stops the run between pages; engines are still torn down.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let config = build_config(&cli, progress_cb, cancel)?;
    let output_path = cli.output.clone().unwrap_or_else(|| default_output(&cli.input));

    // ── Run ──────────────────────────────────────────────────────────────
    let report = stamp_file(&cli.input, &output_path, &config)
        .await
        .context("Stamping failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {} words  {}ms  →  {}",
            green("✔"),
            report.stats.page_count,
            report.stats.total_words,
            report.stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        eprintln!("   {}", dim(&report.label));
    }

    Ok(())
}

/// Map CLI args to `StampConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: Arc<AtomicBool>,
) -> Result<StampConfig> {
    let mut builder = StampConfig::builder()
        .scale(cli.scale)
        .language(cli.language.clone())
        .fit_scale(cli.fit)
        .cancel_flag(cancel);

    builder = if cli.lossless {
        builder.raster_format(pdf_filing_stamp::RasterFormat::Png)
    } else {
        builder.jpeg_quality(cli.jpeg_quality)
    };
    if let Some(ref org) = cli.organization {
        builder = builder.organization(org.clone());
    }
    if let Some(ref prefix) = cli.prefix {
        builder = builder.label_prefix(prefix.clone());
    }
    if let Some(ref format) = cli.date_format {
        builder = builder.date_format(format.clone());
    }
    if let Some(ref title) = cli.title {
        builder = builder.document_title(title.clone());
    }
    if let Some(date) = cli.date {
        builder = builder.stamp_date(date);
    }
    if let Some(ref dir) = cli.tessdata {
        builder = builder.model_dir(dir.clone());
    }
    if let Some(ref lib) = cli.pdfium {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pdfstamp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn run_complete_only_clears_the_bar() {
        let cb = CliProgressCallback::new_dynamic();
        cb.on_run_start(2);
        cb.on_run_complete(2, 1200);
        assert!(cb.bar.is_finished());
    }

    #[test]
    fn time_only_date_format_is_a_config_error() {
        let cli = cli(&["in.pdf", "--date-format", "%H:%M"]);
        let err = build_config(&cli, None, Arc::new(AtomicBool::new(false))).unwrap_err();
        assert!(format!("{err:#}").contains("%H:%M"), "got {err:#}");
    }

    #[test]
    fn scale_without_exact_inverse_is_a_config_error() {
        let cli = cli(&["in.pdf", "--scale", "3"]);
        assert!(build_config(&cli, None, Arc::new(AtomicBool::new(false))).is_err());
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("scans/letter.pdf")),
            PathBuf::from("scans/letter.stamped.pdf")
        );
    }
}
