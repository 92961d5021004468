//! CLI binary for doc2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use doc2md::config::parse_key_value;
use doc2md::{
    write_output, BatchItem, ConversionConfig, ConversionOutput, ConversionProgressCallback,
    DocumentConverterHub, ProgressCallback, StreamInfo,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
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

/// Batch progress bar with one log line per finished file. Files finish out
/// of order on the worker pool, so start times are keyed by index.
struct CliProgressCallback {
    bar: ProgressBar,
    names: Mutex<HashMap<usize, (String, Instant)>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names: Mutex::new(HashMap::new()),
        })
    }

    fn finish_file(&self, index: usize) -> (String, f64) {
        self.names
            .lock()
            .ok()
            .and_then(|mut names| names.remove(&index))
            .map(|(name, t)| (name, t.elapsed().as_secs_f64()))
            .unwrap_or_default()
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} files…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(index, (name.to_string(), Instant::now()));
        }
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, _total: usize, markdown_len: usize) {
        let (name, secs) = self.finish_file(index);
        self.bar.println(format!(
            "  {} {:<40}  {:<8}  {}",
            green("✓"),
            name,
            dim(&format!("{markdown_len:>6} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, _total: usize, error: &str) {
        let (name, secs) = self.finish_file(index);

        // First line only; dispatch errors can list many attempts.
        let first = error.lines().next().unwrap_or_default();
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a document (stdout)
  doc2md report.docx

  # Convert to file
  doc2md report.docx -o report.md

  # Read from stdin; hints help when there is no filename
  curl -s https://example.org/ | doc2md - --mimetype text/html

  # Wikipedia pages keep only the article body
  doc2md page.html --url https://en.wikipedia.org/wiki/Rust

  # Convert many files into a directory
  doc2md *.docx *.xlsx -o markdown/ -c 8

  # Show what a file looks like to the sniffer
  doc2md --inspect-only mystery.bin

  # JSON output with the winning converter and attempt stats
  doc2md --json report.docx > report.json

  # Which converters are compiled in?
  doc2md --list-converters

CONVERTER OPTIONS (--option KEY=VALUE):
  file_extension   Extension hint when the input has none (e.g. .csv)
  url              Source URL, used by the Wikipedia converter
  style_map        DOCX style mapping, e.g. "Title => h1; Aside => quote"

ENVIRONMENT VARIABLES:
  RUST_LOG         Override the log filter (e.g. doc2md=debug)
"#;

/// Convert documents to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert documents (HTML, DOCX, XLSX, PDF, text) to Markdown",
    long_about = "Convert documents to Markdown. The format of every input is sniffed from its \
name and content (ZIP containers are looked into), then the first converter that accepts a \
guess and succeeds produces the Markdown.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files; `-` reads stdin.
    #[arg(required_unless_present = "list_converters")]
    inputs: Vec<String>,

    /// Output file (one input) or directory (several inputs).
    #[arg(short, long, env = "DOC2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Extension hint, e.g. `.html`.
    #[arg(long)]
    extension: Option<String>,

    /// Mimetype hint, e.g. `text/html`.
    #[arg(long)]
    mimetype: Option<String>,

    /// Charset hint for text inputs, e.g. `windows-1252`.
    #[arg(long)]
    charset: Option<String>,

    /// URL the input was fetched from.
    #[arg(long)]
    url: Option<String>,

    /// Converter option as KEY=VALUE (repeatable).
    #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    options: Vec<(String, String)>,

    /// Print the ranked format guesses only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// Do not retry signature sniffing after leading whitespace.
    #[arg(long)]
    no_trim_retry: bool,

    /// Emit converter output without Markdown normalisation.
    #[arg(long, env = "DOC2MD_NO_NORMALIZE")]
    no_normalize: bool,

    /// Bytes from the start of a stream used for signature sniffing.
    #[arg(long, env = "DOC2MD_MAX_SNIFF_BYTES", default_value_t = 8192)]
    max_sniff_bytes: usize,

    /// Files converted in parallel.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// List registered converters and exit.
    #[arg(long)]
    list_converters: bool,
}

fn parse_option(raw: &str) -> std::result::Result<(String, String), String> {
    parse_key_value(raw).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let batch = cli.inputs.len() > 1;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during batches.
    let show_progress = progress_enabled(&cli);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let hub = DocumentConverterHub::new(config);
    let hints = build_hints(&cli);

    // ── List converters ──────────────────────────────────────────────────
    if cli.list_converters {
        let entries = hub.registry().describe();
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("Failed to serialise registry")?
            );
        } else {
            for entry in entries {
                println!("{entry}");
            }
        }
        return Ok(());
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        return run_inspect(&cli, &hub, &hints);
    }

    // ── Run conversion ───────────────────────────────────────────────────
    if batch {
        run_batch(&cli, &hub, &hints)
    } else {
        run_single(&cli, &hub, &hints)
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_sniff_bytes(cli.max_sniff_bytes)
        .trim_whitespace_retry(!cli.no_trim_retry)
        .normalize_output(!cli.no_normalize)
        .concurrency(cli.concurrency);

    for (key, value) in &cli.options {
        builder = builder.option(key.clone(), value.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_hints(cli: &Cli) -> StreamInfo {
    let mut hints = StreamInfo::new();
    if let Some(ref ext) = cli.extension {
        hints = hints.with_extension(ext.clone());
    }
    if let Some(ref mimetype) = cli.mimetype {
        hints = hints.with_mimetype(mimetype.clone());
    }
    if let Some(ref charset) = cli.charset {
        hints = hints.with_charset(charset.clone());
    }
    if let Some(ref url) = cli.url {
        hints = hints.with_url(url.clone());
    }
    hints
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    io::stdin()
        .lock()
        .read_to_end(&mut buf)
        .context("Failed to read stdin")?;
    Ok(buf)
}

fn run_inspect(cli: &Cli, hub: &DocumentConverterHub, hints: &StreamInfo) -> Result<()> {
    let mut report = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let guesses = if input == "-" {
            let mut stream = io::Cursor::new(read_stdin()?);
            hub.inspect_stream(&mut stream, hints)
        } else {
            let path = Path::new(input);
            let file = File::open(path).with_context(|| format!("Failed to open {input}"))?;
            let base = StreamInfo::from_path(path).merge(hints);
            hub.inspect_stream(&mut BufReader::new(file), &base)
        };
        report.push((input.as_str(), guesses));
    }

    if cli.json {
        let json: Vec<_> = report
            .iter()
            .map(|(input, guesses)| serde_json::json!({ "input": input, "guesses": guesses }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise guesses")?
        );
        return Ok(());
    }

    for (input, guesses) in report {
        println!("File:  {input}");
        for (rank, guess) in guesses.iter().enumerate() {
            println!("  {:>2}. {guess}", rank + 1);
        }
    }
    Ok(())
}

fn run_single(cli: &Cli, hub: &DocumentConverterHub, hints: &StreamInfo) -> Result<()> {
    let input = cli.inputs.first().map(String::as_str).unwrap_or("-");
    let output = if input == "-" {
        hub.convert_reader(io::stdin().lock(), hints)
    } else {
        hub.convert_path(input, hints)
    }
    .with_context(|| format!("Conversion of {input} failed"))?;

    let rendered = render(cli, &output)?;
    match cli.output {
        Some(ref path) => {
            write_output(path, &rendered).context("Failed to write output")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {}  {}ms  →  {}",
                    green("✔"),
                    output.converter,
                    output.stats.duration_ms,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            // Ensure a trailing newline on stdout.
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet && !output.stats.failed_attempts.is_empty() {
        eprintln!(
            "{} {} converter(s) failed before {} succeeded",
            cyan("⚠"),
            output.stats.failed_attempts.len(),
            output.converter
        );
    }
    Ok(())
}

fn run_batch(cli: &Cli, hub: &DocumentConverterHub, hints: &StreamInfo) -> Result<()> {
    if cli.inputs.iter().any(|i| i == "-") {
        bail!("`-` (stdin) can only be used as the sole input");
    }
    if let Some(ref dir) = cli.output {
        if dir.is_file() {
            bail!(
                "--output must be a directory when converting several inputs: {}",
                dir.display()
            );
        }
    }

    let paths: Vec<PathBuf> = cli.inputs.iter().map(PathBuf::from).collect();
    let items = hub.convert_batch(&paths, hints).context("Batch conversion failed")?;

    match cli.output {
        Some(ref dir) => {
            for item in &items {
                if let Ok(ref output) = item.result {
                    let target = output_path_in(dir, &item.input, cli.json);
                    write_output(&target, &render(cli, output)?)
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                }
            }
        }
        None if cli.json => {
            let json: Vec<_> = items.iter().map(batch_item_json).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to serialise output")?
            );
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            for output in items.iter().filter_map(|i| i.result.as_ref().ok()) {
                handle
                    .write_all(output.markdown.as_bytes())
                    .context("Failed to write to stdout")?;
                handle.write_all(b"\n").ok();
            }
        }
    }

    let failed: Vec<&BatchItem> = items.iter().filter(|i| !i.is_ok()).collect();
    if !progress_enabled(cli) && !cli.quiet {
        for item in &failed {
            if let Err(ref e) = item.result {
                eprintln!("{} {}: {e}", red("✗"), item.input);
            }
        }
    }
    if !failed.is_empty() {
        bail!("{} of {} inputs failed", failed.len(), items.len());
    }
    Ok(())
}

/// Progress bars are drawn for batches only, and never alongside JSON.
fn progress_enabled(cli: &Cli) -> bool {
    cli.inputs.len() > 1 && !cli.quiet && !cli.no_progress && !cli.json
}

fn render(cli: &Cli, output: &ConversionOutput) -> Result<String> {
    if cli.json {
        serde_json::to_string_pretty(output).context("Failed to serialise output")
    } else {
        Ok(output.markdown.clone())
    }
}

/// `<dir>/<input stem>.md` (or `.json`).
fn output_path_in(dir: &Path, input: &str, json: bool) -> PathBuf {
    let stem = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dir.join(format!("{stem}.{}", if json { "json" } else { "md" }))
}

fn batch_item_json(item: &BatchItem) -> serde_json::Value {
    match item.result {
        Ok(ref output) => serde_json::json!({ "input": item.input, "output": output }),
        Err(ref e) => serde_json::json!({ "input": item.input, "error": e.to_string() }),
    }
}
