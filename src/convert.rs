//! Conversion entry points.
//!
//! [`DocumentConverterHub`] owns a converter registry, a sniffer and a
//! [`ConversionConfig`]; build one when converting many inputs, or when you
//! register converters of your own. The free functions ([`convert`],
//! [`convert_to_file`], [`convert_batch`], [`inspect`]) build a hub with the
//! built-in converters for a single call.
//!
//! Every entry point ends in [`DocumentConverterHub::convert_stream`]:
//!
//! ```text
//! caller hints ─▶ base StreamInfo ─▶ sniff ─▶ guess list ─▶ dispatch ─▶ normalise
//! ```

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::output::{BatchItem, ConversionOutput, ConversionStats};
use crate::pipeline::dispatch::ConverterRegistry;
use crate::pipeline::input::{open_file, ConverterInput, ReadSeek};
use crate::pipeline::postprocess::normalize_markdown;
use crate::pipeline::sniff::StreamSniffer;
use crate::stream_info::StreamInfo;
use rayon::prelude::*;
use std::fmt;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A converter registry plus the configuration it runs with.
///
/// `Send + Sync`: one hub can serve many threads.
///
/// # Example
/// ```rust,no_run
/// use doc2md::{ConversionConfig, DocumentConverterHub, StreamInfo};
///
/// # fn main() -> Result<(), doc2md::Doc2MdError> {
/// let hub = DocumentConverterHub::new(ConversionConfig::default());
/// let html = b"<html><body><h1>Hi</h1></body></html>";
/// let output = hub.convert_bytes(html, &StreamInfo::new().with_extension(".html"))?;
/// assert!(output.markdown.contains("Hi"));
/// # Ok(())
/// # }
/// ```
pub struct DocumentConverterHub {
    registry: ConverterRegistry,
    sniffer: StreamSniffer,
    config: ConversionConfig,
}

impl fmt::Debug for DocumentConverterHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentConverterHub")
            .field("registry", &self.registry)
            .field("sniff_options", self.sniffer.options())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for DocumentConverterHub {
    fn default() -> Self {
        Self::new(ConversionConfig::default())
    }
}

impl DocumentConverterHub {
    /// A hub with the built-in converters.
    pub fn new(config: ConversionConfig) -> Self {
        Self::with_registry(config, ConverterRegistry::with_builtins())
    }

    pub fn with_registry(config: ConversionConfig, registry: ConverterRegistry) -> Self {
        Self {
            sniffer: StreamSniffer::new(config.sniff_options()),
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Mutable access for registering converters after construction.
    pub fn registry_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert a local file.
    ///
    /// The path supplies `local_path`, `filename` and `extension`; any field
    /// set in `hints` wins over the path-derived one.
    pub fn convert_path(
        &self,
        path: impl AsRef<Path>,
        hints: &StreamInfo,
    ) -> Result<ConversionOutput, Doc2MdError> {
        let path = path.as_ref();
        let base = StreamInfo::from_path(path).merge(hints);
        let mut reader = BufReader::new(open_file(path)?);
        self.convert_stream(&mut reader, &base)
    }

    /// Convert an in-memory buffer.
    pub fn convert_bytes(
        &self,
        bytes: &[u8],
        hints: &StreamInfo,
    ) -> Result<ConversionOutput, Doc2MdError> {
        self.convert_stream(&mut Cursor::new(bytes), hints)
    }

    /// Convert a non-seekable reader (a pipe, a socket) by buffering it fully
    /// into memory first.
    pub fn convert_reader(
        &self,
        mut reader: impl Read,
        hints: &StreamInfo,
    ) -> Result<ConversionOutput, Doc2MdError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        debug!("Buffered {} bytes from a non-seekable reader", buf.len());
        self.convert_bytes(&buf, hints)
    }

    /// Convert a [`ConverterInput`].
    ///
    /// Path-backed inputs behave like [`Self::convert_path`]. Object-backed
    /// inputs are read from their current position, which is where they are
    /// left afterwards.
    pub fn convert_input(
        &self,
        input: &mut ConverterInput,
        hints: &StreamInfo,
    ) -> Result<ConversionOutput, Doc2MdError> {
        let base = match input.path() {
            Some(path) => StreamInfo::from_path(path).merge(hints),
            None => hints.clone(),
        };
        let mut handle = input.open()?;
        self.convert_stream(&mut handle, &base)
    }

    /// Convert a seekable stream from its current position.
    ///
    /// On success and on every dispatch error the stream position is back
    /// where it was on entry.
    pub fn convert_stream(
        &self,
        stream: &mut dyn ReadSeek,
        hints: &StreamInfo,
    ) -> Result<ConversionOutput, Doc2MdError> {
        let started = Instant::now();

        // ── Step 1: Resolve guesses ──────────────────────────────────────────
        let guesses = self.inspect_stream(stream, hints);
        info!(
            "Converting {} ({} guess(es))",
            hints.filename_hint().unwrap_or_else(|| "<stream>".into()),
            guesses.len()
        );

        // ── Step 2: Dispatch ─────────────────────────────────────────────────
        let dispatched = self
            .registry
            .dispatch(stream, &guesses, &self.config.options)?;

        // ── Step 3: Post-process markdown ────────────────────────────────────
        let markdown = if self.config.normalize_output {
            normalize_markdown(&dispatched.result.markdown)
        } else {
            dispatched.result.markdown
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Converted with {} in {}ms ({} attempt(s))",
            dispatched.converter, duration_ms, dispatched.attempts
        );

        Ok(ConversionOutput {
            markdown,
            title: dispatched.result.title,
            converter: dispatched.converter,
            stream_info: dispatched.stream_info,
            guesses,
            stats: ConversionStats {
                attempts: dispatched.attempts,
                failed_attempts: dispatched.failed_attempts,
                duration_ms,
            },
        })
    }

    /// The guess list [`Self::convert_stream`] would dispatch on.
    ///
    /// Caller hints are merged under every sniffed guess. When the hints name
    /// a format that no sniffed guess agrees with, the hints themselves are
    /// tried first. An input nothing is known about yields the hints alone,
    /// so format-less text can still reach the plain-text converter.
    pub fn inspect_stream(&self, stream: &mut dyn ReadSeek, hints: &StreamInfo) -> Vec<StreamInfo> {
        let base = self.base_info(hints);
        let hint = base.filename_hint();
        let sniffed = self.sniffer.guess(stream, hint.as_deref());

        let mut guesses: Vec<StreamInfo> = Vec::with_capacity(sniffed.len() + 1);
        if base.has_format() && !sniffed.iter().any(|g| agrees_with(g, &base)) {
            debug!("Caller hints {base} not corroborated by sniffing; trying them first");
            guesses.push(base.clone());
        }
        for guess in &sniffed {
            let merged = base.merge(guess);
            if !guesses.contains(&merged) {
                guesses.push(merged);
            }
        }
        if guesses.is_empty() {
            guesses.push(base);
        }
        guesses
    }

    /// Convert many files on a worker pool bounded by
    /// [`ConversionConfig::concurrency`].
    ///
    /// `hints` apply to every file, under its path-derived fields. One failed
    /// file never stops the batch; results keep input order.
    pub fn convert_batch(
        &self,
        inputs: &[PathBuf],
        hints: &StreamInfo,
    ) -> Result<Vec<BatchItem>, Doc2MdError> {
        let total = inputs.len();
        let callback = self.config.progress_callback.as_deref();
        if let Some(cb) = callback {
            cb.on_batch_start(total);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .build()
            .map_err(|e| Doc2MdError::InvalidConfig(format!("worker pool: {e}")))?;

        let items: Vec<BatchItem> = pool.install(|| {
            inputs
                .par_iter()
                .enumerate()
                .map(|(index, path)| {
                    let name = path.display().to_string();
                    if let Some(cb) = callback {
                        cb.on_file_start(index, total, &name);
                    }
                    let result = self.convert_path(path, hints);
                    match (&result, callback) {
                        (Ok(output), Some(cb)) => {
                            cb.on_file_complete(index, total, output.markdown.len())
                        }
                        (Err(e), Some(cb)) => cb.on_file_error(index, total, &e.to_string()),
                        _ => {}
                    }
                    if let Err(ref e) = result {
                        warn!("Failed to convert {name}: {e}");
                    }
                    BatchItem {
                        input: name,
                        result,
                    }
                })
                .collect()
        });

        let success_count = items.iter().filter(|i| i.is_ok()).count();
        info!("Batch complete: {success_count}/{total} converted");
        if let Some(cb) = callback {
            cb.on_batch_complete(total, success_count);
        }
        Ok(items)
    }

    /// Caller hints plus the `file_extension` option when no extension is
    /// known otherwise.
    fn base_info(&self, hints: &StreamInfo) -> StreamInfo {
        match self.config.options.get("file_extension") {
            Some(ext) if hints.extension.is_none() => hints.clone().with_extension(ext),
            _ => hints.clone(),
        }
    }
}

/// `true` when `guess` carries every format field that `base` sets.
fn agrees_with(guess: &StreamInfo, base: &StreamInfo) -> bool {
    let extension_ok = base.extension.is_none() || guess.extension_lower() == base.extension_lower();
    let mimetype_ok = base.mimetype.is_none() || guess.mimetype_lower() == base.mimetype_lower();
    extension_ok && mimetype_ok
}

/// Convert a local file to Markdown with the built-in converters.
///
/// # Errors
/// - [`Doc2MdError::FileNotFound`] / [`Doc2MdError::PermissionDenied`]
/// - [`Doc2MdError::UnsupportedFormat`] when no converter accepted any guess
/// - [`Doc2MdError::MissingDependency`] when the format needs a disabled
///   cargo feature
/// - [`Doc2MdError::ConversionFailed`] when every accepting converter failed
pub fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    DocumentConverterHub::new(config.clone()).convert_path(input, &StreamInfo::new())
}

/// Convert `input` and write the Markdown to `output`.
///
/// The file is written atomically: Markdown goes to a temporary file in the
/// destination directory which is then renamed over `output`, so a failed
/// or interrupted write never leaves a partial file behind. Missing parent
/// directories are created.
pub fn convert_to_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    let output = output.as_ref();
    let result = convert(input, config)?;
    write_output(output, &result.markdown)?;
    info!("Wrote {} bytes to {}", result.markdown.len(), output.display());
    Ok(result)
}

/// Convert many files with the built-in converters. See
/// [`DocumentConverterHub::convert_batch`].
pub fn convert_batch(
    inputs: &[PathBuf],
    config: &ConversionConfig,
) -> Result<Vec<BatchItem>, Doc2MdError> {
    DocumentConverterHub::new(config.clone()).convert_batch(inputs, &StreamInfo::new())
}

/// The guess list for a local file, without converting it.
pub fn inspect(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<Vec<StreamInfo>, Doc2MdError> {
    let path = input.as_ref();
    let hub = DocumentConverterHub::new(config.clone());
    let mut reader = BufReader::new(open_file(path)?);
    Ok(hub.inspect_stream(&mut reader, &StreamInfo::from_path(path)))
}

/// Write `contents` to `output` atomically, creating missing parent
/// directories.
pub fn write_output(output: &Path, contents: &str) -> Result<(), Doc2MdError> {
    let write_err = |source: std::io::Error| Doc2MdError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    };

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.persist(output).map_err(|e| write_err(e.error))?;
    Ok(())
}
