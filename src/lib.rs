//! # doc2md
//!
//! Convert documents of any common type to Markdown.
//!
//! Callers rarely know for sure what a byte stream contains: a file may lack
//! an extension, carry the wrong one, or arrive with only a transport
//! mimetype. This crate first works out a ranked list of format guesses from
//! every available clue, then hands the stream to the first converter that
//! both accepts a guess and succeeds on it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes + hints
//!  │
//!  ├─ 1. Sniff     filename hint → ZIP container probe → magic signatures
//!  │               (mimetypes canonicalised, stream position untouched)
//!  ├─ 2. Dispatch  guesses × converters in priority order, first success wins
//!  ├─ 3. Polish    Markdown normalisation (line endings, headings, tables)
//!  └─ 4. Output    Markdown + title + winning guess + attempt stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2md::{convert, ConversionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let output = convert("report.docx", &config)?;
//!     println!("{}", output.markdown);
//!     eprintln!("converted by {} as {}", output.converter, output.stream_info);
//!     Ok(())
//! }
//! ```
//!
//! Sniffing alone:
//!
//! ```rust
//! use doc2md::{guess_stream_info, SniffOptions};
//! use std::io::Cursor;
//!
//! let mut stream = Cursor::new(b"%PDF-1.7\n".to_vec());
//! let guesses = guess_stream_info(&mut stream, None, &SniffOptions::default());
//! assert_eq!(guesses[0].mimetype.as_deref(), Some("application/pdf"));
//! assert_eq!(stream.position(), 0);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | The `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `html`  | on      | HTML and Wikipedia converters (html5ever + html2md) |
//! | `docx`  | on      | Word converter (quick-xml) |
//! | `xlsx`  | on      | Excel converter (umya-spreadsheet) |
//! | `xls`   | off     | Legacy Excel converter (calamine) |
//! | `pdf`   | off     | PDF text-layer converter (pdf-extract) |
//!
//! A converter whose feature is off stays in the registry as a missing
//! capability: a document it would have handled fails with
//! [`Doc2MdError::MissingDependency`] naming the feature to enable, instead
//! of a vague "unsupported format".

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod converters;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream_info;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ConvertOptions};
pub use convert::{
    convert, convert_batch, convert_to_file, inspect, write_output, DocumentConverterHub,
};
pub use converters::{
    ConversionOutcome, DocumentConverter, DocumentConverterResult,
    PRIORITY_GENERIC_FILE_FORMAT, PRIORITY_SPECIFIC_FILE_FORMAT,
};
pub use error::{ConvertError, Doc2MdError, FailedAttempt};
pub use output::{BatchItem, ConversionOutput, ConversionStats};
pub use pipeline::dispatch::{ConverterRegistry, MissingCapability, RegistryEntry};
pub use pipeline::input::{ConverterInput, InputKind, ReadSeek};
pub use pipeline::sniff::{guess_stream_info, SniffOptions, StreamSniffer};
pub use pipeline::substitute::substitute;
pub use pipeline::zip_probe::probe_zip;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream_info::StreamInfo;
