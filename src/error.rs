//! Error types for the doc2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Doc2MdError`] — **Fatal**: the conversion cannot proceed at all
//!   (bad input kind, file missing, every guess × converter combination
//!   exhausted). Returned as `Err(Doc2MdError)` from the facade.
//!
//! * [`ConvertError`] — **Non-fatal**: a single converter failed on a single
//!   guess. It is carried inside
//!   [`crate::converters::ConversionOutcome::Failed`] and recorded as a
//!   [`FailedAttempt`]; dispatch moves on to the next converter.
//!
//! Sniffing never produces either type. A malformed archive or a stream
//! without a recognisable signature simply yields fewer guesses.

use crate::stream_info::StreamInfo;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the doc2md library.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A converter input was constructed from an unrecognised source kind.
    #[error("Invalid converter input kind '{kind}': expected \"filepath\" or \"object\"")]
    InvalidInputKind { kind: String },

    /// The input kind is valid but the matching payload was not supplied.
    #[error("Converter input of kind '{kind}' was constructed without a source")]
    MissingInputSource { kind: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Dispatch errors ───────────────────────────────────────────────────
    /// Every guess × converter combination was tried and none accepted.
    #[error("Unsupported format: no converter accepted {}", describe_guesses(.guesses))]
    UnsupportedFormat { guesses: Vec<StreamInfo> },

    /// A converter exists for this format but its library was not compiled in.
    #[error(
        "{converter} could convert {guess} but is unavailable.\n\
         Rebuild with `--features {feature}` to enable it."
    )]
    MissingDependency {
        converter: String,
        feature: String,
        guess: StreamInfo,
    },

    /// At least one converter accepted the stream but all of them failed.
    #[error("Conversion failed after {} attempt(s):\n{}", .attempts.len(), describe_attempts(.attempts))]
    ConversionFailed { attempts: Vec<FailedAttempt> },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or seeking the input stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error raised by one converter for one guess.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The format library rejected the content.
    #[error("parse error: {0}")]
    Parse(String),

    /// The bytes could not be decoded as text in the expected charset.
    #[error("decode error: {0}")]
    Decode(String),
}

/// One converter × guess combination that ended in [`ConvertError`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailedAttempt {
    pub converter: String,
    pub guess: StreamInfo,
    pub error: String,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: {}", self.converter, self.guess, self.error)
    }
}

fn describe_guesses(guesses: &[StreamInfo]) -> String {
    if guesses.is_empty() {
        return "a stream of unknown type".to_string();
    }
    guesses
        .iter()
        .map(|g| g.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("  - {a}"))
        .collect::<Vec<_>>()
        .join("\n")
}
