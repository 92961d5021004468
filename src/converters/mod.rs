//! Document converters.
//!
//! A converter is two operations over a seekable stream plus the
//! [`StreamInfo`] guess currently being tried:
//!
//! * [`DocumentConverter::accepts`] — a cheap, side-effect-free predicate,
//!   usually a mimetype/extension check;
//! * [`DocumentConverter::convert`] — the actual work, ending in one of the
//!   three [`ConversionOutcome`]s.
//!
//! The dispatcher ([`crate::pipeline::dispatch`]) rewinds the stream before
//! each call, so converters may read freely from the current position and
//! need not restore it.
//!
//! | Converter | Priority | Cargo feature |
//! |-----------|----------|---------------|
//! | [`PlainTextConverter`] | generic | — |
//! | `HtmlConverter` | generic | `html` |
//! | `WikipediaConverter` | specific | `html` |
//! | `DocxConverter` | specific | `docx` |
//! | `XlsxConverter` | specific | `xlsx` |
//! | `XlsConverter` | specific | `xls` |
//! | `PdfConverter` | specific | `pdf` |
//!
//! OneNote (`.one`) has no backend and is always registered as a missing
//! capability.

use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::pipeline::input::ReadSeek;
use crate::stream_info::StreamInfo;
use serde::Serialize;
use std::io::{self, Read};

#[cfg(feature = "docx")]
pub mod docx;
#[cfg(feature = "html")]
pub mod html;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod plain_text;
#[cfg(any(feature = "docx", feature = "xlsx", feature = "xls"))]
pub(crate) mod table;
#[cfg(feature = "html")]
pub mod wikipedia;
#[cfg(feature = "xls")]
pub mod xls;
#[cfg(feature = "xlsx")]
pub mod xlsx;

#[cfg(feature = "docx")]
pub use docx::DocxConverter;
#[cfg(feature = "html")]
pub use html::HtmlConverter;
#[cfg(feature = "pdf")]
pub use pdf::PdfConverter;
pub use plain_text::PlainTextConverter;
#[cfg(feature = "html")]
pub use wikipedia::WikipediaConverter;
#[cfg(feature = "xls")]
pub use xls::XlsConverter;
#[cfg(feature = "xlsx")]
pub use xlsx::XlsxConverter;

/// Priority for converters that target one concrete format. Runs first.
pub const PRIORITY_SPECIFIC_FILE_FORMAT: f64 = 0.0;
/// Priority for catch-all converters (text, HTML). Runs after specific ones.
pub const PRIORITY_GENERIC_FILE_FORMAT: f64 = 10.0;

/// Markdown produced by a converter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentConverterResult {
    pub markdown: String,
    pub title: Option<String>,
}

impl DocumentConverterResult {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.filter(|t| !t.trim().is_empty());
        self
    }
}

/// What happened when a converter ran.
#[derive(Debug)]
pub enum ConversionOutcome {
    /// Done; dispatch stops here.
    Converted(DocumentConverterResult),
    /// The converter looked closer and this is not its format after all;
    /// dispatch continues with the next converter for the same guess.
    NotApplicable,
    /// The converter owns this format but could not process the content;
    /// dispatch records the attempt and continues.
    Failed(ConvertError),
}

impl From<Result<DocumentConverterResult, ConvertError>> for ConversionOutcome {
    fn from(r: Result<DocumentConverterResult, ConvertError>) -> Self {
        match r {
            Ok(result) => ConversionOutcome::Converted(result),
            Err(e) => ConversionOutcome::Failed(e),
        }
    }
}

/// A single-format document converter.
///
/// Implementations must be `Send + Sync`: one registry is shared by every
/// worker of a batch conversion.
pub trait DocumentConverter: Send + Sync {
    /// Stable display name, used in logs, errors and `--list-converters`.
    fn name(&self) -> &str;

    /// Whether this converter wants to try `stream_info`.
    fn accepts(
        &self,
        stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        options: &ConvertOptions,
    ) -> bool;

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        options: &ConvertOptions,
    ) -> ConversionOutcome;
}

/// Extension + mimetype-prefix matcher shared by converters and missing
/// capabilities.
#[derive(Debug, Clone, Copy)]
pub struct FormatMatcher {
    /// Lower-case, with leading dot.
    pub extensions: &'static [&'static str],
    /// Lower-case mimetype prefixes (`"text/"`, `"application/xhtml"`).
    pub mimetype_prefixes: &'static [&'static str],
}

impl FormatMatcher {
    pub const fn new(
        extensions: &'static [&'static str],
        mimetype_prefixes: &'static [&'static str],
    ) -> Self {
        Self {
            extensions,
            mimetype_prefixes,
        }
    }

    /// `true` when the guess's extension or mimetype matches.
    pub fn matches(&self, info: &StreamInfo) -> bool {
        let ext = info.extension_lower();
        if !ext.is_empty() && self.extensions.contains(&ext.as_str()) {
            return true;
        }
        let mimetype = info.mimetype_lower();
        !mimetype.is_empty()
            && self
                .mimetype_prefixes
                .iter()
                .any(|prefix| mimetype.starts_with(prefix))
    }
}

/// Read everything from the current position.
pub(crate) fn read_all(stream: &mut dyn ReadSeek) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}
