//! PDF text extraction via `pdf-extract`.
//!
//! Only the text layer is read: scanned PDFs without one convert to an
//! empty document. Page breaks (form feeds) become blank lines.

use super::{
    read_all, ConversionOutcome, DocumentConverter, DocumentConverterResult, FormatMatcher,
};
use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::pipeline::input::ReadSeek;
use crate::stream_info::StreamInfo;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

const PDF_FORMATS: FormatMatcher =
    FormatMatcher::new(&[".pdf"], &["application/pdf", "application/x-pdf"]);

#[derive(Debug, Default)]
pub struct PdfConverter;

impl DocumentConverter for PdfConverter {
    fn name(&self) -> &str {
        "PdfConverter"
    }

    fn accepts(
        &self,
        _stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> bool {
        PDF_FORMATS.matches(stream_info)
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        _stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> ConversionOutcome {
        let bytes = match read_all(stream) {
            Ok(b) => b,
            Err(e) => return ConversionOutcome::Failed(e.into()),
        };
        // Leading whitespace is tolerated the same way the sniffer tolerates it.
        let body = skip_ascii_whitespace(&bytes);
        if !body.starts_with(b"%PDF-") {
            debug!("No %PDF- header; not a PDF");
            return ConversionOutcome::NotApplicable;
        }
        if body.len() < bytes.len() {
            debug!("Skipped {} bytes before the %PDF- header", bytes.len() - body.len());
        }

        // pdf-extract panics on some malformed object streams.
        let extracted =
            catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(body)));
        match extracted {
            Ok(Ok(text)) => ConversionOutcome::Converted(DocumentConverterResult::new(
                text.replace('\u{000C}', "\n\n"),
            )),
            Ok(Err(e)) => ConversionOutcome::Failed(ConvertError::Parse(e.to_string())),
            Err(_) => ConversionOutcome::Failed(ConvertError::Parse(
                "PDF text extraction aborted on malformed content".into(),
            )),
        }
    }
}

fn skip_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
