//! Plain text, Markdown, JSON and CSV pass straight through as text.

use super::{
    read_all, ConversionOutcome, DocumentConverter, DocumentConverterResult, FormatMatcher,
};
use crate::config::ConvertOptions;
use crate::pipeline::charset::{decode_text, looks_like_text};
use crate::pipeline::input::ReadSeek;
use crate::stream_info::StreamInfo;
use std::io::Read;
use tracing::debug;

const TEXT_FORMATS: FormatMatcher = FormatMatcher::new(
    &[".txt", ".text", ".md", ".markdown", ".json", ".jsonl", ".csv"],
    &["text/", "application/json", "application/markdown"],
);

/// How much of a format-less stream is checked before calling it text.
const TEXT_SAMPLE_BYTES: u64 = 4096;

/// Emits the decoded text unchanged.
///
/// Besides known text types, a guess that carries no format evidence at all
/// is accepted when its first bytes decode as UTF-8 without NULs.
#[derive(Debug, Default)]
pub struct PlainTextConverter;

impl DocumentConverter for PlainTextConverter {
    fn name(&self) -> &str {
        "PlainTextConverter"
    }

    fn accepts(
        &self,
        stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> bool {
        if TEXT_FORMATS.matches(stream_info) {
            return true;
        }
        if stream_info.mimetype.is_some() || !stream_info.extension_lower().is_empty() {
            return false;
        }

        let mut sample = Vec::new();
        match stream.take(TEXT_SAMPLE_BYTES).read_to_end(&mut sample) {
            Ok(_) => {
                let text = looks_like_text(&sample);
                debug!("Format-less stream sampled as text: {text}");
                text
            }
            Err(_) => false,
        }
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> ConversionOutcome {
        let bytes = match read_all(stream) {
            Ok(b) => b,
            Err(e) => return ConversionOutcome::Failed(e.into()),
        };
        let (text, encoding) = decode_text(&bytes, stream_info.charset.as_deref());
        debug!("Decoded {} bytes as {}", bytes.len(), encoding.name());
        ConversionOutcome::Converted(DocumentConverterResult::new(text))
    }
}
