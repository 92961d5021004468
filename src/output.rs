//! Conversion output types.

use crate::error::FailedAttempt;
use crate::stream_info::StreamInfo;
use serde::Serialize;

/// The complete result of converting one input.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The Markdown document.
    pub markdown: String,

    /// Document title, when the converter found one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Name of the converter that produced `markdown`.
    pub converter: String,

    /// The guess the winning converter accepted.
    pub stream_info: StreamInfo,

    /// Every guess dispatch was given, most confident first.
    pub guesses: Vec<StreamInfo>,

    pub stats: ConversionStats,
}

/// Dispatch and timing statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    /// `convert` calls made, the successful one included.
    pub attempts: usize,

    /// Converters that accepted a guess but failed on it before one
    /// succeeded.
    pub failed_attempts: Vec<FailedAttempt>,

    /// Wall-clock time from open to normalised output.
    pub duration_ms: u64,
}

/// Result of one input of [`crate::convert_batch`].
#[derive(Debug)]
pub struct BatchItem {
    /// Display name of the input (its path).
    pub input: String,
    pub result: Result<ConversionOutput, crate::error::Doc2MdError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
