//! Stream sniffing: infer format guesses from bytes plus a filename hint.
//!
//! ## Guess order
//!
//! ```text
//! 1. filename hint  ── mime_guess(ext) ──────────────▶ {mimetype, extension}
//! 2. first 4 bytes == "PK\x03\x04" ── probe_zip ─────▶ {…}  (return early)
//! 3. signature sniffing (infer) ── empty? ── skip leading whitespace, retry
//! 4. every signature match ── substitute(mimetype) ──▶ {mimetype, extension}
//! ```
//!
//! Guesses are ordered by descending confidence and the dispatcher tries them
//! in that order. Sniffing never fails: unreadable or unrecognisable input
//! simply yields fewer guesses. The stream position is the same before and
//! after [`StreamSniffer::guess`].
//!
//! A ZIP-signature stream whose central directory cannot be read is *not*
//! treated as "archive or nothing": it falls through to signature sniffing,
//! which still reports it as `application/zip`.

use crate::pipeline::input::restore_position;
use crate::pipeline::substitute::substitute;
use crate::pipeline::zip_probe::probe_zip;
use crate::stream_info::{extension_of, StreamInfo};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// ZIP local-file-header signature.
const ZIP_SIGNATURE: [u8; 4] = *b"PK\x03\x04";

/// Space, tab, LF, CR, vertical tab, form feed.
const ASCII_WHITESPACE: [u8; 6] = [b' ', b'\t', b'\n', b'\r', 0x0B, 0x0C];

/// Knobs for [`StreamSniffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffOptions {
    /// How many bytes from the current position signature matching sees.
    pub max_sniff_bytes: usize,
    /// Retry signature matching once after skipping leading ASCII whitespace.
    pub trim_whitespace_retry: bool,
}

impl Default for SniffOptions {
    fn default() -> Self {
        Self {
            max_sniff_bytes: 8192,
            trim_whitespace_retry: true,
        }
    }
}

/// One signature match: what a magic-byte library believes the bytes are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicMatch {
    pub mimetype: Option<String>,
    /// With leading dot.
    pub extension: Option<String>,
}

/// A magic-byte matcher.
///
/// Implementations return matches in descending confidence. `filename_hint`
/// is auxiliary evidence an implementation may use to break ties; it must
/// never be the sole reason for a match.
pub trait SignatureSniffer: Send + Sync {
    fn sniff(&self, head: &[u8], filename_hint: Option<&str>) -> Vec<MagicMatch>;
}

/// [`SignatureSniffer`] backed by the `infer` signature table.
pub struct InferSniffer {
    infer: infer::Infer,
}

impl InferSniffer {
    pub fn new() -> Self {
        Self {
            infer: infer::Infer::new(),
        }
    }
}

impl Default for InferSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureSniffer for InferSniffer {
    fn sniff(&self, head: &[u8], filename_hint: Option<&str>) -> Vec<MagicMatch> {
        let mut matches = Vec::new();

        // When the bytes also satisfy the signature for the hinted extension,
        // that reading is the stronger one (e.g. OLE containers that match
        // several Office signatures).
        let hinted_ext = filename_hint
            .and_then(|h| Path::new(h).extension())
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        let primary = self.infer.get(head);

        if let Some(ext) = hinted_ext.as_deref() {
            let differs = primary.map(|t| t.extension() != ext).unwrap_or(true);
            if differs && self.infer.is(head, ext) {
                debug!("Signature for hinted extension .{ext} also matches");
                matches.push(MagicMatch {
                    mimetype: mime_guess::from_ext(ext)
                        .first()
                        .map(|m| m.essence_str().to_string()),
                    extension: Some(format!(".{ext}")),
                });
            }
        }

        if let Some(kind) = primary {
            matches.push(MagicMatch {
                mimetype: Some(kind.mime_type().to_string()),
                extension: Some(format!(".{}", kind.extension())),
            });
        }

        matches
    }
}

/// Produces ranked [`StreamInfo`] guesses for a stream.
pub struct StreamSniffer {
    options: SniffOptions,
    signatures: Box<dyn SignatureSniffer>,
}

impl Default for StreamSniffer {
    fn default() -> Self {
        Self::new(SniffOptions::default())
    }
}

impl StreamSniffer {
    pub fn new(options: SniffOptions) -> Self {
        Self {
            options,
            signatures: Box::new(InferSniffer::new()),
        }
    }

    /// Replace the signature matcher (useful for custom signature tables).
    pub fn with_signatures(mut self, signatures: Box<dyn SignatureSniffer>) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn options(&self) -> &SniffOptions {
        &self.options
    }

    /// Guess the stream's format. The stream position is left unchanged.
    pub fn guess<R: Read + Seek + ?Sized>(
        &self,
        stream: &mut R,
        filename_hint: Option<&str>,
    ) -> Vec<StreamInfo> {
        let mut guesses = Vec::new();

        if let Some(guess) = filename_hint.and_then(guess_from_hint) {
            debug!("Filename hint guess: {guess}");
            guesses.push(guess);
        }

        match restore_position(stream, |s| self.guess_from_content(s, filename_hint)) {
            Ok(content_guesses) => guesses.extend(content_guesses),
            Err(e) => debug!("Sniffing skipped, stream not seekable: {e}"),
        }

        guesses
    }

    fn guess_from_content<R: Read + Seek + ?Sized>(
        &self,
        stream: &mut R,
        filename_hint: Option<&str>,
    ) -> Vec<StreamInfo> {
        let start = match stream.stream_position() {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };

        if peek_signature(stream, start) == Some(ZIP_SIGNATURE) {
            if let Some(guess) = probe_zip(stream) {
                debug!("ZIP container guess: {guess}");
                return vec![guess];
            }
            debug!("ZIP signature without a readable central directory");
        }

        let mut matches = self.sniff_at(stream, start, filename_hint);

        if matches.is_empty() && self.options.trim_whitespace_retry {
            match skip_leading_whitespace(stream, start) {
                Ok(skipped) if skipped > 0 => {
                    debug!("No signature match; retrying after {skipped} whitespace bytes");
                    matches = self.sniff_at(stream, start + skipped, filename_hint);
                }
                Ok(_) => {}
                Err(e) => debug!("Whitespace retry failed: {e}"),
            }
        }

        matches
            .into_iter()
            .filter_map(|m| {
                let mut info = StreamInfo::new();
                if let Some(ext) = m.extension.filter(|e| !e.is_empty()) {
                    info = info.with_extension(ext);
                }
                if let Some(mimetype) = m.mimetype.filter(|m| !m.is_empty()) {
                    info = info.with_mimetype(substitute(&mimetype));
                }
                info.has_format().then_some(info)
            })
            .collect()
    }

    fn sniff_at<R: Read + Seek + ?Sized>(
        &self,
        stream: &mut R,
        offset: u64,
        filename_hint: Option<&str>,
    ) -> Vec<MagicMatch> {
        match read_head(stream, offset, self.options.max_sniff_bytes) {
            Ok(head) if !head.is_empty() => self.signatures.sniff(&head, filename_hint),
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!("Signature sniffing could not read stream: {e}");
                Vec::new()
            }
        }
    }
}

/// Guess with the default signature table.
pub fn guess_stream_info<R: Read + Seek + ?Sized>(
    stream: &mut R,
    filename_hint: Option<&str>,
    options: &SniffOptions,
) -> Vec<StreamInfo> {
    StreamSniffer::new(*options).guess(stream, filename_hint)
}

/// Mimetype + extension derived purely from a filename.
fn guess_from_hint(hint: &str) -> Option<StreamInfo> {
    let mimetype = mime_guess::from_path(hint).first()?;
    let extension = extension_of(Path::new(hint)).unwrap_or_default();
    Some(
        StreamInfo::new()
            .with_mimetype(mimetype.essence_str())
            .with_extension(extension),
    )
}

fn peek_signature<R: Read + Seek + ?Sized>(stream: &mut R, offset: u64) -> Option<[u8; 4]> {
    let mut header = [0u8; 4];
    stream.seek(SeekFrom::Start(offset)).ok()?;
    stream.read_exact(&mut header).ok()?;
    Some(header)
}

fn read_head<R: Read + Seek + ?Sized>(
    stream: &mut R,
    offset: u64,
    limit: usize,
) -> io::Result<Vec<u8>> {
    stream.seek(SeekFrom::Start(offset))?;
    let mut head = Vec::with_capacity(limit.min(64 * 1024));
    stream.take(limit as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Count the ASCII whitespace bytes starting at `offset`.
fn skip_leading_whitespace<R: Read + Seek + ?Sized>(stream: &mut R, offset: u64) -> io::Result<u64> {
    stream.seek(SeekFrom::Start(offset))?;
    let mut skipped = 0u64;
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(skipped);
        }
        match chunk[..n].iter().position(|b| !ASCII_WHITESPACE.contains(b)) {
            Some(idx) => return Ok(skipped + idx as u64),
            None => skipped += n as u64,
        }
    }
}
