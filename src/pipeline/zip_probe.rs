//! ZIP container disambiguation.
//!
//! Office Open XML documents, EPUB books and Java archives are all ZIP files;
//! magic-byte sniffing stops at "this is a ZIP". The prober reads the central
//! directory (entry names only, never entry contents, except the tiny root
//! `mimetype` entry) and maps the manifest layout to a concrete format.
//!
//! ## Precedence
//!
//! ```text
//! [Content_Types].xml ─┬─ word/document.xml     → .docx
//!                      ├─ xl/workbook.xml       → .xlsx
//!                      ├─ ppt/presentation.xml  → .pptx
//!                      ├─ visio/document.xml    → .vsd
//!                      └─ FixedDocSeq.fdseq     → .xps
//! mimetype entry       → its (ASCII, trimmed) contents, e.g. EPUB
//! META-INF/MANIFEST.MF → .jar
//! anything else        → .zip
//! ```
//!
//! The first matching rule wins even when several markers coexist.

use crate::pipeline::input::restore_position;
use crate::stream_info::StreamInfo;
use std::collections::HashSet;
use std::io::{Read, Seek};
use tracing::debug;
use zip::ZipArchive;

pub const DOCX_MIMETYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX_MIMETYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const PPTX_MIMETYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const VISIO_MIMETYPE: &str = "application/vnd.ms-visio.drawing";
pub const XPS_MIMETYPE: &str = "application/vnd.ms-xpsdocument";
pub const JAR_MIMETYPE: &str = "application/java-archive";
pub const ZIP_MIMETYPE: &str = "application/zip";

/// OPC package markers, checked in order once `[Content_Types].xml` exists.
const OPC_MARKERS: &[(&str, &str, &str)] = &[
    ("word/document.xml", DOCX_MIMETYPE, ".docx"),
    ("xl/workbook.xml", XLSX_MIMETYPE, ".xlsx"),
    ("ppt/presentation.xml", PPTX_MIMETYPE, ".pptx"),
    ("visio/document.xml", VISIO_MIMETYPE, ".vsd"),
    ("FixedDocSeq.fdseq", XPS_MIMETYPE, ".xps"),
];

/// Guess the format of a ZIP container from its entry names.
///
/// Returns `None` only when the archive cannot be opened (corrupt or
/// truncated central directory). The stream position is restored.
pub fn probe_zip<R: Read + Seek + ?Sized>(stream: &mut R) -> Option<StreamInfo> {
    restore_position(stream, |s| probe_archive(s)).ok().flatten()
}

fn probe_archive<R: Read + Seek + ?Sized>(stream: &mut R) -> Option<StreamInfo> {
    let mut archive = match ZipArchive::new(&mut *stream) {
        Ok(a) => a,
        Err(e) => {
            debug!("ZIP probe: malformed archive ({e})");
            return None;
        }
    };

    let names: HashSet<String> = archive.file_names().map(str::to_string).collect();

    if names.contains("[Content_Types].xml") {
        for (marker, mimetype, extension) in OPC_MARKERS {
            if names.contains(*marker) {
                debug!("ZIP probe: OPC package with {marker} → {extension}");
                return Some(
                    StreamInfo::new()
                        .with_mimetype(*mimetype)
                        .with_extension(*extension),
                );
            }
        }
    }

    if names.contains("mimetype") {
        if let Some(mimetype) = read_mimetype_entry(&mut archive) {
            debug!("ZIP probe: mimetype entry declares {mimetype}");
            let mut info = StreamInfo::new();
            if let Some(ext) = extension_for_mimetype(&mimetype) {
                info = info.with_extension(ext);
            }
            return Some(info.with_mimetype(mimetype));
        }
    }

    if names.contains("META-INF/MANIFEST.MF") {
        return Some(
            StreamInfo::new()
                .with_mimetype(JAR_MIMETYPE)
                .with_extension(".jar"),
        );
    }

    Some(
        StreamInfo::new()
            .with_mimetype(ZIP_MIMETYPE)
            .with_extension(".zip"),
    )
}

/// Contents of the root `mimetype` entry, if it is non-empty ASCII.
fn read_mimetype_entry<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<String> {
    let mut entry = archive.by_name("mimetype").ok()?;
    let mut raw = Vec::new();
    entry.read_to_end(&mut raw).ok()?;
    if !raw.is_ascii() {
        debug!("ZIP probe: ignoring non-ASCII mimetype entry");
        return None;
    }
    let text = String::from_utf8(raw).ok()?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Preferred extension (with leading dot) for a mimetype.
pub(crate) fn extension_for_mimetype(mimetype: &str) -> Option<String> {
    mime_guess::get_mime_extensions_str(mimetype)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
}
