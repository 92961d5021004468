//! What is known about a byte stream's format.
//!
//! A [`StreamInfo`] is an immutable value: every refinement (a sniffed
//! mimetype, a caller-supplied charset) produces a new value through
//! [`StreamInfo::merge`] or the consuming `with_*` setters. Every field is
//! independently optional; the presence of one field never implies another.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Metadata describing a stream: format identity plus where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamInfo {
    /// IANA media type, e.g. `text/html`.
    pub mimetype: Option<String>,
    /// File extension including the leading dot, e.g. `.pdf`.
    pub extension: Option<String>,
    /// Text encoding label, e.g. `utf-8`.
    pub charset: Option<String>,
    /// Display name: from a local path, a URL, or a transport header.
    pub filename: Option<String>,
    /// Filesystem origin when read from disk.
    pub local_path: Option<String>,
    /// Network origin when the bytes came from a URL.
    pub url: Option<String>,
}

impl StreamInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe a file on disk: extension, filename and local path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            extension: extension_of(path),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            local_path: Some(path.to_string_lossy().into_owned()),
            ..Self::default()
        }
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Set the extension, adding the leading dot when missing.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(normalize_extension(extension.into()));
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_local_path(mut self, local_path: impl Into<String>) -> Self {
        self.local_path = Some(local_path.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Overlay the non-empty fields of `update` onto a copy of `self`.
    ///
    /// Neither input is modified. Fields of `self` survive only where
    /// `update` has `None`.
    pub fn merge(&self, update: &StreamInfo) -> StreamInfo {
        StreamInfo {
            mimetype: update.mimetype.clone().or_else(|| self.mimetype.clone()),
            extension: update.extension.clone().or_else(|| self.extension.clone()),
            charset: update.charset.clone().or_else(|| self.charset.clone()),
            filename: update.filename.clone().or_else(|| self.filename.clone()),
            local_path: update
                .local_path
                .clone()
                .or_else(|| self.local_path.clone()),
            url: update.url.clone().or_else(|| self.url.clone()),
        }
    }

    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self == &StreamInfo::default()
    }

    /// `true` when the value carries format evidence (mimetype or extension).
    pub fn has_format(&self) -> bool {
        self.mimetype.is_some() || self.extension.is_some()
    }

    /// The best name to hand the sniffer as a filename hint.
    ///
    /// Prefers `filename`, then the last component of `local_path`, then the
    /// last path segment of `url`, and finally a placeholder carrying only
    /// the known extension.
    pub fn filename_hint(&self) -> Option<String> {
        if let Some(name) = self.filename.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        if let Some(name) = self
            .local_path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
        {
            return Some(name.to_string_lossy().into_owned());
        }
        if let Some(segment) = self.url.as_deref().and_then(url_last_segment) {
            return Some(segment);
        }
        self.extension
            .as_deref()
            .map(|ext| format!("placeholder{ext}"))
    }

    /// Lower-cased mimetype, or `""` when absent.
    pub fn mimetype_lower(&self) -> String {
        self.mimetype.as_deref().unwrap_or_default().to_ascii_lowercase()
    }

    /// Lower-cased extension, or `""` when absent.
    pub fn extension_lower(&self) -> String {
        self.extension.as_deref().unwrap_or_default().to_ascii_lowercase()
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref m) = self.mimetype {
            parts.push(format!("mimetype={m}"));
        }
        if let Some(ref e) = self.extension {
            parts.push(format!("extension={e}"));
        }
        if let Some(ref c) = self.charset {
            parts.push(format!("charset={c}"));
        }
        if let Some(ref n) = self.filename {
            parts.push(format!("filename={n}"));
        }
        if let Some(ref u) = self.url {
            parts.push(format!("url={u}"));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Extension of `path` with a leading dot, if it has one.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
}

fn normalize_extension(ext: String) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

fn url_last_segment(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = after_scheme.split_once('/')?;
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
