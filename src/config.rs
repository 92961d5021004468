//! Configuration types for document conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a
//! config can be shared across the batch worker threads and logged as a
//! whole.
//!
//! Converter-specific settings do not get fields here: they travel in the
//! open [`ConvertOptions`] bag, which each converter reads by key.

use crate::error::Doc2MdError;
use crate::pipeline::sniff::SniffOptions;
use crate::progress::ConversionProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Smallest accepted sniff window. Signature tables look up to 262 bytes in
/// (the tar magic sits at offset 257).
pub const MIN_SNIFF_BYTES: usize = 262;
/// Largest accepted sniff window.
pub const MAX_SNIFF_BYTES: usize = 16 * 1024 * 1024;

/// Named string options handed to every converter.
///
/// Recognised keys are converter-specific (`url`, `style_map`,
/// `file_extension`, …). Keys a converter does not know are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConvertOptions(BTreeMap<String, String>);

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consuming setter, for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConvertOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Parse a `KEY=VALUE` pair. The value may itself contain `=`.
pub fn parse_key_value(raw: &str) -> Result<(String, String), Doc2MdError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(Doc2MdError::InvalidConfig(format!(
            "expected KEY=VALUE, got '{raw}'"
        ))),
    }
}

/// Configuration for a conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use doc2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .max_sniff_bytes(4096)
///     .concurrency(8)
///     .option("url", "https://en.wikipedia.org/wiki/Rust")
///     .build()
///     .unwrap();
/// assert_eq!(config.options.get("url"), Some("https://en.wikipedia.org/wiki/Rust"));
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Bytes from the stream start that signature sniffing sees. Range:
    /// 262 – 16 MiB. Default: 8192.
    pub max_sniff_bytes: usize,

    /// Retry signature sniffing once after skipping leading ASCII whitespace
    /// when the first pass matches nothing. Default: true.
    ///
    /// Catches text-ish formats that tools prefix with a newline (XML, SVG,
    /// PDF written by sloppy generators).
    pub trim_whitespace_retry: bool,

    /// Pass converter output through [`crate::pipeline::postprocess`].
    /// Default: true.
    pub normalize_output: bool,

    /// Worker threads used by [`crate::convert_batch`]. Default: 4.
    pub concurrency: usize,

    /// Options handed to every converter.
    pub options: ConvertOptions,

    /// Optional per-file progress callback (batch conversions).
    pub progress_callback: Option<Arc<dyn ConversionProgressCallback>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_sniff_bytes: 8192,
            trim_whitespace_retry: true,
            normalize_output: true,
            concurrency: 4,
            options: ConvertOptions::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_sniff_bytes", &self.max_sniff_bytes)
            .field("trim_whitespace_retry", &self.trim_whitespace_retry)
            .field("normalize_output", &self.normalize_output)
            .field("concurrency", &self.concurrency)
            .field("options", &self.options)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The sniffing subset of this config.
    pub fn sniff_options(&self) -> SniffOptions {
        SniffOptions {
            max_sniff_bytes: self.max_sniff_bytes,
            trim_whitespace_retry: self.trim_whitespace_retry,
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_sniff_bytes(mut self, n: usize) -> Self {
        self.config.max_sniff_bytes = n;
        self
    }

    pub fn trim_whitespace_retry(mut self, v: bool) -> Self {
        self.config.trim_whitespace_retry = v;
        self
    }

    pub fn normalize_output(mut self, v: bool) -> Self {
        self.config.normalize_output = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    /// Replace the whole options bag.
    pub fn options(mut self, options: ConvertOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Set one converter option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.options.insert(key, value);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn ConversionProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2MdError> {
        let c = &self.config;
        if !(MIN_SNIFF_BYTES..=MAX_SNIFF_BYTES).contains(&c.max_sniff_bytes) {
            return Err(Doc2MdError::InvalidConfig(format!(
                "max_sniff_bytes must be {MIN_SNIFF_BYTES}–{MAX_SNIFF_BYTES}, got {}",
                c.max_sniff_bytes
            )));
        }
        if c.concurrency == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
