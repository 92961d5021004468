//! Converter dispatch: pick the converter that runs for a stream.
//!
//! ## Algorithm
//!
//! ```text
//! for guess in guesses                      (descending confidence)
//!   for converter in registry               (ascending priority)
//!     rewind ─ accepts? ─ no ──▶ next converter
//!     rewind ─ convert ─┬─ Converted      ──▶ return
//!                       ├─ NotApplicable  ──▶ next converter
//!                       └─ Failed(e)      ──▶ record, next converter
//! exhausted:
//!   any Failed            ──▶ ConversionFailed { attempts }
//!   a missing capability  ──▶ MissingDependency { converter, feature }
//!     accepted a guess
//!   otherwise             ──▶ UnsupportedFormat { guesses }
//! ```
//!
//! Converters with equal priority run most-recently-registered first, so a
//! caller's registration overrides a built-in at the same priority.

use crate::config::ConvertOptions;
use crate::converters::{
    ConversionOutcome, DocumentConverter, DocumentConverterResult, FormatMatcher,
    PlainTextConverter, PRIORITY_GENERIC_FILE_FORMAT, PRIORITY_SPECIFIC_FILE_FORMAT,
};
use crate::error::{Doc2MdError, FailedAttempt};
use crate::pipeline::input::ReadSeek;
use crate::stream_info::StreamInfo;
use std::fmt;
use std::io::{Seek, SeekFrom};
use tracing::{debug, info, warn};

/// A converter that exists but whose format library was not compiled in.
///
/// It takes part in `accepts` matching and never converts. When dispatch
/// fails and one of these matched a guess, the caller learns which cargo
/// feature to enable.
#[derive(Debug, Clone)]
pub struct MissingCapability {
    pub converter: String,
    pub feature: String,
    pub extensions: &'static [&'static str],
    pub mimetype_prefixes: &'static [&'static str],
}

impl MissingCapability {
    pub fn new(
        converter: impl Into<String>,
        feature: impl Into<String>,
        extensions: &'static [&'static str],
        mimetype_prefixes: &'static [&'static str],
    ) -> Self {
        Self {
            converter: converter.into(),
            feature: feature.into(),
            extensions,
            mimetype_prefixes,
        }
    }

    pub fn matches(&self, info: &StreamInfo) -> bool {
        FormatMatcher::new(self.extensions, self.mimetype_prefixes).matches(info)
    }
}

enum Registered {
    Converter(Box<dyn DocumentConverter>),
    Missing(MissingCapability),
}

struct Registration {
    priority: f64,
    seq: usize,
    entry: Registered,
}

/// One row of [`ConverterRegistry::describe`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegistryEntry {
    pub name: String,
    pub priority: f64,
    pub available: bool,
    /// Cargo feature that enables an unavailable converter.
    pub feature: Option<String>,
}

impl fmt::Display for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<22} priority {:>4}", self.name, self.priority)?;
        match (&self.feature, self.available) {
            (_, true) => Ok(()),
            (Some(feature), false) => write!(f, "  (unavailable: enable feature `{feature}`)"),
            (None, false) => write!(f, "  (unavailable)"),
        }
    }
}

/// The converter that won, and what it cost to find it.
#[derive(Debug)]
pub struct Dispatched {
    pub result: DocumentConverterResult,
    pub converter: String,
    pub stream_info: StreamInfo,
    /// `convert` calls made, the successful one included.
    pub attempts: usize,
    pub failed_attempts: Vec<FailedAttempt>,
}

/// Ordered collection of converters.
///
/// `Send + Sync`; share one registry (e.g. behind an `Arc`) between threads.
pub struct ConverterRegistry {
    entries: Vec<Registration>,
    next_seq: usize,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.describe()).finish()
    }
}

impl ConverterRegistry {
    /// A registry with no converters.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// The built-in converters; formats whose cargo feature is disabled are
    /// registered as [`MissingCapability`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PlainTextConverter, PRIORITY_GENERIC_FILE_FORMAT);

        #[cfg(feature = "html")]
        {
            registry.register(crate::converters::HtmlConverter, PRIORITY_GENERIC_FILE_FORMAT);
            registry.register(
                crate::converters::WikipediaConverter,
                PRIORITY_SPECIFIC_FILE_FORMAT,
            );
        }
        #[cfg(not(feature = "html"))]
        registry.register_missing(
            MissingCapability::new(
                "HtmlConverter",
                "html",
                &[".html", ".htm", ".xhtml"],
                &["text/html", "application/xhtml"],
            ),
            PRIORITY_GENERIC_FILE_FORMAT,
        );

        #[cfg(feature = "docx")]
        registry.register(crate::converters::DocxConverter, PRIORITY_SPECIFIC_FILE_FORMAT);
        #[cfg(not(feature = "docx"))]
        registry.register_missing(
            MissingCapability::new(
                "DocxConverter",
                "docx",
                &[".docx"],
                &[crate::pipeline::zip_probe::DOCX_MIMETYPE],
            ),
            PRIORITY_SPECIFIC_FILE_FORMAT,
        );

        #[cfg(feature = "xlsx")]
        registry.register(crate::converters::XlsxConverter, PRIORITY_SPECIFIC_FILE_FORMAT);
        #[cfg(not(feature = "xlsx"))]
        registry.register_missing(
            MissingCapability::new(
                "XlsxConverter",
                "xlsx",
                &[".xlsx"],
                &[crate::pipeline::zip_probe::XLSX_MIMETYPE],
            ),
            PRIORITY_SPECIFIC_FILE_FORMAT,
        );

        #[cfg(feature = "xls")]
        registry.register(crate::converters::XlsConverter, PRIORITY_SPECIFIC_FILE_FORMAT);
        #[cfg(not(feature = "xls"))]
        registry.register_missing(
            MissingCapability::new(
                "XlsConverter",
                "xls",
                &[".xls"],
                &["application/vnd.ms-excel", "application/excel"],
            ),
            PRIORITY_SPECIFIC_FILE_FORMAT,
        );

        // No OneNote reader exists for any feature set.
        registry.register_missing(
            MissingCapability::new(
                "OneNoteConverter",
                "onenote",
                &[".one"],
                &["application/onenote"],
            ),
            PRIORITY_SPECIFIC_FILE_FORMAT,
        );

        #[cfg(feature = "pdf")]
        registry.register(crate::converters::PdfConverter, PRIORITY_SPECIFIC_FILE_FORMAT);
        #[cfg(not(feature = "pdf"))]
        registry.register_missing(
            MissingCapability::new(
                "PdfConverter",
                "pdf",
                &[".pdf"],
                &["application/pdf", "application/x-pdf"],
            ),
            PRIORITY_SPECIFIC_FILE_FORMAT,
        );

        registry
    }

    /// Register a converter. Lower priorities run first.
    pub fn register(&mut self, converter: impl DocumentConverter + 'static, priority: f64) {
        self.register_boxed(Box::new(converter), priority);
    }

    pub fn register_boxed(&mut self, converter: Box<dyn DocumentConverter>, priority: f64) {
        debug!("Registering {} at priority {priority}", converter.name());
        self.insert(Registered::Converter(converter), priority);
    }

    pub fn register_missing(&mut self, capability: MissingCapability, priority: f64) {
        debug!(
            "Registering unavailable {} (feature `{}`)",
            capability.converter, capability.feature
        );
        self.insert(Registered::Missing(capability), priority);
    }

    fn insert(&mut self, entry: Registered, priority: f64) {
        self.entries.push(Registration {
            priority,
            seq: self.next_seq,
            entry,
        });
        self.next_seq += 1;
        self.entries.sort_by(|a, b| {
            a.priority
                .total_cmp(&b.priority)
                .then_with(|| b.seq.cmp(&a.seq))
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registry rows in dispatch order.
    pub fn describe(&self) -> Vec<RegistryEntry> {
        self.entries
            .iter()
            .map(|r| match &r.entry {
                Registered::Converter(c) => RegistryEntry {
                    name: c.name().to_string(),
                    priority: r.priority,
                    available: true,
                    feature: None,
                },
                Registered::Missing(m) => RegistryEntry {
                    name: m.converter.clone(),
                    priority: r.priority,
                    available: false,
                    feature: Some(m.feature.clone()),
                },
            })
            .collect()
    }

    /// Try every guess against every converter; see the module docs.
    ///
    /// `stream` is rewound to its entry position before every `accepts` and
    /// `convert` call, and once more before returning.
    pub fn dispatch(
        &self,
        stream: &mut dyn ReadSeek,
        guesses: &[StreamInfo],
        options: &ConvertOptions,
    ) -> Result<Dispatched, Doc2MdError> {
        let start = stream.stream_position()?;
        let mut attempts = 0usize;
        let mut failed_attempts = Vec::new();
        let mut missing: Option<(&MissingCapability, &StreamInfo)> = None;

        for guess in guesses {
            debug!("Trying guess {guess}");
            for registration in &self.entries {
                let converter = match &registration.entry {
                    Registered::Converter(c) => c,
                    Registered::Missing(cap) => {
                        if missing.is_none() && cap.matches(guess) {
                            debug!("{} would accept {guess} but is unavailable", cap.converter);
                            missing = Some((cap, guess));
                        }
                        continue;
                    }
                };

                stream.seek(SeekFrom::Start(start))?;
                let accepted = converter.accepts(stream, guess, options);
                stream.seek(SeekFrom::Start(start))?;
                if !accepted {
                    continue;
                }

                attempts += 1;
                debug!("{} accepted {guess}", converter.name());
                match converter.convert(stream, guess, options) {
                    ConversionOutcome::Converted(result) => {
                        stream.seek(SeekFrom::Start(start))?;
                        info!(
                            "Converted with {} ({} bytes of Markdown)",
                            converter.name(),
                            result.markdown.len()
                        );
                        return Ok(Dispatched {
                            result,
                            converter: converter.name().to_string(),
                            stream_info: guess.clone(),
                            attempts,
                            failed_attempts,
                        });
                    }
                    ConversionOutcome::NotApplicable => {
                        debug!("{} declined {guess}", converter.name());
                    }
                    ConversionOutcome::Failed(e) => {
                        warn!("{} failed on {guess}: {e}", converter.name());
                        failed_attempts.push(FailedAttempt {
                            converter: converter.name().to_string(),
                            guess: guess.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        stream.seek(SeekFrom::Start(start))?;

        if !failed_attempts.is_empty() {
            return Err(Doc2MdError::ConversionFailed {
                attempts: failed_attempts,
            });
        }
        if let Some((cap, guess)) = missing {
            return Err(Doc2MdError::MissingDependency {
                converter: cap.converter.clone(),
                feature: cap.feature.clone(),
                guess: guess.clone(),
            });
        }
        Err(Doc2MdError::UnsupportedFormat {
            guesses: guesses.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Accepts guesses with a given extension and returns a fixed outcome.
    struct Scripted {
        name: &'static str,
        extension: &'static str,
        outcome: fn() -> ConversionOutcome,
        log: Log,
    }

    impl DocumentConverter for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn accepts(&self, stream: &mut dyn ReadSeek, info: &StreamInfo, _: &ConvertOptions) -> bool {
            // Consume some input to prove the dispatcher rewinds.
            let mut buf = [0u8; 2];
            let _ = stream.read(&mut buf);
            info.extension.as_deref() == Some(self.extension)
        }

        fn convert(
            &self,
            stream: &mut dyn ReadSeek,
            info: &StreamInfo,
            _: &ConvertOptions,
        ) -> ConversionOutcome {
            let pos = stream.stream_position().unwrap();
            self.log
                .lock()
                .unwrap()
                .push(format!("{}@{}:{}", self.name, info, pos));
            (self.outcome)()
        }
    }

    fn converted() -> ConversionOutcome {
        ConversionOutcome::Converted(DocumentConverterResult::new("ok"))
    }
    fn declined() -> ConversionOutcome {
        ConversionOutcome::NotApplicable
    }
    fn failed() -> ConversionOutcome {
        ConversionOutcome::Failed(ConvertError::Parse("boom".into()))
    }

    fn scripted(
        name: &'static str,
        extension: &'static str,
        outcome: fn() -> ConversionOutcome,
        log: &Log,
    ) -> Scripted {
        Scripted {
            name,
            extension,
            outcome,
            log: Arc::clone(log),
        }
    }

    fn ext(e: &str) -> StreamInfo {
        StreamInfo::new().with_extension(e)
    }

    fn calls(log: &Log) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .map(|entry| entry.split('@').next().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn lower_priority_value_runs_first_and_wins() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("second", ".x", converted, &log), 2.0);
        registry.register(scripted("first", ".x", converted, &log), 1.0);

        let out = registry
            .dispatch(&mut Cursor::new(b"data".to_vec()), &[ext(".x")], &ConvertOptions::new())
            .unwrap();
        assert_eq!(out.converter, "first");
        assert_eq!(out.attempts, 1);
        assert_eq!(calls(&log), vec!["first"]);
    }

    #[test]
    fn not_applicable_falls_through_within_the_same_guess() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("picky", ".x", declined, &log), 1.0);
        registry.register(scripted("fallback", ".x", converted, &log), 2.0);
        registry.register(scripted("other", ".y", converted, &log), 0.0);

        let out = registry
            .dispatch(
                &mut Cursor::new(b"data".to_vec()),
                &[ext(".x"), ext(".y")],
                &ConvertOptions::new(),
            )
            .unwrap();
        assert_eq!(out.converter, "fallback");
        assert_eq!(out.stream_info, ext(".x"));
        assert_eq!(calls(&log), vec!["picky", "fallback"]);
    }

    #[test]
    fn stream_is_rewound_before_every_call() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("a", ".x", declined, &log), 1.0);
        registry.register(scripted("b", ".x", converted, &log), 2.0);

        let mut cursor = Cursor::new(b"0123456789".to_vec());
        cursor.set_position(3);
        registry
            .dispatch(&mut cursor, &[ext(".x")], &ConvertOptions::new())
            .unwrap();
        let entries = log.lock().unwrap().clone();
        assert!(entries.iter().all(|e| e.ends_with(":3")), "{entries:?}");
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn equal_priority_later_registration_runs_first() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("builtin", ".x", converted, &log), 5.0);
        registry.register(scripted("override", ".x", converted, &log), 5.0);

        let out = registry
            .dispatch(&mut Cursor::new(Vec::new()), &[ext(".x")], &ConvertOptions::new())
            .unwrap();
        assert_eq!(out.converter, "override");
    }

    #[test]
    fn failures_are_recorded_and_dispatch_continues() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("broken", ".x", failed, &log), 1.0);
        registry.register(scripted("working", ".x", converted, &log), 2.0);

        let out = registry
            .dispatch(&mut Cursor::new(Vec::new()), &[ext(".x")], &ConvertOptions::new())
            .unwrap();
        assert_eq!(out.converter, "working");
        assert_eq!(out.attempts, 2);
        assert_eq!(out.failed_attempts.len(), 1);
        assert_eq!(out.failed_attempts[0].converter, "broken");
    }

    #[test]
    fn exhaustion_with_failures_is_conversion_failed() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("broken", ".x", failed, &log), 1.0);
        registry.register_missing(MissingCapability::new("Nope", "nope", &[".x"], &[]), 0.0);

        let err = registry
            .dispatch(
                &mut Cursor::new(Vec::new()),
                &[ext(".x"), ext(".x")],
                &ConvertOptions::new(),
            )
            .unwrap_err();
        match err {
            Doc2MdError::ConversionFailed { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts.iter().all(|a| a.error.contains("boom")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exhaustion_with_missing_capability_is_missing_dependency() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("text", ".txt", converted, &log), 10.0);
        registry.register_missing(
            MissingCapability::new("PdfConverter", "pdf", &[".pdf"], &["application/pdf"]),
            0.0,
        );

        let guess = StreamInfo::new().with_mimetype("application/pdf");
        let err = registry
            .dispatch(&mut Cursor::new(Vec::new()), &[guess.clone()], &ConvertOptions::new())
            .unwrap_err();
        match err {
            Doc2MdError::MissingDependency {
                converter,
                feature,
                guess: g,
            } => {
                assert_eq!(converter, "PdfConverter");
                assert_eq!(feature, "pdf");
                assert_eq!(g, guess);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exhaustion_without_takers_is_unsupported_format() {
        let log = Log::default();
        let mut registry = ConverterRegistry::new();
        registry.register(scripted("text", ".txt", converted, &log), 10.0);

        let guesses = vec![ext(".bin"), ext(".dat")];
        let err = registry
            .dispatch(&mut Cursor::new(Vec::new()), &guesses, &ConvertOptions::new())
            .unwrap_err();
        assert!(matches!(err, Doc2MdError::UnsupportedFormat { guesses: g } if g == guesses));
    }

    #[test]
    fn builtins_are_listed_in_dispatch_order() {
        let registry = ConverterRegistry::with_builtins();
        let rows = registry.describe();
        assert!(!rows.is_empty());
        assert!(rows.windows(2).all(|w| w[0].priority <= w[1].priority));
        assert_eq!(rows.last().map(|r| r.name.as_str()), Some("PlainTextConverter"));
        assert!(rows.iter().any(|r| r.name == "DocxConverter"));
        assert!(rows.iter().any(|r| r.name == "PdfConverter"));
        assert!(rows.iter().any(|r| r.name == "XlsConverter"));
        assert!(rows.iter().any(|r| r.name == "OneNoteConverter" && !r.available));
    }

    #[test]
    fn onenote_guess_is_a_missing_dependency() {
        let registry = ConverterRegistry::with_builtins();
        let guesses = vec![StreamInfo::new().with_extension(".one")];
        let err = registry
            .dispatch(
                &mut Cursor::new(b"\xE4\x52\x5C\x7B".to_vec()),
                &guesses,
                &ConvertOptions::new(),
            )
            .unwrap_err();
        match err {
            Doc2MdError::MissingDependency {
                converter, feature, ..
            } => {
                assert_eq!(converter, "OneNoteConverter");
                assert_eq!(feature, "onenote");
            }
            other => panic!("expected MissingDependency, got {other:?}"),
        }
    }

    #[cfg(not(feature = "xls"))]
    #[test]
    fn xls_guess_without_backend_is_a_missing_dependency() {
        let registry = ConverterRegistry::with_builtins();
        let guesses = vec![StreamInfo::new().with_mimetype("application/vnd.ms-excel")];
        let err = registry
            .dispatch(&mut Cursor::new(Vec::new()), &guesses, &ConvertOptions::new())
            .unwrap_err();
        assert!(
            matches!(err, Doc2MdError::MissingDependency { ref converter, ref feature, .. }
                if converter == "XlsConverter" && feature == "xls"),
            "{err:?}"
        );
    }

    #[cfg(feature = "xls")]
    #[test]
    fn xls_guess_reaches_the_workbook_reader() {
        let registry = ConverterRegistry::with_builtins();
        let guesses = vec![StreamInfo::new().with_extension(".xls")];
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        bytes.extend_from_slice(&[0u8; 24]);
        let err = registry
            .dispatch(&mut Cursor::new(bytes), &guesses, &ConvertOptions::new())
            .unwrap_err();
        let Doc2MdError::ConversionFailed { attempts } = err else {
            panic!("expected ConversionFailed, got {err:?}");
        };
        assert_eq!(attempts[0].converter, "XlsConverter");
    }

    #[test]
    fn registry_is_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConverterRegistry>();
    }

    #[test]
    fn registry_entry_display() {
        let row = RegistryEntry {
            name: "PdfConverter".into(),
            priority: 0.0,
            available: false,
            feature: Some("pdf".into()),
        };
        assert!(row.to_string().contains("enable feature `pdf`"));
    }
}
