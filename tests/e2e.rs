//! End-to-end integration tests for doc2md.
//!
//! Every fixture is built in memory (ZIP writer, umya-spreadsheet) or written
//! to a temporary directory, so the suite needs no sample files.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

#![cfg(all(feature = "html", feature = "docx", feature = "xlsx"))]

use doc2md::converters::PlainTextConverter;
use doc2md::{
    convert, convert_batch, convert_to_file, inspect, ConversionConfig, ConversionOutcome,
    ConvertError, ConvertOptions, ConverterInput, ConverterRegistry, Doc2MdError,
    DocumentConverter, DocumentConverterHub, MissingCapability, ReadSeek, StreamInfo,
    PRIORITY_GENERIC_FILE_FORMAT, PRIORITY_SPECIFIC_FILE_FORMAT,
};
use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

fn docx_bytes(paragraphs: &[(Option<&str>, &str)]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|(style, text)| {
            let ppr = style
                .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
                .unwrap_or_default();
            format!(r#"<w:p>{ppr}<w:r><w:t>{text}</w:t></w:r></w:p>"#)
        })
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><w:document {W_NS}><w:body>{body}</w:body></w:document>"#
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer.write_all(b"<Types/>").unwrap();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(document.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

fn xlsx_bytes() -> Vec<u8> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.set_name("Prices");
    sheet.get_cell_mut("A1").set_value("Fruit");
    sheet.get_cell_mut("B1").set_value("Price");
    sheet.get_cell_mut("A2").set_value("apple");
    sheet.get_cell_mut("B2").set_value("3");
    let mut cursor = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut cursor).unwrap();
    cursor.into_inner()
}

const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<<>>\n%%EOF\n";

fn hub() -> DocumentConverterHub {
    DocumentConverterHub::new(ConversionConfig::default())
}

/// Assert the markdown passes basic normalisation checks.
fn assert_markdown_quality(md: &str, context: &str) {
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    assert!(md.ends_with('\n'), "[{context}] Markdown must end with a newline");
    assert!(!md.contains("\r"), "[{context}] Output contains carriage returns");
    assert!(
        !md.contains("\n\n\n"),
        "[{context}] Output has more than one consecutive blank line"
    );
}

// ── Sniff + dispatch ─────────────────────────────────────────────────────────

#[test]
fn test_docx_without_any_hint_is_found_inside_the_zip() {
    let bytes = docx_bytes(&[
        (Some("Title"), "Field Notes"),
        (None, "Collected on the ridge."),
    ]);
    let output = hub().convert_bytes(&bytes, &StreamInfo::new()).unwrap();

    assert_eq!(output.converter, "DocxConverter");
    assert_eq!(output.stream_info.extension.as_deref(), Some(".docx"));
    assert_eq!(output.markdown, "# Field Notes\n\nCollected on the ridge.\n");
    assert_markdown_quality(&output.markdown, "docx");
}

#[test]
fn test_extensionless_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report");
    std::fs::write(&path, docx_bytes(&[(Some("Heading1"), "Overview")])).unwrap();

    let output = convert(&path, &ConversionConfig::default()).unwrap();
    assert_eq!(output.converter, "DocxConverter");
    assert_eq!(output.stream_info.filename.as_deref(), Some("report"));
    assert!(output.markdown.starts_with("# Overview"));
}

#[test]
fn test_xlsx_renders_sheet_tables() {
    let output = hub().convert_bytes(&xlsx_bytes(), &StreamInfo::new()).unwrap();
    assert_eq!(output.converter, "XlsxConverter");
    assert_eq!(
        output.markdown,
        "## Prices\n\n| Fruit | Price |\n| --- | --- |\n| apple | 3 |\n"
    );
}

#[test]
fn test_html_with_extension_hint() {
    let html = b"<html><head><title>Trail guide</title></head>\
                 <body><h1>Trails</h1><p>Start at the <b>north</b> gate.</p></body></html>";
    let output = hub()
        .convert_bytes(html, &StreamInfo::new().with_extension(".html"))
        .unwrap();
    assert_eq!(output.converter, "HtmlConverter");
    assert_eq!(output.title.as_deref(), Some("Trail guide"));
    assert!(output.markdown.contains("Trails"));
    assert!(output.markdown.contains("**north**"));
    assert_markdown_quality(&output.markdown, "html");
}

#[test]
fn test_wikipedia_url_hint_selects_specific_converter() {
    let html = br#"<html><body>
        <div id="p-navigation">Main page Contents</div>
        <h1><span class="mw-page-title-main">Basalt</span></h1>
        <div id="mw-content-text"><p>Basalt is an igneous rock.</p></div>
        </body></html>"#;
    let hints = StreamInfo::new()
        .with_mimetype("text/html")
        .with_url("https://en.wikipedia.org/wiki/Basalt");
    let output = hub().convert_bytes(html, &hints).unwrap();
    assert_eq!(output.converter, "WikipediaConverter");
    assert!(output.markdown.starts_with("# Basalt\n\n"));
    assert!(!output.markdown.contains("Main page"));
}

#[test]
fn test_charset_hint_decodes_legacy_text() {
    let output = hub()
        .convert_bytes(
            b"caf\xe9 cr\xe8me",
            &StreamInfo::new()
                .with_extension(".txt")
                .with_charset("windows-1252"),
        )
        .unwrap();
    assert_eq!(output.markdown, "café crème\n");
}

#[test]
fn test_formatless_text_is_sampled() {
    let output = hub()
        .convert_bytes(b"no name, no signature, just prose", &StreamInfo::new())
        .unwrap();
    assert_eq!(output.converter, "PlainTextConverter");
    assert_eq!(output.guesses, vec![StreamInfo::new()]);
}

#[test]
fn test_stream_position_preserved_across_conversion() {
    let bytes = docx_bytes(&[(None, "body text")]);
    let mut stream = Cursor::new(bytes);
    stream.seek(SeekFrom::Start(0)).unwrap();
    hub().convert_stream(&mut stream, &StreamInfo::new()).unwrap();
    assert_eq!(stream.position(), 0);

    // A failed conversion rewinds too.
    let mut png = Cursor::new(b"xx\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec());
    png.seek(SeekFrom::Start(2)).unwrap();
    assert!(hub().convert_stream(&mut png, &StreamInfo::new()).is_err());
    assert_eq!(png.position(), 2);
}

// ── Dispatch errors ──────────────────────────────────────────────────────────

#[test]
fn test_unsupported_format_lists_guesses() {
    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";
    let err = hub().convert_bytes(png, &StreamInfo::new()).unwrap_err();
    match err {
        Doc2MdError::UnsupportedFormat { guesses } => {
            assert!(guesses
                .iter()
                .any(|g| g.mimetype.as_deref() == Some("image/png")));
        }
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[test]
fn test_missing_dependency_names_the_feature() {
    let mut registry = ConverterRegistry::new();
    registry.register(PlainTextConverter, PRIORITY_GENERIC_FILE_FORMAT);
    registry.register_missing(
        MissingCapability::new("PdfConverter", "pdf", &[".pdf"], &["application/pdf"]),
        PRIORITY_SPECIFIC_FILE_FORMAT,
    );
    let hub = DocumentConverterHub::with_registry(ConversionConfig::default(), registry);

    let err = hub.convert_bytes(PDF_BYTES, &StreamInfo::new()).unwrap_err();
    match err {
        Doc2MdError::MissingDependency {
            converter, feature, ..
        } => {
            assert_eq!(converter, "PdfConverter");
            assert_eq!(feature, "pdf");
        }
        other => panic!("expected MissingDependency, got {other:?}"),
    }
}

#[cfg(not(feature = "pdf"))]
#[test]
fn test_builtin_registry_reports_disabled_pdf_feature() {
    let err = hub().convert_bytes(PDF_BYTES, &StreamInfo::new()).unwrap_err();
    assert!(
        matches!(err, Doc2MdError::MissingDependency { ref feature, .. } if feature == "pdf"),
        "got {err:?}"
    );
    let entries = hub().registry().describe();
    assert!(entries.iter().any(|e| e.name == "PdfConverter" && !e.available));
}

#[test]
fn test_conversion_failed_collects_attempts() {
    let err = hub()
        .convert_bytes(
            b"this is not a zip archive",
            &StreamInfo::new().with_filename("broken.docx"),
        )
        .unwrap_err();
    match err {
        Doc2MdError::ConversionFailed { attempts } => {
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].converter, "DocxConverter");
            assert!(attempts[0].error.contains("ZIP"), "{}", attempts[0].error);
        }
        other => panic!("expected ConversionFailed, got {other:?}"),
    }
}

struct AlwaysFails;

impl DocumentConverter for AlwaysFails {
    fn name(&self) -> &str {
        "AlwaysFails"
    }

    fn accepts(&self, _: &mut dyn ReadSeek, info: &StreamInfo, _: &ConvertOptions) -> bool {
        info.extension_lower() == ".txt"
    }

    fn convert(
        &self,
        _: &mut dyn ReadSeek,
        _: &StreamInfo,
        _: &ConvertOptions,
    ) -> ConversionOutcome {
        ConversionOutcome::Failed(ConvertError::Parse("refusing on purpose".into()))
    }
}

#[test]
fn test_failed_attempt_before_success_is_reported() {
    let mut hub = hub();
    hub.registry_mut()
        .register(AlwaysFails, PRIORITY_SPECIFIC_FILE_FORMAT);
    let output = hub
        .convert_bytes(b"fine text", &StreamInfo::new().with_extension(".txt"))
        .unwrap();

    assert_eq!(output.converter, "PlainTextConverter");
    assert_eq!(output.stats.attempts, 2);
    assert_eq!(output.stats.failed_attempts.len(), 1);
    assert_eq!(output.stats.failed_attempts[0].converter, "AlwaysFails");
}

// ── Converter input ──────────────────────────────────────────────────────────

#[test]
fn test_unknown_options_do_not_change_output() {
    let plain = hub();
    let noisy = DocumentConverterHub::new(
        ConversionConfig::builder()
            .option("bogus", "1")
            .option("style_mapp", "Title => h3")
            .build()
            .unwrap(),
    );

    let html = b"<html><head><title>Menu</title></head><body><h2>Soup</h2><p>Leek</p></body></html>";
    let inputs: Vec<(Vec<u8>, StreamInfo)> = vec![
        (html.to_vec(), StreamInfo::new().with_extension(".html")),
        (
            docx_bytes(&[(Some("Title"), "Minutes"), (None, "Quorum reached.")]),
            StreamInfo::new(),
        ),
        (xlsx_bytes(), StreamInfo::new().with_extension(".xlsx")),
        (b"plain words\n".to_vec(), StreamInfo::new()),
    ];

    for (bytes, hints) in inputs {
        let expected = plain.convert_bytes(&bytes, &hints).unwrap();
        let actual = noisy.convert_bytes(&bytes, &hints).unwrap();
        assert_eq!(actual.converter, expected.converter);
        assert_eq!(actual.markdown, expected.markdown, "[{}]", expected.converter);
        assert_eq!(actual.title, expected.title, "[{}]", expected.converter);
    }
}

#[test]
fn test_converter_input_kinds() {
    let err = ConverterInput::new("socket", None, None).unwrap_err();
    assert!(matches!(err, Doc2MdError::InvalidInputKind { ref kind } if kind == "socket"));

    let err = ConverterInput::new("object", Some(PathBuf::from("a.txt")), None).unwrap_err();
    assert!(matches!(err, Doc2MdError::MissingInputSource { .. }));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.md");
    std::fs::write(&path, "# Memo\nBring boots.").unwrap();

    let mut input = ConverterInput::new("filepath", Some(path), None).unwrap();
    let output = hub().convert_input(&mut input, &StreamInfo::new()).unwrap();
    assert_eq!(output.markdown, "# Memo\n\nBring boots.\n");

    let object: Box<dyn ReadSeek + Send> = Box::new(Cursor::new(docx_bytes(&[(None, "boxed")])));
    let mut input = ConverterInput::new("object", None, Some(object)).unwrap();
    let output = hub().convert_input(&mut input, &StreamInfo::new()).unwrap();
    assert_eq!(output.markdown, "boxed\n");
}

// ── Files, batches, inspection ───────────────────────────────────────────────

#[test]
fn test_convert_to_file_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sheet.xlsx");
    std::fs::write(&input, xlsx_bytes()).unwrap();
    let output_path = dir.path().join("nested").join("sheet.md");

    let output = convert_to_file(&input, &output_path, &ConversionConfig::default()).unwrap();
    assert_eq!(std::fs::read_to_string(&output_path).unwrap(), output.markdown);

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["converter"], "XlsxConverter");
    assert_eq!(json["stream_info"]["extension"], ".xlsx");
    assert!(json["stats"]["duration_ms"].is_u64());
}

#[test]
fn test_batch_mixed_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let docx = dir.path().join("a.docx");
    let text = dir.path().join("b.txt");
    let image = dir.path().join("c.png");
    std::fs::write(&docx, docx_bytes(&[(None, "alpha")])).unwrap();
    std::fs::write(&text, "beta").unwrap();
    std::fs::write(&image, b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap();

    let config = ConversionConfig::builder().concurrency(3).build().unwrap();
    let items = convert_batch(&[docx, text, image], &config).unwrap();

    let converters: Vec<Option<&str>> = items
        .iter()
        .map(|i| i.result.as_ref().ok().map(|o| o.converter.as_str()))
        .collect();
    assert_eq!(
        converters,
        vec![Some("DocxConverter"), Some("PlainTextConverter"), None]
    );
}

#[test]
fn test_misleading_zip_name_still_dispatches_to_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.zip");
    std::fs::write(&path, xlsx_bytes()).unwrap();

    let guesses = inspect(&path, &ConversionConfig::default()).unwrap();
    assert_eq!(guesses[0].extension.as_deref(), Some(".zip"));
    assert!(guesses
        .iter()
        .any(|g| g.extension.as_deref() == Some(".xlsx")));

    // Dispatch skips the generic ZIP guess and lands on the workbook.
    let output = convert(&path, &ConversionConfig::default()).unwrap();
    assert_eq!(output.converter, "XlsxConverter");
}

#[test]
fn test_inspect_missing_file() {
    let err = inspect("/no/such/file.docx", &ConversionConfig::default()).unwrap_err();
    assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
}
