//! Excel (`.xlsx`) workbooks: one section and table per sheet.

use super::table::render_table;
use super::{
    read_all, ConversionOutcome, DocumentConverter, DocumentConverterResult, FormatMatcher,
};
use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::pipeline::input::ReadSeek;
use crate::pipeline::zip_probe::XLSX_MIMETYPE;
use crate::stream_info::StreamInfo;
use std::io::Cursor;
use tracing::debug;
use zip::ZipArchive;

const XLSX_FORMATS: FormatMatcher = FormatMatcher::new(&[".xlsx"], &[XLSX_MIMETYPE]);

/// Renders every non-empty worksheet as
///
/// ```text
/// ## Sheet name
///
/// | header | row |
/// | --- | --- |
/// | … | … |
/// ```
///
/// Cell values are the stored values as text (formulas are not evaluated).
/// Rows with no values at all are skipped.
#[derive(Debug, Default)]
pub struct XlsxConverter;

impl DocumentConverter for XlsxConverter {
    fn name(&self) -> &str {
        "XlsxConverter"
    }

    fn accepts(
        &self,
        _stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> bool {
        XLSX_FORMATS.matches(stream_info)
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

        match ZipArchive::new(Cursor::new(bytes.as_slice())) {
            Ok(mut archive) => {
                if archive.by_name("xl/workbook.xml").is_err() {
                    debug!("ZIP has no xl/workbook.xml; not a workbook");
                    return ConversionOutcome::NotApplicable;
                }
            }
            Err(e) => {
                return ConversionOutcome::Failed(ConvertError::Parse(format!(
                    "not a ZIP package: {e}"
                )))
            }
        }

        convert_workbook(bytes).into()
    }
}

fn convert_workbook(bytes: Vec<u8>) -> Result<DocumentConverterResult, ConvertError> {
    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
        .map_err(|e| ConvertError::Parse(format!("Failed to parse XLSX: {e}")))?;

    let mut sections = Vec::new();
    for sheet in book.get_sheet_collection() {
        let (max_col, max_row) = sheet.get_highest_column_and_row();
        if max_col == 0 || max_row == 0 {
            debug!("Skipping empty sheet '{}'", sheet.get_name());
            continue;
        }

        let rows: Vec<Vec<String>> = (1..=max_row)
            .map(|row| {
                // (column, row), both 1-indexed
                (1..=max_col)
                    .map(|col| {
                        sheet
                            .get_cell((col, row))
                            .map(|cell| cell.get_value().to_string())
                            .unwrap_or_default()
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
            .collect();

        if rows.is_empty() {
            continue;
        }
        sections.push(format!("## {}\n\n{}", sheet.get_name(), render_table(&rows)));
    }

    Ok(DocumentConverterResult::new(sections.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_xlsx(sheets: &[(&str, &[(&str, &str)])]) -> Vec<u8> {
        let mut book = umya_spreadsheet::new_file();
        for (i, &(name, cells)) in sheets.iter().enumerate() {
            if i == 0 {
                let sheet = book.get_sheet_mut(&0).unwrap();
                sheet.set_name(name);
                for &(coord, value) in cells {
                    sheet.get_cell_mut(coord).set_value(value);
                }
            } else {
                let mut sheet = umya_spreadsheet::Worksheet::default();
                sheet.set_name(name);
                for &(coord, value) in cells {
                    sheet.get_cell_mut(coord).set_value(value);
                }
                book.add_sheet(sheet).unwrap();
            }
        }
        let mut cursor = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&book, &mut cursor).unwrap();
        cursor.into_inner()
    }

    fn convert(bytes: Vec<u8>) -> ConversionOutcome {
        XlsxConverter.convert(
            &mut Cursor::new(bytes),
            &StreamInfo::new().with_extension(".xlsx"),
            &ConvertOptions::default(),
        )
    }

    #[test]
    fn accepts_xlsx_guesses() {
        let mut s = Cursor::new(Vec::new());
        let opts = ConvertOptions::default();
        assert!(XlsxConverter.accepts(&mut s, &StreamInfo::new().with_extension(".xlsx"), &opts));
        assert!(XlsxConverter.accepts(&mut s, &StreamInfo::new().with_mimetype(XLSX_MIMETYPE), &opts));
        assert!(!XlsxConverter.accepts(&mut s, &StreamInfo::new().with_extension(".csv"), &opts));
    }

    #[test]
    fn one_section_per_sheet() {
        let bytes = build_xlsx(&[
            ("Inventory", &[("A1", "Item"), ("B1", "Count"), ("A2", "bolts"), ("B2", "40")]),
            ("Notes", &[("A1", "Remark"), ("A3", "restock in May")]),
        ]);
        let ConversionOutcome::Converted(result) = convert(bytes) else {
            panic!("expected conversion");
        };
        assert_eq!(
            result.markdown,
            "## Inventory\n\n| Item | Count |\n| --- | --- |\n| bolts | 40 |\n\n\
             ## Notes\n\n| Remark |\n| --- |\n| restock in May |\n"
        );
    }

    #[test]
    fn empty_workbook_converts_to_nothing() {
        let ConversionOutcome::Converted(result) = convert(build_xlsx(&[("Empty", &[])])) else {
            panic!("expected conversion");
        };
        assert_eq!(result.markdown, "");
    }

    #[test]
    fn zip_without_workbook_is_not_applicable() {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"<w:document/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(matches!(convert(bytes), ConversionOutcome::NotApplicable));
    }

    #[test]
    fn non_zip_fails() {
        assert!(matches!(
            convert(b"col1,col2\n".to_vec()),
            ConversionOutcome::Failed(ConvertError::Parse(_))
        ));
    }
}
