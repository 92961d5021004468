//! Legacy Excel (`.xls`, BIFF in an OLE2 compound file) via `calamine`.
//!
//! Output matches [`super::xlsx`]: one `## Sheet` section and table per
//! non-empty worksheet.

use super::table::render_table;
use super::{
    read_all, ConversionOutcome, DocumentConverter, DocumentConverterResult, FormatMatcher,
};
use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::pipeline::input::ReadSeek;
use crate::stream_info::StreamInfo;
use calamine::{open_workbook_from_rs, Reader, Xls};
use std::io::Cursor;
use tracing::debug;

pub(crate) const XLS_FORMATS: FormatMatcher =
    FormatMatcher::new(&[".xls"], &["application/vnd.ms-excel", "application/excel"]);

const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Default)]
pub struct XlsConverter;

impl DocumentConverter for XlsConverter {
    fn name(&self) -> &str {
        "XlsConverter"
    }

    fn accepts(
        &self,
        _stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> bool {
        XLS_FORMATS.matches(stream_info)
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
        if !bytes.starts_with(OLE2_MAGIC) {
            debug!("No OLE2 header; not an .xls workbook");
            return ConversionOutcome::NotApplicable;
        }
        convert_workbook(bytes).into()
    }
}

fn convert_workbook(bytes: Vec<u8>) -> Result<DocumentConverterResult, ConvertError> {
    let mut workbook: Xls<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| ConvertError::Parse(format!("Failed to parse XLS: {e}")))?;

    let mut sections = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ConvertError::Parse(format!("Failed to read sheet '{name}': {e}")))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>())
            .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
            .collect();
        if rows.is_empty() {
            debug!("Skipping empty sheet '{name}'");
            continue;
        }
        sections.push(format!("## {name}\n\n{}", render_table(&rows)));
    }

    Ok(DocumentConverterResult::new(sections.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(bytes: &[u8]) -> ConversionOutcome {
        XlsConverter.convert(
            &mut Cursor::new(bytes.to_vec()),
            &StreamInfo::new().with_extension(".xls"),
            &ConvertOptions::default(),
        )
    }

    #[test]
    fn accepts_xls_guesses() {
        let mut s = Cursor::new(Vec::new());
        let opts = ConvertOptions::default();
        assert!(XlsConverter.accepts(&mut s, &StreamInfo::new().with_extension(".XLS"), &opts));
        assert!(XlsConverter.accepts(
            &mut s,
            &StreamInfo::new().with_mimetype("application/vnd.ms-excel"),
            &opts
        ));
        assert!(!XlsConverter.accepts(&mut s, &StreamInfo::new().with_extension(".xlsx"), &opts));
    }

    #[test]
    fn non_ole_content_is_not_applicable() {
        assert!(matches!(
            convert(b"name,qty\nbolt,4\n"),
            ConversionOutcome::NotApplicable
        ));
    }

    #[test]
    fn truncated_compound_file_fails() {
        let mut bytes = OLE2_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 24]);
        assert!(matches!(
            convert(&bytes),
            ConversionOutcome::Failed(ConvertError::Parse(_))
        ));
    }
}
