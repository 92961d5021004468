//! Wikipedia articles: main content only, titled with the page heading.

use super::html::{
    body_of, children_to_markdown, document_title, find_element, has_class, has_id, inner_text,
    read_dom, HTML_FORMATS,
};
use super::{ConversionOutcome, DocumentConverter, DocumentConverterResult};
use crate::config::ConvertOptions;
use crate::pipeline::input::ReadSeek;
use crate::stream_info::StreamInfo;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_WIKIPEDIA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[a-zA-Z]{2,3}\.wikipedia\.org/").unwrap());

/// HTML served from `*.wikipedia.org`.
///
/// The URL comes from [`StreamInfo::url`] or, failing that, the `url`
/// option.
#[derive(Debug, Default)]
pub struct WikipediaConverter;

impl DocumentConverter for WikipediaConverter {
    fn name(&self) -> &str {
        "WikipediaConverter"
    }

    fn accepts(
        &self,
        _stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        options: &ConvertOptions,
    ) -> bool {
        let url = stream_info.url.as_deref().or_else(|| options.get("url"));
        HTML_FORMATS.matches(stream_info) && url.is_some_and(|u| RE_WIKIPEDIA_URL.is_match(u))
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> ConversionOutcome {
        let dom = match read_dom(stream, stream_info) {
            Ok(dom) => dom,
            Err(e) => return ConversionOutcome::Failed(e.into()),
        };

        let page_title = find_element(&dom.document, &|n| has_class(n, "mw-page-title-main"))
            .map(|span| inner_text(&span))
            .filter(|t| !t.is_empty());

        let rendered = match find_element(&dom.document, &|n| has_id(n, "mw-content-text")) {
            Some(content) => children_to_markdown(&content).map(|body| {
                match page_title.as_deref() {
                    Some(title) => format!("# {title}\n\n{body}"),
                    None => body,
                }
            }),
            None => {
                debug!("No mw-content-text element; rendering the whole page");
                let body = body_of(&dom).unwrap_or_else(|| dom.document.clone());
                children_to_markdown(&body)
            }
        };
        let markdown = match rendered {
            Ok(md) => md,
            Err(e) => return ConversionOutcome::Failed(e),
        };

        let title = page_title.or_else(|| document_title(&dom));
        ConversionOutcome::Converted(DocumentConverterResult::new(markdown).with_title(title))
    }
}
