//! HTML → Markdown via `html5ever` and `html2md`.
//!
//! The document is decoded with the best charset evidence available (stream
//! info, then `<meta charset>`, then BOM / UTF-8 / windows-1252) and parsed
//! into an [`RcDom`]. `<script>`, `<style>` and comments are pruned from the
//! tree, the title comes from `head > title`, and only the children of
//! `<body>` are serialised for `html2md`, so head metadata does not leak
//! into the text.

use super::{
    read_all, ConversionOutcome, DocumentConverter, DocumentConverterResult, FormatMatcher,
};
use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::pipeline::charset::{decode_text, extract_charset_from_html};
use crate::pipeline::input::ReadSeek;
use crate::stream_info::StreamInfo;
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use tracing::debug;

pub(crate) const HTML_FORMATS: FormatMatcher = FormatMatcher::new(
    &[".html", ".htm", ".xhtml"],
    &["text/html", "application/xhtml"],
);

/// Generic HTML converter.
#[derive(Debug, Default)]
pub struct HtmlConverter;

impl DocumentConverter for HtmlConverter {
    fn name(&self) -> &str {
        "HtmlConverter"
    }

    fn accepts(
        &self,
        _stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> bool {
        HTML_FORMATS.matches(stream_info)
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
        let body = body_of(&dom).unwrap_or_else(|| dom.document.clone());
        let markdown = match children_to_markdown(&body) {
            Ok(md) => md,
            Err(e) => return ConversionOutcome::Failed(e),
        };
        ConversionOutcome::Converted(
            DocumentConverterResult::new(markdown).with_title(document_title(&dom)),
        )
    }
}

/// Read the rest of the stream, decode it and parse it into a DOM with
/// non-content nodes already pruned.
pub(crate) fn read_dom(stream: &mut dyn ReadSeek, stream_info: &StreamInfo) -> std::io::Result<RcDom> {
    let bytes = read_all(stream)?;
    let declared = stream_info
        .charset
        .clone()
        .or_else(|| extract_charset_from_html(&bytes));
    let (text, encoding) = decode_text(&bytes, declared.as_deref());
    debug!("HTML decoded as {}", encoding.name());

    let dom = parse_document(RcDom::default(), Default::default()).one(text);
    prune_non_content(&dom.document);
    Ok(dom)
}

/// Drop `<script>`, `<style>`, `<noscript>` and comments, recursively.
fn prune_non_content(node: &Handle) {
    node.children.borrow_mut().retain(|child| match child.data {
        NodeData::Comment { .. } => false,
        NodeData::Element { ref name, .. } => {
            !matches!(name.local.as_ref(), "script" | "style" | "noscript")
        }
        _ => true,
    });
    for child in node.children.borrow().iter() {
        prune_non_content(child);
    }
}

fn element_name(node: &Handle) -> Option<&str> {
    match node.data {
        NodeData::Element { ref name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

fn attribute(node: &Handle, attr_name: &str) -> Option<String> {
    match node.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// First direct child element named `name`.
fn child_element(node: &Handle, name: &str) -> Option<Handle> {
    node.children
        .borrow()
        .iter()
        .find(|child| element_name(child) == Some(name))
        .cloned()
}

/// Depth-first search for the first element matching `predicate`.
pub(crate) fn find_element(node: &Handle, predicate: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    if element_name(node).is_some() && predicate(node) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, predicate))
}

pub(crate) fn has_id(node: &Handle, id: &str) -> bool {
    attribute(node, "id").as_deref() == Some(id)
}

pub(crate) fn has_class(node: &Handle, class: &str) -> bool {
    attribute(node, "class").is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

fn root_element(dom: &RcDom) -> Option<Handle> {
    child_element(&dom.document, "html")
}

/// The `<body>` element. The HTML5 tree builder always creates one.
pub(crate) fn body_of(dom: &RcDom) -> Option<Handle> {
    root_element(dom).and_then(|html| child_element(&html, "body"))
}

/// Text of `head > title`, whitespace-collapsed. A `<title>` elsewhere
/// (inline SVG, for one) does not count.
pub(crate) fn document_title(dom: &RcDom) -> Option<String> {
    root_element(dom)
        .and_then(|html| child_element(&html, "head"))
        .and_then(|head| child_element(&head, "title"))
        .map(|title| inner_text(&title))
        .filter(|t| !t.is_empty())
}

/// Plain text of a subtree with whitespace collapsed.
pub(crate) fn inner_text(node: &Handle) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(node: &Handle, output: &mut String) {
    match node.data {
        NodeData::Text { ref contents } => output.push_str(&contents.borrow()),
        NodeData::Element { .. } | NodeData::Document => {
            for child in node.children.borrow().iter() {
                collect_text(child, output);
            }
        }
        _ => {}
    }
}

/// Serialise the children of `node` back to HTML and render them with
/// `html2md`.
pub(crate) fn children_to_markdown(node: &Handle) -> Result<String, ConvertError> {
    let mut html = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };
    serialize(&mut html, &SerializableHandle::from(node.clone()), opts)?;
    let html = String::from_utf8_lossy(&html);
    Ok(html2md::parse_html(&html).trim().to_string())
}
