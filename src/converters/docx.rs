//! Word (`.docx`) documents.
//!
//! The package is opened with `zip` and `word/document.xml` is walked with
//! `quick-xml` as an event stream. Paragraph styles decide the Markdown
//! block kind:
//!
//! | Word                                | Markdown          |
//! |-------------------------------------|-------------------|
//! | `Title`, `Heading 1` … `Heading 6`  | `#` … `######`    |
//! | numbered / bulleted paragraph       | `1. ` / `- `      |
//! | `Quote`, `Intense Quote`            | `> `              |
//! | `w:tbl`                             | GFM table         |
//!
//! Bold and italic runs become `**…**` / `*…*`; external hyperlinks become
//! `[text](target)`. The `style_map` option overrides the style table, one
//! rule per line:
//!
//! ```text
//! Warning => quote
//! p[style-name='Section Title'] => h2:fresh
//! p.CodeBlock => p
//! ```

use super::table::render_table;
use super::{
    read_all, ConversionOutcome, DocumentConverter, DocumentConverterResult, FormatMatcher,
};
use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::pipeline::input::ReadSeek;
use crate::pipeline::zip_probe::DOCX_MIMETYPE;
use crate::stream_info::StreamInfo;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};
use zip::ZipArchive;

const DOCX_FORMATS: FormatMatcher = FormatMatcher::new(&[".docx"], &[DOCX_MIMETYPE]);

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const NUMBERING_PART: &str = "word/numbering.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";
const CORE_PART: &str = "docProps/core.xml";

/// Converts Office Open XML word-processing documents.
#[derive(Debug, Default)]
pub struct DocxConverter;

impl DocumentConverter for DocxConverter {
    fn name(&self) -> &str {
        "DocxConverter"
    }

    fn accepts(
        &self,
        _stream: &mut dyn ReadSeek,
        stream_info: &StreamInfo,
        _options: &ConvertOptions,
    ) -> bool {
        DOCX_FORMATS.matches(stream_info)
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        _stream_info: &StreamInfo,
        options: &ConvertOptions,
    ) -> ConversionOutcome {
        let bytes = match read_all(stream) {
            Ok(b) => b,
            Err(e) => return ConversionOutcome::Failed(e.into()),
        };
        let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(a) => a,
            Err(e) => {
                return ConversionOutcome::Failed(ConvertError::Parse(format!(
                    "not a ZIP package: {e}"
                )))
            }
        };
        if archive.by_name(DOCUMENT_PART).is_err() {
            debug!("ZIP has no {DOCUMENT_PART}; not a Word document");
            return ConversionOutcome::NotApplicable;
        }

        let style_map = match options.get("style_map") {
            Some(raw) => StyleMap::parse(raw),
            None => StyleMap::default(),
        };
        convert_package(&mut archive, &style_map).into()
    }
}

fn convert_package<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    style_map: &StyleMap,
) -> Result<DocumentConverterResult, ConvertError> {
    let document = read_part(archive, DOCUMENT_PART)?
        .ok_or_else(|| ConvertError::Parse(format!("missing {DOCUMENT_PART}")))?;

    let styles = match read_part(archive, STYLES_PART)? {
        Some(xml) => parse_style_names(&xml)?,
        None => HashMap::new(),
    };
    let numbering = match read_part(archive, NUMBERING_PART)? {
        Some(xml) => Numbering::parse(&xml)?,
        None => Numbering::default(),
    };
    let links = match read_part(archive, RELS_PART)? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };
    let title = match read_part(archive, CORE_PART)? {
        Some(xml) => parse_core_title(&xml)?,
        None => None,
    };

    let ctx = DocContext {
        styles: &styles,
        numbering: &numbering,
        links: &links,
        style_map,
    };
    let blocks = walk_document(&document, &ctx)?;
    debug!("DOCX: {} blocks", blocks.len());

    Ok(DocumentConverterResult::new(render_blocks(&blocks)).with_title(title))
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ConvertError> {
    let mut entry = match archive.by_name(name) {
        Ok(e) => e,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ConvertError::Parse(format!("{name}: {e}"))),
    };
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ConvertError::Decode(format!("{name}: {e}")))?;
    Ok(Some(xml))
}

// ── Style mapping ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Normal,
    Heading(u8),
    ListItem,
    Quote,
}

/// User overrides keyed by normalised style id or style name.
#[derive(Debug, Default)]
struct StyleMap {
    rules: HashMap<String, BlockKind>,
}

impl StyleMap {
    /// Parse `style => target` rules. Malformed lines are skipped with a
    /// warning.
    fn parse(raw: &str) -> Self {
        let mut rules = HashMap::new();
        for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some((lhs, rhs)) = line.split_once("=>") else {
                warn!("Ignoring style_map rule without '=>': {line}");
                continue;
            };
            let (Some(style), Some(kind)) = (parse_style_selector(lhs), parse_target(rhs)) else {
                warn!("Ignoring unrecognised style_map rule: {line}");
                continue;
            };
            rules.insert(style, kind);
        }
        Self { rules }
    }

    fn lookup(&self, style_id: &str, style_name: Option<&str>) -> Option<BlockKind> {
        self.rules
            .get(&normalise_style(style_id))
            .or_else(|| style_name.and_then(|n| self.rules.get(&normalise_style(n))))
            .copied()
    }
}

fn normalise_style(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `Foo`, `p.Foo` or `p[style-name='Foo']`.
fn parse_style_selector(lhs: &str) -> Option<String> {
    let lhs = lhs.trim();
    let style = if let Some(rest) = lhs.strip_prefix("p[style-name=") {
        rest.trim_end_matches(']').trim_matches(|c| c == '\'' || c == '"')
    } else {
        lhs.strip_prefix("p.").unwrap_or(lhs)
    };
    (!style.is_empty()).then(|| normalise_style(style))
}

/// `h1`…`h6`, `list`/`li`/`ul > li`, `quote`/`blockquote`, `p`; an optional
/// `:modifier` suffix is ignored.
fn parse_target(rhs: &str) -> Option<BlockKind> {
    let target = rhs.trim();
    let target = target.split(':').next().unwrap_or(target).trim();
    match target {
        "p" => Some(BlockKind::Normal),
        "list" | "li" | "ul > li" | "ol > li" => Some(BlockKind::ListItem),
        "quote" | "blockquote" => Some(BlockKind::Quote),
        h if h.len() == 2 && h.starts_with('h') => match h[1..].parse::<u8>() {
            Ok(n @ 1..=6) => Some(BlockKind::Heading(n)),
            _ => None,
        },
        _ => None,
    }
}

/// Block kind implied by Word's built-in style names.
fn builtin_kind(style_id: &str, style_name: Option<&str>) -> BlockKind {
    let key = normalise_style(style_name.unwrap_or(style_id));
    if key == "title" {
        return BlockKind::Heading(1);
    }
    if let Some(level) = key.strip_prefix("heading") {
        if let Ok(n) = level.parse::<u8>() {
            return BlockKind::Heading(n.clamp(1, 6));
        }
    }
    match key.as_str() {
        "quote" | "intensequote" => BlockKind::Quote,
        "listparagraph" | "listbullet" | "listnumber" => BlockKind::ListItem,
        _ => BlockKind::Normal,
    }
}

// ── Auxiliary parts ─────────────────────────────────────────────────────────

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> ConvertError {
    ConvertError::Parse(format!("{part}: {e}"))
}

/// Text for a general entity reference (`&amp;`, `&#8217;`).
fn resolve_ref(e: &BytesRef<'_>) -> Option<String> {
    if let Ok(Some(ch)) = e.resolve_char_ref() {
        return Some(ch.to_string());
    }
    let name = e.decode().ok()?;
    quick_xml::escape::resolve_predefined_entity(&name).map(str::to_string)
}

/// styleId → display name from `word/styles.xml`.
fn parse_style_names(xml: &str) -> Result<HashMap<String, String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut names = HashMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"style" => current = attr(&e, b"styleId"),
                b"name" => {
                    if let (Some(id), Some(name)) = (current.as_ref(), attr(&e, b"val")) {
                        names.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"style" => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(STYLES_PART, e)),
            _ => {}
        }
    }
    Ok(names)
}

/// numId → abstract definition → per-level number format.
#[derive(Debug, Default)]
struct Numbering {
    num_to_abstract: HashMap<String, String>,
    formats: HashMap<(String, u32), String>,
}

impl Numbering {
    fn parse(xml: &str) -> Result<Self, ConvertError> {
        let mut reader = Reader::from_str(xml);
        let mut numbering = Numbering::default();
        let mut abstract_id: Option<String> = None;
        let mut level: Option<u32> = None;
        let mut num_id: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = attr(&e, b"abstractNumId"),
                    b"lvl" => level = attr(&e, b"ilvl").and_then(|v| v.parse().ok()),
                    b"numFmt" => {
                        if let (Some(a), Some(l), Some(fmt)) =
                            (abstract_id.as_ref(), level, attr(&e, b"val"))
                        {
                            numbering.formats.insert((a.clone(), l), fmt);
                        }
                    }
                    b"num" => num_id = attr(&e, b"numId"),
                    b"abstractNumId" => {
                        if let (Some(n), Some(a)) = (num_id.as_ref(), attr(&e, b"val")) {
                            numbering.num_to_abstract.insert(n.clone(), a);
                        }
                    }
                    _ => {}
                },
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = None,
                    b"lvl" => level = None,
                    b"num" => num_id = None,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(NUMBERING_PART, e)),
                _ => {}
            }
        }
        Ok(numbering)
    }

    /// Ordered (numbered) unless the level's format is a bullet.
    fn is_ordered(&self, num_id: &str, level: u32) -> bool {
        self.num_to_abstract
            .get(num_id)
            .and_then(|a| self.formats.get(&(a.clone(), level)))
            .is_some_and(|fmt| fmt != "bullet" && fmt != "none")
    }
}

/// Relationship id → external target.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut links = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    links.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(RELS_PART, e)),
            _ => {}
        }
    }
    Ok(links)
}

/// `dc:title` from the core properties.
fn parse_core_title(xml: &str) -> Result<Option<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut in_title = false;
    let mut title = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => in_title = e.local_name().as_ref() == b"title",
            Ok(Event::End(_)) => in_title = false,
            Ok(Event::Text(e)) if in_title => {
                let text = e.xml_content().map_err(|e| xml_error(CORE_PART, e))?;
                title.push_str(&text);
            }
            Ok(Event::GeneralRef(e)) if in_title => {
                if let Some(text) = resolve_ref(&e) {
                    title.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(CORE_PART, e)),
            _ => {}
        }
    }
    let title = title.trim();
    Ok((!title.is_empty()).then(|| title.to_string()))
}

// ── Document walk ───────────────────────────────────────────────────────────

struct DocContext<'a> {
    styles: &'a HashMap<String, String>,
    numbering: &'a Numbering,
    links: &'a HashMap<String, String>,
    style_map: &'a StyleMap,
}

#[derive(Debug, PartialEq)]
enum Block {
    Paragraph {
        kind: BlockKind,
        level: u32,
        ordered: bool,
        text: String,
    },
    Table(Vec<Vec<String>>),
}

#[derive(Default)]
struct ParagraphState {
    style_id: Option<String>,
    num_id: Option<String>,
    level: u32,
    text: String,
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    tables: Vec<TableState>,
    paragraph: Option<ParagraphState>,
    in_ppr: bool,
    in_run: bool,
    in_rpr: bool,
    in_text: bool,
    bold: bool,
    italic: bool,
    run_text: String,
    link: Option<(Option<String>, String)>,
}

fn walk_document(xml: &str, ctx: &DocContext<'_>) -> Result<Vec<Block>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut w = Walker::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => w.start(&e, false, ctx),
            Ok(Event::Empty(e)) => w.start(&e, true, ctx),
            Ok(Event::End(e)) => w.end(e.local_name().as_ref(), ctx),
            Ok(Event::Text(e)) if w.in_text => {
                let text = e.xml_content().map_err(|e| xml_error(DOCUMENT_PART, e))?;
                w.run_text.push_str(&text);
            }
            Ok(Event::GeneralRef(e)) if w.in_text => {
                if let Some(text) = resolve_ref(&e) {
                    w.run_text.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(DOCUMENT_PART, e)),
            _ => {}
        }
    }
    Ok(w.blocks)
}

impl Walker {
    fn start(&mut self, e: &BytesStart<'_>, empty: bool, ctx: &DocContext<'_>) {
        match e.local_name().as_ref() {
            b"tbl" => self.tables.push(TableState::default()),
            b"tr" => {
                if let Some(t) = self.tables.last_mut() {
                    t.row.clear();
                }
            }
            b"tc" => {
                if let Some(t) = self.tables.last_mut() {
                    t.cell.clear();
                }
            }
            b"p" => {
                self.paragraph = Some(ParagraphState::default());
                if empty {
                    self.end(b"p", ctx);
                }
            }
            b"pPr" if !empty => self.in_ppr = true,
            b"pStyle" if self.in_ppr => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.style_id = attr(e, b"val");
                }
            }
            b"ilvl" if self.in_ppr => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.level = attr(e, b"val").and_then(|v| v.parse().ok()).unwrap_or(0);
                }
            }
            b"numId" if self.in_ppr => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.num_id = attr(e, b"val").filter(|v| v != "0");
                }
            }
            b"r" if !empty => {
                self.in_run = true;
                self.bold = false;
                self.italic = false;
                self.run_text.clear();
            }
            b"rPr" if self.in_run && !empty => self.in_rpr = true,
            b"b" if self.in_rpr => self.bold = toggle_on(e),
            b"i" if self.in_rpr => self.italic = toggle_on(e),
            b"t" if self.in_run && !empty => self.in_text = true,
            b"tab" if self.in_run => self.run_text.push('\t'),
            b"br" | b"cr" if self.in_run => self.run_text.push('\n'),
            b"hyperlink" if !empty => {
                let target = attr(e, b"id").and_then(|id| ctx.links.get(&id).cloned());
                self.link = Some((target, String::new()));
            }
            _ => {}
        }
    }

    fn end(&mut self, local: &[u8], ctx: &DocContext<'_>) {
        match local {
            b"t" => self.in_text = false,
            b"rPr" => self.in_rpr = false,
            b"pPr" => self.in_ppr = false,
            b"r" => {
                self.in_run = false;
                let text = std::mem::take(&mut self.run_text);
                let styled = style_run(&text, self.bold, self.italic);
                self.push_inline(&styled);
            }
            b"hyperlink" => {
                if let Some((target, text)) = self.link.take() {
                    let inline = match target {
                        Some(url) if !text.trim().is_empty() => format!("[{text}]({url})"),
                        _ => text,
                    };
                    self.push_inline(&inline);
                }
            }
            b"p" => {
                if let Some(p) = self.paragraph.take() {
                    self.finish_paragraph(p, ctx);
                }
            }
            b"tc" => {
                if let Some(t) = self.tables.last_mut() {
                    let cell = std::mem::take(&mut t.cell);
                    t.row.push(cell.trim().to_string());
                }
            }
            b"tr" => {
                if let Some(t) = self.tables.last_mut() {
                    let row = std::mem::take(&mut t.row);
                    t.rows.push(row);
                }
            }
            b"tbl" => {
                if let Some(t) = self.tables.pop() {
                    match self.tables.last_mut() {
                        // Nested table: flatten into the enclosing cell.
                        Some(outer) => {
                            let flat = t
                                .rows
                                .iter()
                                .map(|r| r.join(" "))
                                .collect::<Vec<_>>()
                                .join(" ");
                            append_spaced(&mut outer.cell, &flat);
                        }
                        None => self.blocks.push(Block::Table(t.rows)),
                    }
                }
            }
            _ => {}
        }
    }

    fn push_inline(&mut self, text: &str) {
        if let Some((_, link_text)) = self.link.as_mut() {
            link_text.push_str(text);
        } else if let Some(p) = self.paragraph.as_mut() {
            p.text.push_str(text);
        }
    }

    fn finish_paragraph(&mut self, p: ParagraphState, ctx: &DocContext<'_>) {
        let text = p.text.trim().to_string();
        if let Some(table) = self.tables.last_mut() {
            append_spaced(&mut table.cell, &text);
            return;
        }
        if text.is_empty() {
            return;
        }

        let style_id = p.style_id.as_deref().unwrap_or("Normal");
        let style_name = ctx.styles.get(style_id).map(String::as_str);
        let mut kind = ctx
            .style_map
            .lookup(style_id, style_name)
            .unwrap_or_else(|| builtin_kind(style_id, style_name));

        let ordered = match p.num_id.as_deref() {
            Some(num_id) if kind == BlockKind::Normal || kind == BlockKind::ListItem => {
                kind = BlockKind::ListItem;
                ctx.numbering.is_ordered(num_id, p.level)
            }
            _ => false,
        };

        self.blocks.push(Block::Paragraph {
            kind,
            level: p.level,
            ordered,
            text,
        });
    }
}

/// `<w:b/>` is on; `<w:b w:val="0"/>` / `"false"` is off.
fn toggle_on(e: &BytesStart<'_>) -> bool {
    !matches!(attr(e, b"val").as_deref(), Some("0") | Some("false") | Some("off"))
}

fn style_run(text: &str, bold: bool, italic: bool) -> String {
    if text.trim().is_empty() || !(bold || italic) {
        return text.to_string();
    }
    let marker = match (bold, italic) {
        (true, true) => "***",
        (true, false) => "**",
        _ => "*",
    };
    // Markers must hug the text, so surrounding spaces stay outside.
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];
    format!("{lead}{marker}{}{marker}{trail}", text.trim())
}

fn append_spaced(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

// ── Rendering ───────────────────────────────────────────────────────────────

fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut prev_list = false;

    for block in blocks {
        let (rendered, is_list) = match block {
            Block::Paragraph {
                kind,
                level,
                ordered,
                text,
            } => match kind {
                BlockKind::Heading(n) => (format!("{} {text}", "#".repeat(*n as usize)), false),
                BlockKind::Quote => (format!("> {}", text.replace('\n', "\n> ")), false),
                BlockKind::ListItem => {
                    let indent = "  ".repeat(*level as usize);
                    let bullet = if *ordered { "1." } else { "-" };
                    (format!("{indent}{bullet} {text}"), true)
                }
                BlockKind::Normal => (text.clone(), false),
            },
            Block::Table(rows) => (render_table(rows).trim_end().to_string(), false),
        };
        if rendered.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str(if prev_list && is_list { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        prev_list = is_list;
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}
