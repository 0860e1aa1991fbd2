//! Reader for the OOXML presentation package.
//!
//! A `.pptx` file is a zip archive of XML parts. Slide order comes from the `p:sldIdLst` of
//! `ppt/presentation.xml` resolved through its relationships part; each slide part is parsed
//! into [`Shape`]s in document order, and speaker notes are found through the slide's own
//! relationships.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const REL_TYPE_SLIDE: &str = "/slide";
const REL_TYPE_NOTES: &str = "/notesSlide";
const REL_TYPE_IMAGE: &str = "/image";

/// Errors raised while reading a presentation package.
#[derive(Debug, Error)]
pub enum PptxError {
    /// The file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path that failed.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The zip container is corrupt or a part could not be read.
    #[error("invalid presentation archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// A required part is missing from the package.
    #[error("missing package part {0}")]
    MissingPart(String),
    /// A part is not well-formed XML.
    #[error("malformed XML in {part}: {source}")]
    Xml {
        /// Part being parsed.
        part: String,
        /// Parser failure.
        source: quick_xml::Error,
    },
    /// A part could not be decoded as UTF-8 text.
    #[error("failed to read package part: {0}")]
    Io(#[from] std::io::Error),
    /// Slide index outside the presentation.
    #[error("slide {0} does not exist")]
    NoSuchSlide(usize),
}

/// Errors confined to one shape of a slide.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    /// An attribute carried a value that could not be interpreted.
    #[error("shape {shape}: invalid {attribute} value {value:?}")]
    InvalidAttribute {
        /// Shape name.
        shape: String,
        /// Attribute name.
        attribute: &'static str,
        /// Raw attribute value.
        value: String,
    },
    /// A table frame without any rows.
    #[error("shape {shape}: table has no rows")]
    EmptyTable {
        /// Shape name.
        shape: String,
    },
}

/// One text paragraph with its indentation level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    /// Indentation level, 0 for top-level paragraphs.
    pub level: u32,
    /// Concatenated run text.
    pub text: String,
}

/// Shape placement in EMU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeGeometry {
    /// Left offset.
    pub x: i64,
    /// Top offset.
    pub y: i64,
    /// Width.
    pub cx: i64,
    /// Height.
    pub cy: i64,
}

/// Content carried by a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeKind {
    /// Text box or placeholder with paragraphs.
    TextFrame {
        /// Paragraphs in document order.
        paragraphs: Vec<Paragraph>,
    },
    /// Table graphic frame.
    Table {
        /// Cell grid, row 0 is the header.
        rows: Vec<Vec<String>>,
    },
    /// Picture with its resolved media part.
    Picture {
        /// Package path of the embedded image.
        image_part: Option<String>,
    },
    /// Anything without extractable content.
    Other,
}

impl ShapeKind {
    /// Label stored as `shape_type` on chunks.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TextFrame { .. } => "text_frame",
            Self::Table { .. } => "table",
            Self::Picture { .. } => "picture",
            Self::Other => "other",
        }
    }
}

/// A parsed slide shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    /// `cNvPr` name.
    pub name: String,
    /// Placeholder type, `obj` when the placeholder does not declare one.
    pub placeholder: Option<String>,
    /// Placement on the slide.
    pub geometry: ShapeGeometry,
    /// Content.
    pub kind: ShapeKind,
}

impl Shape {
    /// Whether this is the slide's title placeholder.
    pub fn is_title_placeholder(&self) -> bool {
        matches!(self.placeholder.as_deref(), Some("title" | "ctrTitle"))
    }

    /// Non-blank paragraph text joined by newlines, for text frames.
    pub fn text(&self) -> Option<String> {
        match &self.kind {
            ShapeKind::TextFrame { paragraphs } => {
                let lines: Vec<&str> = paragraphs
                    .iter()
                    .map(|paragraph| paragraph.text.trim())
                    .filter(|text| !text.is_empty())
                    .collect();
                (!lines.is_empty()).then(|| lines.join("\n"))
            }
            _ => None,
        }
    }
}

/// A slide and the shapes parsed from it.
#[derive(Debug, Clone)]
pub struct SlideData {
    /// 1-based slide number.
    pub number: usize,
    /// Package path of the slide part.
    pub part_name: String,
    /// Shapes in document order; malformed shapes carry their error.
    pub shapes: Vec<Result<Shape, ShapeError>>,
    /// Package path of the notes part, when the slide has notes.
    pub notes_part: Option<String>,
}

impl SlideData {
    /// Shapes that parsed successfully.
    pub fn valid_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter().filter_map(|shape| shape.as_ref().ok())
    }

    /// Text of the title placeholder, if present and non-empty.
    pub fn title(&self) -> Option<String> {
        self.valid_shapes()
            .filter(|shape| shape.is_title_placeholder())
            .find_map(|shape| shape.text())
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|text| !text.is_empty())
    }

    /// Title, body text and table text of the slide, notes excluded.
    pub fn summary_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = self.title() {
            parts.push(title);
        }
        for shape in self.valid_shapes() {
            if shape.is_title_placeholder() {
                continue;
            }
            match &shape.kind {
                ShapeKind::TextFrame { .. } => parts.extend(shape.text()),
                ShapeKind::Table { rows } => {
                    let text = crate::chunking::render_table_text(rows);
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
                ShapeKind::Picture { .. } | ShapeKind::Other => {}
            }
        }
        parts.join("\n")
    }
}

/// Open presentation package.
pub struct PptxPackage {
    archive: zip::ZipArchive<File>,
    slide_parts: Vec<String>,
}

impl PptxPackage {
    /// Open the package and resolve the slide order.
    pub fn open(path: &Path) -> Result<Self, PptxError> {
        let file = File::open(path).map_err(|source| PptxError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let mut archive = zip::ZipArchive::new(file)?;
        let slide_parts = resolve_slide_order(&mut archive)?;
        tracing::debug!(
            path = %path.display(),
            slides = slide_parts.len(),
            "Opened presentation package"
        );
        Ok(Self {
            archive,
            slide_parts,
        })
    }

    /// Number of slides in presentation order.
    pub fn slide_count(&self) -> usize {
        self.slide_parts.len()
    }

    /// Slide size in EMU from `p:sldSz`, defaulting to 4:3 (9144000 × 6858000).
    pub fn slide_size(&mut self) -> Result<(i64, i64), PptxError> {
        let xml = self.read_part(PRESENTATION_PART)?;
        let mut reader = Reader::from_str(&xml);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"p:sldSz" => {
                    let cx = attribute(&e, b"cx").and_then(|value| value.parse().ok());
                    let cy = attribute(&e, b"cy").and_then(|value| value.parse().ok());
                    if let (Some(cx), Some(cy)) = (cx, cy) {
                        return Ok((cx, cy));
                    }
                }
                Ok(Event::Eof) => break,
                Err(source) => {
                    return Err(PptxError::Xml {
                        part: PRESENTATION_PART.to_string(),
                        source,
                    });
                }
                _ => {}
            }
            buf.clear();
        }
        Ok((9_144_000, 6_858_000))
    }

    /// Parse the slide at `index` (0-based).
    pub fn read_slide(&mut self, index: usize) -> Result<SlideData, PptxError> {
        let part_name = self
            .slide_parts
            .get(index)
            .cloned()
            .ok_or(PptxError::NoSuchSlide(index + 1))?;
        let rels = self.read_relationships(&part_name)?;
        let xml = self.read_part(&part_name)?;
        let shapes = parse_shapes(&xml, &part_name, &rels)?;
        let notes_part = rels
            .values()
            .find(|rel| rel.rel_type.ends_with(REL_TYPE_NOTES))
            .map(|rel| rel.target.clone());
        Ok(SlideData {
            number: index + 1,
            part_name,
            shapes,
            notes_part,
        })
    }

    /// Speaker notes of a slide: the text of the notes body placeholder.
    pub fn read_notes(&mut self, slide: &SlideData) -> Result<Option<String>, PptxError> {
        let Some(part) = slide.notes_part.as_deref() else {
            return Ok(None);
        };
        let xml = self.read_part(part)?;
        let shapes = parse_shapes(&xml, part, &HashMap::new())?;
        let text = shapes
            .iter()
            .filter_map(|shape| shape.as_ref().ok())
            .filter(|shape| shape.placeholder.as_deref() == Some("body"))
            .filter_map(Shape::text)
            .collect::<Vec<_>>()
            .join("\n");
        Ok((!text.trim().is_empty()).then_some(text))
    }

    /// Raw bytes of a package part.
    pub fn read_binary_part(&mut self, name: &str) -> Result<Vec<u8>, PptxError> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(PptxError::MissingPart(name.to_string()));
            }
            Err(error) => return Err(error.into()),
        };
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// A package part decoded as UTF-8 text.
    pub fn read_part(&mut self, name: &str) -> Result<String, PptxError> {
        read_text_part(&mut self.archive, name)
    }

    fn read_relationships(
        &mut self,
        part_name: &str,
    ) -> Result<HashMap<String, Relationship>, PptxError> {
        read_relationships(&mut self.archive, part_name)
    }
}

#[derive(Debug, Clone)]
struct Relationship {
    rel_type: String,
    target: String,
}

fn read_text_part(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<String, PptxError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(PptxError::MissingPart(name.to_string()));
        }
        Err(error) => return Err(error.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

/// `ppt/slides/slide1.xml` → `ppt/slides/_rels/slide1.xml.rels`.
fn rels_part_for(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn read_relationships(
    archive: &mut zip::ZipArchive<File>,
    part_name: &str,
) -> Result<HashMap<String, Relationship>, PptxError> {
    let rels_part = rels_part_for(part_name);
    let xml = match read_text_part(archive, &rels_part) {
        Ok(xml) => xml,
        Err(PptxError::MissingPart(_)) => return Ok(HashMap::new()),
        Err(error) => return Err(error),
    };

    let mut reader = Reader::from_str(&xml);
    let mut buf = Vec::new();
    let mut relationships = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                let id = attribute(&e, b"Id");
                let rel_type = attribute(&e, b"Type").unwrap_or_default();
                let target = attribute(&e, b"Target");
                let external = attribute(&e, b"TargetMode").as_deref() == Some("External");
                if let (Some(id), Some(target)) = (id, target)
                    && !external
                {
                    relationships.insert(
                        id,
                        Relationship {
                            rel_type,
                            target: resolve_target(part_name, &target),
                        },
                    );
                }
            }
            Ok(Event::Eof) => break,
            Err(source) => {
                return Err(PptxError::Xml {
                    part: rels_part,
                    source,
                });
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

fn resolve_slide_order(archive: &mut zip::ZipArchive<File>) -> Result<Vec<String>, PptxError> {
    let xml = read_text_part(archive, PRESENTATION_PART)?;
    let rels = read_relationships(archive, PRESENTATION_PART)?;

    let mut reader = Reader::from_str(&xml);
    let mut buf = Vec::new();
    let mut ordered = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"p:sldId" => {
                if let Some(rel) = attribute(&e, b"r:id").and_then(|id| rels.get(&id))
                    && rel.rel_type.ends_with(REL_TYPE_SLIDE)
                {
                    ordered.push(rel.target.clone());
                }
            }
            Ok(Event::Eof) => break,
            Err(source) => {
                return Err(PptxError::Xml {
                    part: PRESENTATION_PART.to_string(),
                    source,
                });
            }
            _ => {}
        }
        buf.clear();
    }

    if ordered.is_empty() {
        // Packages without a slide id list: fall back to numeric part order.
        let mut numbered: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| {
                let number = name
                    .strip_prefix("ppt/slides/slide")?
                    .strip_suffix(".xml")?
                    .parse()
                    .ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        numbered.sort();
        ordered = numbered.into_iter().map(|(_, name)| name).collect();
    }
    Ok(ordered)
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

#[derive(Default)]
struct ShapeBuilder {
    name: String,
    placeholder: Option<String>,
    geometry: Option<ShapeGeometry>,
    paragraphs: Vec<Paragraph>,
    has_text_body: bool,
    rows: Vec<Vec<String>>,
    is_table: bool,
    is_picture: bool,
    image_part: Option<String>,
    error: Option<ShapeError>,
}

impl ShapeBuilder {
    fn fail(&mut self, error: ShapeError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn finish(self) -> Result<Shape, ShapeError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let kind = if self.is_table {
            if self.rows.is_empty() {
                return Err(ShapeError::EmptyTable { shape: self.name });
            }
            ShapeKind::Table { rows: self.rows }
        } else if self.is_picture {
            ShapeKind::Picture {
                image_part: self.image_part,
            }
        } else if self.has_text_body {
            ShapeKind::TextFrame {
                paragraphs: self.paragraphs,
            }
        } else {
            ShapeKind::Other
        };
        Ok(Shape {
            name: self.name,
            placeholder: self.placeholder,
            geometry: self.geometry.unwrap_or_default(),
            kind,
        })
    }
}

/// Parse state for one slide or notes part.
#[derive(Default)]
struct SlideParser {
    shapes: Vec<Result<Shape, ShapeError>>,
    current: Option<ShapeBuilder>,
    paragraph: Option<Paragraph>,
    cell: Option<String>,
    in_text: bool,
    in_xfrm: bool,
}

impl SlideParser {
    fn open(&mut self, e: &BytesStart<'_>, rels: &HashMap<String, Relationship>) {
        match e.name().as_ref() {
            b"p:sp" | b"p:cxnSp" | b"p:graphicFrame" => {
                self.current = Some(ShapeBuilder::default());
            }
            b"p:pic" => {
                self.current = Some(ShapeBuilder {
                    is_picture: true,
                    ..ShapeBuilder::default()
                });
            }
            _ => {}
        }
        let Some(shape) = self.current.as_mut() else {
            return;
        };
        match e.name().as_ref() {
            b"p:cNvPr" => shape.name = attribute(e, b"name").unwrap_or_default(),
            b"p:ph" => {
                shape.placeholder =
                    Some(attribute(e, b"type").unwrap_or_else(|| "obj".to_string()));
            }
            b"a:xfrm" | b"p:xfrm" => self.in_xfrm = shape.geometry.is_none(),
            b"a:off" if self.in_xfrm => {
                let geometry = shape.geometry.get_or_insert_with(ShapeGeometry::default);
                geometry.x = attribute(e, b"x").and_then(|v| v.parse().ok()).unwrap_or(0);
                geometry.y = attribute(e, b"y").and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            b"a:ext" if self.in_xfrm => {
                let geometry = shape.geometry.get_or_insert_with(ShapeGeometry::default);
                geometry.cx = attribute(e, b"cx").and_then(|v| v.parse().ok()).unwrap_or(0);
                geometry.cy = attribute(e, b"cy").and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            b"p:txBody" => shape.has_text_body = true,
            b"a:tbl" => shape.is_table = true,
            b"a:tr" if shape.is_table => shape.rows.push(Vec::new()),
            b"a:tc" if shape.is_table => self.cell = Some(String::new()),
            b"a:p" => {
                self.paragraph = Some(Paragraph {
                    level: 0,
                    text: String::new(),
                });
            }
            b"a:pPr" => {
                if let (Some(paragraph), Some(raw)) =
                    (self.paragraph.as_mut(), attribute(e, b"lvl"))
                {
                    match raw.parse::<u32>() {
                        Ok(level) => paragraph.level = level,
                        Err(_) => shape.fail(ShapeError::InvalidAttribute {
                            shape: shape.name.clone(),
                            attribute: "lvl",
                            value: raw,
                        }),
                    }
                }
            }
            b"a:t" => self.in_text = true,
            b"a:br" => {
                if let Some(paragraph) = self.paragraph.as_mut() {
                    paragraph.text.push(' ');
                }
            }
            b"a:blip" if shape.is_picture => {
                shape.image_part = attribute(e, b"r:embed")
                    .and_then(|id| rels.get(&id))
                    .filter(|rel| rel.rel_type.contains(REL_TYPE_IMAGE))
                    .map(|rel| rel.target.clone());
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"p:sp" | b"p:cxnSp" | b"p:graphicFrame" | b"p:pic" => {
                if let Some(shape) = self.current.take() {
                    self.shapes.push(shape.finish());
                }
                self.in_xfrm = false;
            }
            b"a:xfrm" | b"p:xfrm" => self.in_xfrm = false,
            b"a:t" => self.in_text = false,
            b"a:p" => {
                let Some(paragraph) = self.paragraph.take() else {
                    return;
                };
                if let Some(cell) = self.cell.as_mut() {
                    if !paragraph.text.trim().is_empty() {
                        if !cell.is_empty() {
                            cell.push(' ');
                        }
                        cell.push_str(paragraph.text.trim());
                    }
                } else if let Some(shape) = self.current.as_mut() {
                    shape.paragraphs.push(paragraph);
                }
            }
            b"a:tc" => {
                if let (Some(cell), Some(shape)) = (self.cell.take(), self.current.as_mut())
                    && let Some(row) = shape.rows.last_mut()
                {
                    row.push(cell);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text
            && let Some(paragraph) = self.paragraph.as_mut()
        {
            paragraph.text.push_str(text);
        }
    }
}

fn parse_shapes(
    xml: &str,
    part_name: &str,
    rels: &HashMap<String, Relationship>,
) -> Result<Vec<Result<Shape, ShapeError>>, PptxError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut parser = SlideParser::default();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => parser.open(&e, rels),
            Ok(Event::Empty(e)) => {
                parser.open(&e, rels);
                parser.close(e.name().as_ref());
            }
            Ok(Event::End(e)) => parser.close(e.name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|source| PptxError::Xml {
                    part: part_name.to_string(),
                    source,
                })?;
                parser.text(&text);
            }
            Ok(Event::Eof) => break,
            Err(source) => {
                return Err(PptxError::Xml {
                    part: part_name.to_string(),
                    source,
                });
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(parser.shapes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
<p:spPr><a:xfrm><a:off x="100" y="200"/><a:ext cx="3000" cy="400"/></a:xfrm></p:spPr>
<p:txBody><a:p><a:r><a:t>Q1 &amp; Q2</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content 2"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>
<p:txBody><a:p><a:r><a:t>Top</a:t></a:r></a:p><a:p><a:pPr lvl="1"/><a:r><a:t>Nested</a:t></a:r></a:p><a:p/></p:txBody></p:sp>
<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="4" name="Table 3"/></p:nvGraphicFramePr>
<p:xfrm><a:off x="10" y="20"/><a:ext cx="30" cy="40"/></p:xfrm>
<a:graphic><a:graphicData><a:tbl>
<a:tr><a:tc><a:txBody><a:p><a:r><a:t>월</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>매출</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
<a:tr><a:tc><a:txBody><a:p><a:r><a:t>1월</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>100</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
</a:tbl></a:graphicData></a:graphic></p:graphicFrame>
<p:pic><p:nvPicPr><p:cNvPr id="5" name="Picture 4"/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/></p:blipFill></p:pic>
<p:sp><p:nvSpPr><p:cNvPr id="6" name="Broken"/></p:nvSpPr><p:txBody><a:p><a:pPr lvl="deep"/><a:r><a:t>x</a:t></a:r></a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#;

    fn image_rels() -> HashMap<String, Relationship> {
        HashMap::from([(
            "rId2".to_string(),
            Relationship {
                rel_type: "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image"
                    .to_string(),
                target: "ppt/media/image1.png".to_string(),
            },
        )])
    }

    #[test]
    fn parses_shapes_in_document_order() {
        let shapes = parse_shapes(SLIDE, "ppt/slides/slide1.xml", &image_rels()).expect("parse");
        assert_eq!(shapes.len(), 5);

        let title = shapes[0].as_ref().expect("title");
        assert!(title.is_title_placeholder());
        assert_eq!(title.text().as_deref(), Some("Q1 & Q2"));
        assert_eq!(
            title.geometry,
            ShapeGeometry {
                x: 100,
                y: 200,
                cx: 3000,
                cy: 400
            }
        );

        let body = shapes[1].as_ref().expect("body");
        assert_eq!(body.placeholder.as_deref(), Some("obj"));
        let ShapeKind::TextFrame { paragraphs } = &body.kind else {
            panic!("expected text frame");
        };
        let levels: Vec<u32> = paragraphs.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![0, 1, 0]);

        let table = shapes[2].as_ref().expect("table");
        assert_eq!(
            table.kind,
            ShapeKind::Table {
                rows: vec![
                    vec!["월".to_string(), "매출".to_string()],
                    vec!["1월".to_string(), "100".to_string()],
                ]
            }
        );

        let picture = shapes[3].as_ref().expect("picture");
        assert_eq!(
            picture.kind,
            ShapeKind::Picture {
                image_part: Some("ppt/media/image1.png".to_string())
            }
        );

        assert!(matches!(
            shapes[4],
            Err(ShapeError::InvalidAttribute { attribute: "lvl", .. })
        ));
    }

    #[test]
    fn summary_text_skips_pictures_and_broken_shapes() {
        let shapes = parse_shapes(SLIDE, "ppt/slides/slide1.xml", &image_rels()).expect("parse");
        let slide = SlideData {
            number: 1,
            part_name: "ppt/slides/slide1.xml".into(),
            shapes,
            notes_part: None,
        };
        assert_eq!(slide.title().as_deref(), Some("Q1 & Q2"));
        let summary = slide.summary_text();
        assert!(summary.starts_with("Q1 & Q2\nTop\nNested"));
        assert!(summary.contains("표 헤더: 월 | 매출"));
        assert!(summary.contains("행 1: 1월 | 100"));
    }

    #[test]
    fn relationship_targets_resolve_relative_to_source_part() {
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../notesSlides/notesSlide1.xml"),
            "ppt/notesSlides/notesSlide1.xml"
        );
        assert_eq!(
            resolve_target("ppt/presentation.xml", "slides/slide2.xml"),
            "ppt/slides/slide2.xml"
        );
        assert_eq!(resolve_target("ppt/slides/slide1.xml", "/ppt/media/a.png"), "ppt/media/a.png");
        assert_eq!(rels_part_for("ppt/slides/slide1.xml"), "ppt/slides/_rels/slide1.xml.rels");
    }

    #[test]
    fn empty_table_is_a_shape_error() {
        let xml = r#"<p:sld xmlns:p="p" xmlns:a="a"><p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="1" name="T"/></p:nvGraphicFramePr><a:graphic><a:graphicData><a:tbl/></a:graphicData></a:graphic></p:graphicFrame></p:sld>"#;
        let shapes = parse_shapes(xml, "s.xml", &HashMap::new()).expect("parse");
        assert_eq!(shapes, vec![Err(ShapeError::EmptyTable { shape: "T".into() })]);
    }
}
