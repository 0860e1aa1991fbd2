//! Character-level PDF extraction.
//!
//! [`PdfDocument`] walks each page's content stream with `lopdf`, tracking the text and
//! graphics matrices so every glyph comes out with a position, an effective font size and the
//! font's base name. Form XObjects are followed with their own matrix and resources, and
//! Type0 fonts take glyph widths from the descendant CIDFont. Text is decoded through the
//! font's ToUnicode CMap when present. Tables
//! are detected from the resulting layout: consecutive lines that break into the same number of
//! column-aligned cells.
//!
//! [`PageSource`] is the seam the layout analyzer reads from, so tests can feed synthetic pages.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::model::BoundingBox;

/// Errors raised while reading a PDF.
#[derive(Debug, Error)]
pub enum PdfError {
    /// `lopdf` could not parse the file.
    #[error("Failed to open PDF {path}: {source}")]
    Open {
        /// File that failed to open.
        path: String,
        /// Parser error.
        #[source]
        source: lopdf::Error,
    },
    /// A page's content stream or resources could not be read.
    #[error("Failed to read page {page}: {source}")]
    Page {
        /// 1-based page number.
        page: usize,
        /// Parser error.
        #[source]
        source: lopdf::Error,
    },
    /// Whole-document text extraction failed.
    #[error("Plain-text extraction failed: {0}")]
    PlainText(String),
}

/// One positioned glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfChar {
    /// Decoded text, usually a single character.
    pub text: String,
    /// Left edge.
    pub x0: f32,
    /// Right edge.
    pub x1: f32,
    /// Top edge, measured down from the top of the page.
    pub top: f32,
    /// Baseline, measured down from the top of the page.
    pub bottom: f32,
    /// Effective font size after text and graphics scaling.
    pub size: f32,
    /// Base font name, e.g. `Helvetica-Bold`.
    pub font_name: String,
}

impl PdfChar {
    /// Whether the glyph renders only whitespace.
    pub fn is_space(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

/// Table found on a page, as a grid of cell texts.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTable {
    /// Row-major cell texts; row 0 is treated as the header.
    pub rows: Vec<Vec<String>>,
    /// Area covered by the table.
    pub bbox: BoundingBox,
}

/// Read access to one page for layout analysis.
pub trait PageSource {
    /// 1-based page number.
    fn page_number(&self) -> usize;
    /// Positioned glyphs in content-stream order.
    fn chars(&self) -> Result<Vec<PdfChar>, PdfError>;
    /// Tables detected on the page.
    fn tables(&self) -> Result<Vec<ExtractedTable>, PdfError>;
    /// Page text without layout information.
    fn plain_text(&self) -> Result<String, PdfError>;
}

/// An opened PDF.
pub struct PdfDocument {
    document: Document,
    pages: Vec<(u32, ObjectId)>,
}

impl PdfDocument {
    /// Open and parse a PDF from disk.
    pub fn open(path: &Path) -> Result<Self, PdfError> {
        let document = Document::load(path).map_err(|source| PdfError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let pages = document.get_pages().into_iter().collect();
        Ok(Self { document, pages })
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Pages in document order.
    pub fn pages(&self) -> impl Iterator<Item = LopdfPage<'_>> {
        self.pages
            .iter()
            .enumerate()
            .map(|(index, &(page_number, page_id))| LopdfPage {
                document: &self.document,
                number: index + 1,
                lopdf_number: page_number,
                page_id,
                chars: OnceCell::new(),
            })
    }
}

/// One page of a [`PdfDocument`].
pub struct LopdfPage<'a> {
    document: &'a Document,
    number: usize,
    lopdf_number: u32,
    page_id: ObjectId,
    chars: OnceCell<Vec<PdfChar>>,
}

impl LopdfPage<'_> {
    fn load_chars(&self) -> Result<&[PdfChar], PdfError> {
        if let Some(chars) = self.chars.get() {
            return Ok(chars);
        }
        let chars = interpret_page(self.document, self.page_id).map_err(|source| {
            PdfError::Page {
                page: self.number,
                source,
            }
        })?;
        Ok(self.chars.get_or_init(|| chars))
    }
}

impl PageSource for LopdfPage<'_> {
    fn page_number(&self) -> usize {
        self.number
    }

    fn chars(&self) -> Result<Vec<PdfChar>, PdfError> {
        self.load_chars().map(<[PdfChar]>::to_vec)
    }

    fn tables(&self) -> Result<Vec<ExtractedTable>, PdfError> {
        Ok(detect_tables(self.load_chars()?))
    }

    fn plain_text(&self) -> Result<String, PdfError> {
        self.document
            .extract_text(&[self.lopdf_number])
            .map_err(|source| PdfError::Page {
                page: self.number,
                source,
            })
    }
}

/// Whole-document text from `pdf-extract`, split into pages on form feeds.
pub fn extract_plain_pages(path: &Path) -> Result<Vec<String>, PdfError> {
    // pdf-extract can panic on malformed input.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text(path)
    }));
    let text = match result {
        Ok(Ok(text)) => text,
        Ok(Err(error)) => return Err(PdfError::PlainText(error.to_string())),
        Err(_) => return Err(PdfError::PlainText("extractor panicked".to_string())),
    };
    Ok(text.split('\u{c}').map(str::to_string).collect())
}

/// Join glyphs into text, inserting a space where a visible gap separates two glyphs.
pub(crate) fn join_chars<'a>(chars: impl IntoIterator<Item = &'a PdfChar>) -> String {
    let mut text = String::new();
    let mut previous: Option<&PdfChar> = None;
    for current in chars {
        if let Some(prev) = previous
            && !prev.is_space()
            && !current.is_space()
            && current.x0 - prev.x1 > prev.size.max(current.size) * 0.2
        {
            text.push(' ');
        }
        text.push_str(&current.text);
        previous = Some(current);
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------------------------
// Content-stream interpretation
// ---------------------------------------------------------------------------------------------

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];
const MAX_CMAP_RANGE: u32 = 0x1_0000;

fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct FontInfo {
    base_font: String,
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    to_unicode: Option<ToUnicodeMap>,
}

impl FontInfo {
    fn fallback() -> Self {
        Self {
            default_width: 0.5,
            ..Self::default()
        }
    }

    fn from_dictionary(document: &Document, dictionary: &Dictionary) -> Self {
        let base_font = dictionary
            .get(b"BaseFont")
            .ok()
            .and_then(|name| resolve(document, name).as_name().ok())
            .map(|name| {
                let name = String::from_utf8_lossy(name).into_owned();
                // Subset prefix, e.g. `ABCDEF+Arial-BoldMT`.
                match name.split_once('+') {
                    Some((prefix, rest)) if prefix.len() == 6 => rest.to_string(),
                    _ => name,
                }
            })
            .unwrap_or_default();
        let two_byte = dictionary
            .get(b"Subtype")
            .ok()
            .and_then(|subtype| subtype.as_name().ok())
            .is_some_and(|subtype| subtype == b"Type0");
        let first_char = dictionary
            .get(b"FirstChar")
            .ok()
            .and_then(|value| number(resolve(document, value)))
            .map(|value| value.max(0.0) as u32)
            .unwrap_or(0);
        let widths = dictionary
            .get(b"Widths")
            .ok()
            .and_then(|value| resolve(document, value).as_array().ok())
            .map(|values| {
                values
                    .iter()
                    .map(|value| number(resolve(document, value)).unwrap_or(0.0) / 1000.0)
                    .collect()
            })
            .unwrap_or_default();
        let to_unicode = dictionary
            .get(b"ToUnicode")
            .ok()
            .and_then(|value| resolve(document, value).as_stream().ok())
            .map(|stream| {
                let bytes = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                ToUnicodeMap::parse(&String::from_utf8_lossy(&bytes))
            });
        let descendant = two_byte
            .then(|| dictionary.get(b"DescendantFonts").ok())
            .flatten()
            .and_then(|value| resolve(document, value).as_array().ok())
            .and_then(|fonts| fonts.first())
            .and_then(|value| resolve(document, value).as_dict().ok());
        let (cid_widths, default_width) = match descendant {
            Some(cid_font) => {
                let default_width = cid_font
                    .get(b"DW")
                    .ok()
                    .and_then(|value| number(resolve(document, value)))
                    .unwrap_or(1000.0)
                    / 1000.0;
                let widths = cid_font
                    .get(b"W")
                    .ok()
                    .and_then(|value| resolve(document, value).as_array().ok())
                    .map(|values| cid_widths(document, values))
                    .unwrap_or_default();
                (widths, default_width)
            }
            None if two_byte => (HashMap::new(), 1.0),
            None => (HashMap::new(), 0.5),
        };

        Self {
            base_font,
            two_byte,
            first_char,
            widths,
            cid_widths,
            default_width,
            to_unicode,
        }
    }

    fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|index| self.widths.get(index as usize))
            .copied()
            .filter(|width| *width > 0.0)
            .unwrap_or(self.default_width)
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        let width = match &self.to_unicode {
            Some(map) if map.code_bytes > 0 => map.code_bytes,
            _ if self.two_byte => 2,
            _ => 1,
        };
        bytes
            .chunks(width)
            .map(|chunk| chunk.iter().fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
            .collect()
    }

    fn decode(&self, code: u32) -> String {
        if let Some(text) = self
            .to_unicode
            .as_ref()
            .and_then(|map| map.entries.get(&code))
        {
            return text.clone();
        }
        char::from_u32(code)
            .filter(|c| !c.is_control() || c.is_whitespace())
            .map(String::from)
            .unwrap_or_default()
    }
}

/// Parse a CIDFont `/W` array: `c [w1 w2 ...]` runs and `c_first c_last w` ranges.
fn cid_widths(document: &Document, values: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut index = 0;
    while let Some(first) = values.get(index).and_then(|value| number(resolve(document, value))) {
        let first = first.max(0.0) as u32;
        match values.get(index + 1).map(|value| resolve(document, value)) {
            Some(Object::Array(run)) => {
                for (offset, value) in run.iter().take(MAX_CMAP_RANGE as usize).enumerate() {
                    if let Some(width) = number(resolve(document, value)) {
                        widths.insert(first.saturating_add(offset as u32), width / 1000.0);
                    }
                }
                index += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (
                    number(last),
                    values
                        .get(index + 2)
                        .and_then(|value| number(resolve(document, value))),
                ) else {
                    break;
                };
                let last = (last.max(0.0) as u32).min(first.saturating_add(MAX_CMAP_RANGE - 1));
                for code in first..=last {
                    widths.insert(code, width / 1000.0);
                }
                index += 3;
            }
            None => break,
        }
    }
    widths
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn media_box(document: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut current = document.get_object(page_id).ok();
    for _ in 0..32 {
        let Some(dictionary) = current.and_then(|object| object.as_dict().ok()) else {
            break;
        };
        if let Ok(value) = dictionary.get(b"MediaBox")
            && let Ok(values) = resolve(document, value).as_array()
        {
            let coords: Vec<f32> = values
                .iter()
                .filter_map(|value| number(resolve(document, value)))
                .collect();
            if let [x0, y0, x1, y1] = coords[..] {
                return [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)];
            }
        }
        current = dictionary
            .get(b"Parent")
            .ok()
            .and_then(|parent| parent.as_reference().ok())
            .and_then(|id| document.get_object(id).ok());
    }
    DEFAULT_MEDIA_BOX
}

/// Page `Resources`, inherited from the nearest ancestor that declares them.
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = document.get_object(page_id).ok();
    for _ in 0..32 {
        let dictionary = current.and_then(|object| object.as_dict().ok())?;
        if let Ok(value) = dictionary.get(b"Resources")
            && let Ok(resources) = resolve(document, value).as_dict()
        {
            return Some(resources);
        }
        current = dictionary
            .get(b"Parent")
            .ok()
            .and_then(|parent| parent.as_reference().ok())
            .and_then(|id| document.get_object(id).ok());
    }
    None
}

/// Fonts and XObjects a content stream can name.
struct ResourceScope {
    fonts: HashMap<Vec<u8>, FontInfo>,
    xobjects: HashMap<Vec<u8>, ObjectId>,
}

impl ResourceScope {
    fn page(document: &Document, page_id: ObjectId) -> Self {
        let fonts = document
            .get_page_fonts(page_id)
            .into_iter()
            .map(|(name, dictionary)| (name, FontInfo::from_dictionary(document, dictionary)))
            .collect();
        let xobjects = page_resources(document, page_id)
            .map(|resources| xobject_names(document, resources))
            .unwrap_or_default();
        Self { fonts, xobjects }
    }

    fn from_resources(document: &Document, resources: &Dictionary) -> Self {
        let fonts = resources
            .get(b"Font")
            .ok()
            .and_then(|value| resolve(document, value).as_dict().ok())
            .map(|fonts| {
                fonts
                    .iter()
                    .filter_map(|(name, value)| {
                        let dictionary = resolve(document, value).as_dict().ok()?;
                        Some((name.clone(), FontInfo::from_dictionary(document, dictionary)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            fonts,
            xobjects: xobject_names(document, resources),
        }
    }
}

fn xobject_names(document: &Document, resources: &Dictionary) -> HashMap<Vec<u8>, ObjectId> {
    resources
        .get(b"XObject")
        .ok()
        .and_then(|value| resolve(document, value).as_dict().ok())
        .map(|xobjects| {
            xobjects
                .iter()
                .filter_map(|(name, value)| Some((name.clone(), value.as_reference().ok()?)))
                .collect()
        })
        .unwrap_or_default()
}

const MAX_FORM_DEPTH: usize = 8;

struct Interpreter<'a> {
    document: &'a Document,
    page_top: f32,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    chars: Vec<PdfChar>,
}

fn interpret_page(document: &Document, page_id: ObjectId) -> Result<Vec<PdfChar>, lopdf::Error> {
    let bytes = document.get_page_content(page_id)?;
    let content = Content::decode(&bytes)?;
    let scope = ResourceScope::page(document, page_id);
    let [_, _, _, page_top] = media_box(document, page_id);

    let mut interpreter = Interpreter {
        document,
        page_top,
        state: GraphicsState::default(),
        stack: Vec::new(),
        text_matrix: IDENTITY,
        line_matrix: IDENTITY,
        chars: Vec::new(),
    };
    interpreter.run(&content.operations, &scope, 0);
    Ok(interpreter.chars)
}

impl Interpreter<'_> {
    fn run(&mut self, operations: &[Operation], scope: &ResourceScope, depth: usize) {
        for operation in operations {
            self.apply(&operation.operator, &operation.operands, scope, depth);
        }
    }

    /// Run a Form XObject's content in its own coordinate space and resources.
    fn draw_form(&mut self, name: &[u8], scope: &ResourceScope, depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            tracing::debug!(depth, "Form XObject nesting too deep; skipping");
            return;
        }
        let document = self.document;
        let Some(stream) = scope
            .xobjects
            .get(name)
            .and_then(|id| document.get_object(*id).ok())
            .and_then(|object| object.as_stream().ok())
        else {
            return;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|subtype| subtype.as_name().ok())
            .is_some_and(|subtype| subtype == b"Form");
        if !is_form {
            return;
        }
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let Ok(content) = Content::decode(&bytes) else {
            tracing::debug!("Undecodable Form XObject content; skipping");
            return;
        };
        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|value| resolve(document, value).as_array().ok())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| number(resolve(document, value)))
                    .collect::<Vec<f32>>()
            })
            .and_then(|values| <Matrix>::try_from(values.as_slice()).ok())
            .unwrap_or(IDENTITY);
        let nested = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|value| resolve(document, value).as_dict().ok())
            .map(|resources| ResourceScope::from_resources(document, resources));

        let saved_state = self.state.clone();
        let saved_stack = self.stack.len();
        let saved_text = (self.text_matrix, self.line_matrix);
        self.state.ctm = multiply(&matrix, &self.state.ctm);
        self.run(&content.operations, nested.as_ref().unwrap_or(scope), depth + 1);
        self.state = saved_state;
        self.stack.truncate(saved_stack);
        (self.text_matrix, self.line_matrix) = saved_text;
    }

    fn apply(&mut self, operator: &str, operands: &[Object], scope: &ResourceScope, depth: usize) {
        let numbers: Vec<f32> = operands.iter().filter_map(number).collect();
        match operator {
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.draw_form(name, scope, depth);
                }
            }
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let [a, b, c, d, e, f] = numbers[..] {
                    self.state.ctm = multiply(&[a, b, c, d, e, f], &self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.state.font = Some(name.clone());
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.state.char_spacing = numbers.first().copied().unwrap_or(0.0),
            "Tw" => self.state.word_spacing = numbers.first().copied().unwrap_or(0.0),
            "Tz" => self.state.horizontal_scale = numbers.first().copied().unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = numbers.first().copied().unwrap_or(0.0),
            "Td" => {
                if let [tx, ty] = numbers[..] {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let [tx, ty] = numbers[..] {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let [a, b, c, d, e, f] = numbers[..] {
                    self.text_matrix = [a, b, c, d, e, f];
                    self.line_matrix = self.text_matrix;
                }
            }
            "T*" => self.move_line(0.0, -self.state.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes, scope);
                }
            }
            "'" => {
                self.move_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes, scope);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    self.state.word_spacing = aw;
                    self.state.char_spacing = ac;
                }
                self.move_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes, scope);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes, scope),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0
                                        * self.state.font_size
                                        * self.state.horizontal_scale;
                                    self.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translate(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply(&translate(tx, 0.0), &self.text_matrix);
    }

    fn show(&mut self, bytes: &[u8], scope: &ResourceScope) {
        let fallback;
        let font = match self.state.font.as_ref().and_then(|name| scope.fonts.get(name)) {
            Some(font) => font,
            None => {
                fallback = FontInfo::fallback();
                &fallback
            }
        };
        let size = self.state.font_size;
        let scale = self.state.horizontal_scale;

        let utf16 = font.to_unicode.is_none() && bytes.starts_with(&[0xFE, 0xFF]);
        let glyphs: Vec<(u32, String)> = if utf16 {
            let units: Vec<u16> = bytes[2..]
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
                .collect();
            char::decode_utf16(units)
                .filter_map(Result::ok)
                .map(|c| (u32::from(c), c.to_string()))
                .collect()
        } else {
            font.codes(bytes)
                .into_iter()
                .map(|code| (code, font.decode(code)))
                .collect()
        };

        for (code, text) in glyphs {
            let rendering = multiply(&self.text_matrix, &self.state.ctm);
            let x_scale = rendering[0].hypot(rendering[1]);
            let y_scale = rendering[2].hypot(rendering[3]);
            let effective_size = size * y_scale;
            let glyph_width = font.width(code) * size * scale * x_scale;
            let baseline = self.page_top - rendering[5];

            if !text.is_empty() && effective_size > 0.0 {
                self.chars.push(PdfChar {
                    text: text.clone(),
                    x0: rendering[4],
                    x1: rendering[4] + glyph_width,
                    top: baseline - effective_size,
                    bottom: baseline,
                    size: effective_size,
                    font_name: font.base_font.clone(),
                });
            }

            let word_spacing = if text == " " {
                self.state.word_spacing
            } else {
                0.0
            };
            let tx = (font.width(code) * size + self.state.char_spacing + word_spacing) * scale;
            self.advance(tx);
        }
    }
}

// ---------------------------------------------------------------------------------------------
// ToUnicode CMaps
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ToUnicodeMap {
    code_bytes: usize,
    entries: BTreeMap<u32, String>,
}

#[derive(Debug, PartialEq)]
enum CmapToken {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

impl ToUnicodeMap {
    fn parse(source: &str) -> Self {
        let tokens = cmap_tokens(source);
        let mut map = Self::default();
        let mut index = 0;
        while index < tokens.len() {
            match &tokens[index] {
                CmapToken::Word(word) if word == "beginbfchar" => {
                    index += 1;
                    while let (Some(CmapToken::Hex(src)), Some(CmapToken::Hex(dst))) =
                        (tokens.get(index), tokens.get(index + 1))
                    {
                        map.insert(src, utf16_text(dst));
                        index += 2;
                    }
                }
                CmapToken::Word(word) if word == "beginbfrange" => {
                    index += 1;
                    index = map.parse_ranges(&tokens, index);
                }
                _ => index += 1,
            }
        }
        map
    }

    fn parse_ranges(&mut self, tokens: &[CmapToken], mut index: usize) -> usize {
        while let (Some(CmapToken::Hex(low)), Some(CmapToken::Hex(high))) =
            (tokens.get(index), tokens.get(index + 1))
        {
            let start = code_value(low);
            let end = code_value(high).min(start.saturating_add(MAX_CMAP_RANGE));
            self.code_bytes = self.code_bytes.max(low.len());
            index += 2;
            match tokens.get(index) {
                Some(CmapToken::Hex(destination)) => {
                    let mut units = utf16_units(destination);
                    for code in start..=end {
                        self.entries
                            .insert(code, String::from_utf16_lossy(&units));
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add(1);
                        }
                    }
                    index += 1;
                }
                Some(CmapToken::Open) => {
                    index += 1;
                    let mut code = start;
                    while let Some(CmapToken::Hex(destination)) = tokens.get(index) {
                        if code <= end {
                            self.entries.insert(code, utf16_text(destination));
                        }
                        code = code.saturating_add(1);
                        index += 1;
                    }
                    if tokens.get(index) == Some(&CmapToken::Close) {
                        index += 1;
                    }
                }
                _ => break,
            }
        }
        index
    }

    fn insert(&mut self, source: &[u8], text: String) {
        self.code_bytes = self.code_bytes.max(source.len());
        self.entries.insert(code_value(source), text);
    }
}

fn cmap_tokens(source: &str) -> Vec<CmapToken> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut hex = String::new();
                for next in chars.by_ref() {
                    if next == '>' {
                        break;
                    }
                    if next.is_ascii_hexdigit() {
                        hex.push(next);
                    }
                }
                if hex.len() % 2 == 1 {
                    hex.push('0');
                }
                if let Ok(bytes) = hex::decode(&hex) {
                    tokens.push(CmapToken::Hex(bytes));
                }
            }
            '[' => tokens.push(CmapToken::Open),
            ']' => tokens.push(CmapToken::Close),
            '%' => {
                for next in chars.by_ref() {
                    if next == '\n' || next == '\r' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '<' | '[' | ']') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(CmapToken::Word(word));
            }
        }
    }
    tokens
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [high, low] => u16::from_be_bytes([*high, *low]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

// ---------------------------------------------------------------------------------------------
// Table detection
// ---------------------------------------------------------------------------------------------

const LINE_TOLERANCE: f32 = 3.0;
const CELL_GAP_FACTOR: f32 = 1.5;
const ROW_GAP_FACTOR: f32 = 3.0;
const MIN_TABLE_ROWS: usize = 2;
const MIN_TABLE_COLUMNS: usize = 2;

#[derive(Debug, Clone)]
struct Cell {
    text: String,
    bbox: BoundingBox,
}

#[derive(Debug, Clone)]
struct Line {
    cells: Vec<Cell>,
    top: f32,
    bottom: f32,
    size: f32,
}

/// Detect grids of column-aligned cells.
///
/// A table is a run of at least two consecutive lines that each split into the same number
/// (at least two) of cells separated by wide gaps, with cell left or right edges aligned.
pub fn detect_tables(chars: &[PdfChar]) -> Vec<ExtractedTable> {
    let lines = group_lines(chars);
    let mut tables = Vec::new();
    let mut run: Vec<&Line> = Vec::new();

    for line in &lines {
        let continues = run.last().is_some_and(|previous| {
            line.cells.len() == previous.cells.len()
                && line.top - previous.bottom <= ROW_GAP_FACTOR * previous.size.max(line.size)
                && columns_aligned(previous, line)
        });
        if !continues {
            push_table(&run, &mut tables);
            run.clear();
        }
        if line.cells.len() >= MIN_TABLE_COLUMNS {
            run.push(line);
        }
    }
    push_table(&run, &mut tables);
    tables
}

fn push_table(run: &[&Line], tables: &mut Vec<ExtractedTable>) {
    if run.len() < MIN_TABLE_ROWS {
        return;
    }
    let rows = run
        .iter()
        .map(|line| line.cells.iter().map(|cell| cell.text.clone()).collect())
        .collect();
    let bbox = run
        .iter()
        .flat_map(|line| line.cells.iter().map(|cell| cell.bbox))
        .reduce(BoundingBox::union);
    if let Some(bbox) = bbox {
        tables.push(ExtractedTable { rows, bbox });
    }
}

fn columns_aligned(previous: &Line, line: &Line) -> bool {
    let tolerance = previous.size.max(line.size) * 1.5;
    previous.cells.iter().zip(&line.cells).all(|(upper, lower)| {
        (upper.bbox.x0 - lower.bbox.x0).abs() <= tolerance
            || (upper.bbox.x1 - lower.bbox.x1).abs() <= tolerance
    })
}

fn group_lines(chars: &[PdfChar]) -> Vec<Line> {
    let mut sorted: Vec<&PdfChar> = chars.iter().collect();
    sorted.sort_by(|a, b| a.bottom.total_cmp(&b.bottom).then(a.x0.total_cmp(&b.x0)));

    let mut rows: Vec<Vec<&PdfChar>> = Vec::new();
    for c in sorted {
        match rows.last_mut() {
            Some(row) if (row[0].bottom - c.bottom).abs() <= LINE_TOLERANCE => row.push(c),
            _ => rows.push(vec![c]),
        }
    }

    rows.into_iter()
        .filter_map(|mut row| {
            row.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            let cells = split_cells(&row);
            if cells.is_empty() {
                return None;
            }
            let top = cells.iter().map(|cell| cell.bbox.top).fold(f32::MAX, f32::min);
            let bottom = cells
                .iter()
                .map(|cell| cell.bbox.bottom)
                .fold(f32::MIN, f32::max);
            let size = row.iter().map(|c| c.size).fold(0.0, f32::max);
            Some(Line {
                cells,
                top,
                bottom,
                size,
            })
        })
        .collect()
}

fn split_cells(row: &[&PdfChar]) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut current: Vec<&PdfChar> = Vec::new();
    let mut last_visible: Option<&PdfChar> = None;

    for &c in row {
        if c.is_space() {
            current.push(c);
            continue;
        }
        if let Some(previous) = last_visible
            && c.x0 - previous.x1 > CELL_GAP_FACTOR * previous.size.max(c.size)
        {
            push_cell(&mut current, &mut cells);
        }
        current.push(c);
        last_visible = Some(c);
    }
    push_cell(&mut current, &mut cells);
    cells
}

fn push_cell(current: &mut Vec<&PdfChar>, cells: &mut Vec<Cell>) {
    let visible: Vec<&PdfChar> = current.iter().copied().filter(|c| !c.is_space()).collect();
    if let Some(first) = visible.first() {
        let bbox = visible.iter().fold(
            BoundingBox {
                x0: first.x0,
                top: first.top,
                x1: first.x1,
                bottom: first.bottom,
            },
            |bbox, c| {
                bbox.union(BoundingBox {
                    x0: c.x0,
                    top: c.top,
                    x1: c.x1,
                    bottom: c.bottom,
                })
            },
        );
        cells.push(Cell {
            text: join_chars(current.iter().copied()),
            bbox,
        });
    }
    current.clear();
}
