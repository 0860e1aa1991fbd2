//! Page structure reconstruction.
//!
//! Glyphs are grouped into blocks by vertical position and font size, then each block is
//! classified with font statistics and a handful of patterns. Precedence is caption, heading,
//! section, list item, paragraph. Tables come from the page's table detector and are rendered
//! to Markdown. Everything is returned in reading order (top, then left).

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::source::{PageSource, PdfChar, PdfError, join_chars};
use crate::chunking::render_markdown_table;
use crate::model::{BoundingBox, char_count};

/// Font size above which a short block counts as a heading.
pub const TITLE_FONT_THRESHOLD: f32 = 18.0;

const BLOCK_VERTICAL_TOLERANCE: f32 = 5.0;
const BLOCK_SIZE_TOLERANCE: f32 = 2.0;
const HEADING_MAX_CHARS: usize = 100;
const TABLE_BBOX_TOLERANCE: f32 = 1.0;

static CAPTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:fig\.|figure|table|tab\.)\s*\d+|^(그림|표)\s*\d+")
        .expect("caption pattern compiles")
});

static SECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(\.\d+)+\.?\s+\S|(?i:chapter)\s+\d+|제\s*\d+\s*[장절편])")
        .expect("section pattern compiles")
});

static LIST_ITEM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([•·▪◦‣●○■□\-*–]|\d{1,3}[.)]|[a-zA-Z][.)]|[가-힣][.)])\s+\S")
        .expect("list item pattern compiles")
});

/// Structural role of a layout element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// Large or bold short line.
    Heading,
    /// `Figure 1`, `표 2` style caption.
    Caption,
    /// Numbered section line such as `1.2 Scope` or `제3장`.
    Section,
    /// Bulleted or numbered list line.
    ListItem,
    /// Body text.
    Paragraph,
    /// Detected table.
    Table,
}

/// One classified element of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutElement {
    /// Structural role.
    pub element_type: ElementType,
    /// Element text; Markdown for tables.
    pub text: String,
    /// Area covered on the page.
    pub bbox: Option<BoundingBox>,
    /// Dominant font size.
    pub font_size: Option<f32>,
    /// Whether the dominant font is bold.
    pub is_bold: bool,
    /// 1 to 4 for headings.
    pub heading_level: Option<u8>,
    /// Cell grid for tables.
    pub grid: Option<Vec<Vec<String>>>,
}

impl LayoutElement {
    /// Untyped body text with no layout information.
    pub fn plain_paragraph(text: impl Into<String>) -> Self {
        Self {
            element_type: ElementType::Paragraph,
            text: text.into(),
            bbox: None,
            font_size: None,
            is_bold: false,
            heading_level: None,
            grid: None,
        }
    }
}

/// Mean, spread and median of block font sizes on one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontStatistics {
    /// Arithmetic mean.
    pub mean: f32,
    /// Population standard deviation.
    pub std_dev: f32,
    /// Median.
    pub median: f32,
}

impl FontStatistics {
    /// Compute statistics over `sizes`; `None` when empty.
    pub fn from_sizes(sizes: &[f32]) -> Option<Self> {
        if sizes.is_empty() {
            return None;
        }
        let count = sizes.len() as f32;
        let mean = sizes.iter().sum::<f32>() / count;
        let variance = sizes.iter().map(|size| (size - mean).powi(2)).sum::<f32>() / count;

        let mut sorted = sizes.to_vec();
        sorted.sort_by(f32::total_cmp);
        let middle = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[middle - 1] + sorted[middle]) / 2.0
        } else {
            sorted[middle]
        };

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            median,
        })
    }
}

#[derive(Debug)]
struct TextBlock {
    text: String,
    bbox: BoundingBox,
    font_size: f32,
    is_bold: bool,
}

/// Classifies page content into layout elements.
#[derive(Debug, Clone)]
pub struct LayoutAnalyzer {
    title_font_threshold: f32,
}

impl Default for LayoutAnalyzer {
    fn default() -> Self {
        Self {
            title_font_threshold: TITLE_FONT_THRESHOLD,
        }
    }
}

impl LayoutAnalyzer {
    /// Analyzer with the default heading threshold.
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements of one page in reading order.
    ///
    /// Falls back to the page's plain text as a single paragraph when analysis fails.
    pub fn analyze_page<P: PageSource + ?Sized>(&self, page: &P) -> Vec<LayoutElement> {
        match self.try_analyze(page) {
            Ok(elements) if !elements.is_empty() => elements,
            Ok(_) => plain_text_elements(page),
            Err(error) => {
                tracing::warn!(
                    page = page.page_number(),
                    error = %error,
                    "Layout analysis failed; using plain page text"
                );
                plain_text_elements(page)
            }
        }
    }

    fn try_analyze<P: PageSource + ?Sized>(&self, page: &P) -> Result<Vec<LayoutElement>, PdfError> {
        let chars = page.chars()?;
        let tables = page.tables()?;

        let table_boxes: Vec<BoundingBox> = tables.iter().map(|table| table.bbox).collect();
        let free_chars: Vec<&PdfChar> = chars
            .iter()
            .filter(|c| {
                let (cx, cy) = ((c.x0 + c.x1) / 2.0, (c.top + c.bottom) / 2.0);
                !table_boxes
                    .iter()
                    .any(|bbox| bbox.contains(cx, cy, TABLE_BBOX_TOLERANCE))
            })
            .collect();

        let blocks = group_blocks(&free_chars);
        let sizes: Vec<f32> = blocks.iter().map(|block| block.font_size).collect();
        let stats = FontStatistics::from_sizes(&sizes);
        if let Some(stats) = stats {
            tracing::trace!(
                page = page.page_number(),
                blocks = blocks.len(),
                mean = stats.mean,
                std_dev = stats.std_dev,
                median = stats.median,
                "Computed font statistics"
            );
        }
        let median = stats.map(|stats| stats.median).unwrap_or(0.0);

        let mut elements: Vec<LayoutElement> = blocks
            .into_iter()
            .map(|block| {
                let element_type = self.classify(&block.text, block.font_size, block.is_bold);
                let heading_level = (element_type == ElementType::Heading)
                    .then(|| heading_level(block.font_size, median));
                LayoutElement {
                    element_type,
                    text: block.text,
                    bbox: Some(block.bbox),
                    font_size: Some(block.font_size),
                    is_bold: block.is_bold,
                    heading_level,
                    grid: None,
                }
            })
            .collect();

        for table in tables {
            let markdown = render_markdown_table(&table.rows);
            if markdown.is_empty() {
                continue;
            }
            elements.push(LayoutElement {
                element_type: ElementType::Table,
                text: markdown,
                bbox: Some(table.bbox),
                font_size: None,
                is_bold: false,
                heading_level: None,
                grid: Some(table.rows),
            });
        }

        sort_reading_order(&mut elements);
        Ok(merge_wrapped_lines(elements))
    }

    /// Classify one block of text.
    pub fn classify(&self, text: &str, font_size: f32, is_bold: bool) -> ElementType {
        let trimmed = text.trim();
        if CAPTION_PATTERN.is_match(trimmed) {
            ElementType::Caption
        } else if char_count(trimmed) < HEADING_MAX_CHARS
            && (font_size > self.title_font_threshold || is_bold)
        {
            ElementType::Heading
        } else if SECTION_PATTERN.is_match(trimmed) {
            ElementType::Section
        } else if LIST_ITEM_PATTERN.is_match(trimmed) {
            ElementType::ListItem
        } else {
            ElementType::Paragraph
        }
    }
}

/// Heading level from the ratio of the block size to the page median.
///
/// 2.0x and up is level 1, 1.5x level 2, 1.2x level 3. Anything smaller, including bold text
/// at body size or a page without a usable median, is level 4.
pub fn heading_level(font_size: f32, median: f32) -> u8 {
    if median <= 0.0 {
        return 4;
    }
    let ratio = font_size / median;
    if ratio >= 2.0 {
        1
    } else if ratio >= 1.5 {
        2
    } else if ratio >= 1.2 {
        3
    } else {
        4
    }
}

fn plain_text_elements<P: PageSource + ?Sized>(page: &P) -> Vec<LayoutElement> {
    match page.plain_text() {
        Ok(text) if !text.trim().is_empty() => {
            vec![LayoutElement::plain_paragraph(text.trim())]
        }
        Ok(_) => Vec::new(),
        Err(error) => {
            tracing::warn!(
                page = page.page_number(),
                error = %error,
                "Plain page text unavailable"
            );
            Vec::new()
        }
    }
}

fn group_blocks(chars: &[&PdfChar]) -> Vec<TextBlock> {
    let mut groups: Vec<Vec<&PdfChar>> = Vec::new();
    for &c in chars {
        match groups.last_mut() {
            Some(group)
                if group.last().is_some_and(|last| {
                    (last.top - c.top).abs() < BLOCK_VERTICAL_TOLERANCE
                        && (last.size - c.size).abs() < BLOCK_SIZE_TOLERANCE
                }) =>
            {
                group.push(c)
            }
            _ => groups.push(vec![c]),
        }
    }

    groups
        .into_iter()
        .filter_map(|group| {
            let text = join_chars(group.iter().copied());
            if text.is_empty() {
                return None;
            }
            let visible: Vec<&PdfChar> = group.iter().copied().filter(|c| !c.is_space()).collect();
            let bbox = visible
                .iter()
                .map(|c| BoundingBox {
                    x0: c.x0,
                    top: c.top,
                    x1: c.x1,
                    bottom: c.bottom,
                })
                .reduce(BoundingBox::union)?;
            let bold = visible
                .iter()
                .filter(|c| c.font_name.to_lowercase().contains("bold"))
                .count();
            Some(TextBlock {
                text,
                bbox,
                font_size: mode_size(&visible),
                is_bold: bold * 2 > visible.len(),
            })
        })
        .collect()
}

fn mode_size(chars: &[&PdfChar]) -> f32 {
    let mut counts: HashMap<i32, (usize, f32)> = HashMap::new();
    for c in chars {
        let entry = counts.entry((c.size * 10.0).round() as i32).or_insert((0, c.size));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(key_a, (count_a, _)), (key_b, (count_b, _))| {
            count_a.cmp(count_b).then(key_b.cmp(key_a))
        })
        .map(|(_, (_, size))| size)
        .unwrap_or(0.0)
}

fn sort_reading_order(elements: &mut [LayoutElement]) {
    elements.sort_by(|a, b| {
        let (a_top, a_x) = a.bbox.map(|bbox| (bbox.top, bbox.x0)).unwrap_or_default();
        let (b_top, b_x) = b.bbox.map(|bbox| (bbox.top, bbox.x0)).unwrap_or_default();
        a_top.total_cmp(&b_top).then(a_x.total_cmp(&b_x))
    });
}

/// Join consecutive paragraph lines that share a font size and sit within two line heights.
fn merge_wrapped_lines(elements: Vec<LayoutElement>) -> Vec<LayoutElement> {
    let mut merged: Vec<LayoutElement> = Vec::with_capacity(elements.len());
    for element in elements {
        if let Some(previous) = merged.last_mut()
            && continues_paragraph(previous, &element)
            && let (Some(previous_box), Some(next_box)) = (previous.bbox, element.bbox)
        {
            previous.text.push(' ');
            previous.text.push_str(&element.text);
            previous.bbox = Some(previous_box.union(next_box));
            previous.is_bold = previous.is_bold && element.is_bold;
            continue;
        }
        merged.push(element);
    }
    merged
}

fn continues_paragraph(previous: &LayoutElement, next: &LayoutElement) -> bool {
    if previous.element_type != ElementType::Paragraph || next.element_type != ElementType::Paragraph
    {
        return false;
    }
    let (Some(previous_size), Some(next_size)) = (previous.font_size, next.font_size) else {
        return false;
    };
    let (Some(previous_box), Some(next_box)) = (previous.bbox, next.bbox) else {
        return false;
    };
    let gap = next_box.top - previous_box.bottom;
    (previous_size - next_size).abs() < 0.5 && gap >= -previous_size / 2.0 && gap < 2.0 * previous_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::source::ExtractedTable;
    use crate::pdf::source::tests::glyphs;

    struct SyntheticPage {
        chars: Vec<PdfChar>,
        tables: Vec<ExtractedTable>,
        text: String,
        broken: bool,
    }

    impl SyntheticPage {
        fn new(chars: Vec<PdfChar>) -> Self {
            Self {
                chars,
                tables: Vec::new(),
                text: String::new(),
                broken: false,
            }
        }
    }

    impl PageSource for SyntheticPage {
        fn page_number(&self) -> usize {
            1
        }

        fn chars(&self) -> Result<Vec<PdfChar>, PdfError> {
            if self.broken {
                return Err(PdfError::PlainText("unreadable content stream".into()));
            }
            Ok(self.chars.clone())
        }

        fn tables(&self) -> Result<Vec<ExtractedTable>, PdfError> {
            Ok(self.tables.clone())
        }

        fn plain_text(&self) -> Result<String, PdfError> {
            Ok(self.text.clone())
        }
    }

    #[test]
    fn classification_precedence() {
        let analyzer = LayoutAnalyzer::new();
        assert_eq!(analyzer.classify("Figure 3 Revenue by region", 24.0, true), ElementType::Caption);
        assert_eq!(analyzer.classify("표 1 분기별 매출", 11.0, false), ElementType::Caption);
        assert_eq!(analyzer.classify("Introduction", 24.0, false), ElementType::Heading);
        assert_eq!(analyzer.classify("Summary", 11.0, true), ElementType::Heading);
        assert_eq!(analyzer.classify("1.2 Scope of work", 11.0, false), ElementType::Section);
        assert_eq!(analyzer.classify("제3장 결론", 11.0, false), ElementType::Section);
        assert_eq!(analyzer.classify("Chapter 4 Results", 11.0, false), ElementType::Section);
        assert_eq!(analyzer.classify("• first bullet", 11.0, false), ElementType::ListItem);
        assert_eq!(analyzer.classify("2) second step", 11.0, false), ElementType::ListItem);
        assert_eq!(analyzer.classify("가. 첫째 항목", 11.0, false), ElementType::ListItem);
        assert_eq!(analyzer.classify("Plain body text.", 11.0, false), ElementType::Paragraph);
    }

    #[test]
    fn long_bold_text_is_not_a_heading() {
        let text = "word ".repeat(30);
        assert_eq!(LayoutAnalyzer::new().classify(&text, 11.0, true), ElementType::Paragraph);
    }

    #[test]
    fn heading_levels_follow_median_ratio() {
        assert_eq!(heading_level(24.0, 11.0), 1);
        assert_eq!(heading_level(18.0, 11.0), 2);
        assert_eq!(heading_level(14.0, 11.0), 3);
        assert_eq!(heading_level(13.5, 11.0), 3);
        assert_eq!(heading_level(12.0, 11.0), 4);
        assert_eq!(heading_level(11.0, 11.0), 4);
        assert_eq!(heading_level(14.0, 0.0), 4);
    }

    #[test]
    fn font_statistics() {
        let stats = FontStatistics::from_sizes(&[10.0, 12.0, 20.0, 10.0]).expect("stats");
        assert_eq!(stats.median, 11.0);
        assert_eq!(stats.mean, 13.0);
        assert!(stats.std_dev > 4.0);
        assert!(FontStatistics::from_sizes(&[]).is_none());
    }

    #[test]
    fn builds_heading_and_merged_paragraph_in_reading_order() {
        let mut chars = Vec::new();
        chars.extend(glyphs("Wrapped body line one", 72.0, 140.0, 11.0, "Helvetica"));
        chars.extend(glyphs("wrapped body line two", 72.0, 154.0, 11.0, "Helvetica"));
        chars.extend(glyphs("Introduction", 72.0, 100.0, 24.0, "Helvetica-Bold"));

        let elements = LayoutAnalyzer::new().analyze_page(&SyntheticPage::new(chars));
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].element_type, ElementType::Heading);
        assert_eq!(elements[0].text, "Introduction");
        assert!(elements[0].is_bold);
        assert_eq!(elements[0].heading_level, Some(1));
        assert_eq!(elements[1].element_type, ElementType::Paragraph);
        assert_eq!(elements[1].text, "Wrapped body line one wrapped body line two");
        assert_eq!(elements[1].font_size, Some(11.0));
    }

    #[test]
    fn table_characters_are_not_reused_as_text() {
        let mut chars = glyphs("Q1", 72.0, 300.0, 10.0, "Helvetica");
        chars.extend(glyphs("Body text above the table.", 72.0, 100.0, 10.0, "Helvetica"));
        let mut page = SyntheticPage::new(chars);
        page.tables.push(ExtractedTable {
            rows: vec![
                vec!["Quarter".into(), "Revenue".into()],
                vec!["Q1".into(), "100".into()],
            ],
            bbox: BoundingBox {
                x0: 70.0,
                top: 280.0,
                x1: 300.0,
                bottom: 302.0,
            },
        });

        let elements = LayoutAnalyzer::new().analyze_page(&page);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].element_type, ElementType::Paragraph);
        assert_eq!(elements[1].element_type, ElementType::Table);
        assert_eq!(
            elements[1].text,
            "| Quarter | Revenue |\n| --- | --- |\n| Q1 | 100 |"
        );
        assert_eq!(elements[1].grid.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn failure_falls_back_to_plain_text() {
        let mut page = SyntheticPage::new(Vec::new());
        page.broken = true;
        page.text = "  Whole page text.  ".into();
        let elements = LayoutAnalyzer::new().analyze_page(&page);
        assert_eq!(elements, vec![LayoutElement::plain_paragraph("Whole page text.")]);

        page.text = String::new();
        assert!(LayoutAnalyzer::new().analyze_page(&page).is_empty());
    }
}
