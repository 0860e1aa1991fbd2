//! Multi-granularity decomposition of slide tables.
//!
//! One table yields, in order: the whole table as Markdown, one chunk per row, one chunk per
//! labelled column and one key/value chunk per data row that names an `항목 N` item. Every
//! granularity shares the same `table_id` and domain label.

use std::sync::LazyLock;

use regex::Regex;

use crate::chunking::{clean_cell, render_markdown_table};
use crate::model::{PptxChunk, PptxChunkMetadata, PptxChunkType, TableCellInfo};

static ITEM_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"항목\s*(\d+)").expect("valid item regex"));

const DATA_TYPE_KEYWORDS: [(&str, &[&str]); 4] = [
    ("budget", &["예산", "비용", "budget", "cost", "지출"]),
    ("sales", &["매출", "판매", "sales", "revenue", "수익"]),
    ("performance", &["실적", "성과", "달성", "performance", "kpi"]),
    ("schedule", &["일정", "기간", "날짜", "schedule", "date", "마감"]),
];

/// Domain label for a table, from keywords in its header row.
pub fn detect_table_data_type(header: &[String]) -> &'static str {
    let header = header.join(" ").to_lowercase();
    DATA_TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| header.contains(keyword)))
        .map(|(label, _)| *label)
        .unwrap_or("general")
}

/// Spreadsheet column letters for a 0-based index: 0 → `A`, 26 → `AA`.
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Decompose a cell grid into full, row, column and key/value chunks.
///
/// `base` carries the slide-level metadata (parent, title, slide number); table fields are
/// filled in per granularity.
pub fn decompose_table(
    rows: &[Vec<String>],
    table_id: &str,
    base: &PptxChunkMetadata,
) -> Vec<PptxChunk> {
    let grid: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| clean_cell(cell)).collect())
        .collect();
    let Some(header) = grid.first() else {
        return Vec::new();
    };
    let row_count = grid.len();
    let col_count = grid.iter().map(Vec::len).max().unwrap_or(0);
    let data_type = detect_table_data_type(header);
    let last_column = column_letter(col_count.saturating_sub(1));

    let info = TableCellInfo {
        table_id: table_id.to_string(),
        table_title: base.slide_title.clone(),
        header_row: header.clone(),
        data_type: data_type.to_string(),
        row_count,
        col_count,
        ..TableCellInfo::default()
    };
    let build = |content: String, kind: PptxChunkType, table: TableCellInfo| {
        let mut metadata = base.clone();
        metadata.shape_type = Some("table".to_string());
        metadata.table = Some(table);
        PptxChunk::new(content, kind, metadata)
    };

    let mut chunks = Vec::new();

    let markdown = render_markdown_table(&grid);
    if !markdown.is_empty() {
        let content = match base.slide_title.as_deref() {
            Some(title) => format!("{title}\n\n{markdown}"),
            None => markdown,
        };
        chunks.push(build(
            content,
            PptxChunkType::TableFull,
            TableCellInfo {
                cell_reference: Some(format!("A1:{last_column}{row_count}")),
                ..info.clone()
            },
        ));
    }

    for (row_index, row) in grid.iter().enumerate() {
        if row.iter().all(String::is_empty) {
            continue;
        }
        let content = if row_index == 0 {
            format!("헤더: {}", row.join(" | "))
        } else {
            labelled_cells(header, row).join(" | ")
        };
        chunks.push(build(
            content,
            PptxChunkType::TableRow,
            TableCellInfo {
                row_index: Some(row_index),
                cell_reference: Some(format!(
                    "A{n}:{last_column}{n}",
                    n = row_index + 1
                )),
                is_header_row: row_index == 0,
                ..info.clone()
            },
        ));
    }

    for (col_index, label) in header.iter().enumerate() {
        if label.is_empty() {
            continue;
        }
        let values: Vec<&str> = grid
            .iter()
            .skip(1)
            .filter_map(|row| row.get(col_index))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }
        let letter = column_letter(col_index);
        chunks.push(build(
            format!("{label}: {}", values.join(", ")),
            PptxChunkType::TableColumn,
            TableCellInfo {
                col_index: Some(col_index),
                cell_reference: Some(format!("{letter}1:{letter}{row_count}")),
                ..info.clone()
            },
        ));
    }

    for (row_index, row) in grid.iter().enumerate().skip(1) {
        let Some(item_number) = row.iter().find_map(|cell| {
            ITEM_NUMBER
                .captures(cell)
                .and_then(|captures| captures[1].parse::<u32>().ok())
        }) else {
            continue;
        };
        chunks.push(build(
            labelled_cells(header, row).join("\n"),
            PptxChunkType::TableKeyValue,
            TableCellInfo {
                row_index: Some(row_index),
                cell_reference: Some(format!(
                    "A{n}:{last_column}{n}",
                    n = row_index + 1
                )),
                item_number: Some(item_number),
                ..info.clone()
            },
        ));
    }

    tracing::debug!(
        table_id,
        rows = row_count,
        cols = col_count,
        data_type,
        chunks = chunks.len(),
        "Decomposed table"
    );
    chunks
}

/// `header: value` pairs for a data row; unlabelled cells fall back to `열 N`.
fn labelled_cells(header: &[String], row: &[String]) -> Vec<String> {
    row.iter()
        .enumerate()
        .filter(|(_, value)| !value.is_empty())
        .map(|(index, value)| match header.get(index).filter(|label| !label.is_empty()) {
            Some(label) => format!("{label}: {value}"),
            None => format!("열 {}: {value}", index + 1),
        })
        .collect()
}
