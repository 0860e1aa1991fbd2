//! Linear renderings of a 2-D cell grid.

/// Render a grid as a pipe-delimited Markdown table.
///
/// Row 0 is the header; a `---` separator row follows it. Short rows are padded to the widest
/// row. Returns an empty string when the grid holds no non-blank cell.
pub fn render_markdown_table(grid: &[Vec<String>]) -> String {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 || grid.iter().flatten().all(|cell| cell.trim().is_empty()) {
        return String::new();
    }

    let mut lines = Vec::with_capacity(grid.len() + 1);
    for (index, row) in grid.iter().enumerate() {
        lines.push(markdown_row(row, width));
        if index == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    lines.join("\n")
}

fn markdown_row(row: &[String], width: usize) -> String {
    let mut line = String::from("|");
    for column in 0..width {
        let cell = row.get(column).map(|cell| clean_cell(cell)).unwrap_or_default();
        line.push(' ');
        line.push_str(&cell);
        line.push_str(" |");
    }
    line
}

/// Render a grid as `표 헤더: ...` followed by one `행 N: ...` line per body row.
pub fn render_table_text(grid: &[Vec<String>]) -> String {
    grid.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let cells: Vec<String> = row.iter().map(|cell| clean_cell(cell)).collect();
            if cells.iter().all(String::is_empty) {
                return None;
            }
            let joined = cells.join(" | ");
            Some(if index == 0 {
                format!("표 헤더: {joined}")
            } else {
                format!("행 {index}: {joined}")
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn clean_cell(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn markdown_has_header_separator_and_padding() {
        let table = grid(&[&["분기", "매출"], &["Q1", "100"], &["Q2"]]);
        assert_eq!(
            render_markdown_table(&table),
            "| 분기 | 매출 |\n| --- | --- |\n| Q1 | 100 |\n| Q2 |  |"
        );
    }

    #[test]
    fn blank_grid_renders_nothing() {
        assert!(render_markdown_table(&[]).is_empty());
        assert!(render_markdown_table(&grid(&[&["", " "]])).is_empty());
    }

    #[test]
    fn text_form_labels_header_and_rows() {
        let table = grid(&[&["월", "매출"], &["1월", "10\n억"]]);
        assert_eq!(render_table_text(&table), "표 헤더: 월 | 매출\n행 1: 1월 | 10 억");
    }
}
