//! Bullet-level grouping of text-frame paragraphs.

use super::package::Paragraph;

/// A top-level bullet together with its nested children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletGroup {
    lines: Vec<Paragraph>,
}

impl BulletGroup {
    /// Lines of the group in document order.
    pub fn lines(&self) -> &[Paragraph] {
        &self.lines
    }

    /// Flattened text, each line indented by two spaces per level.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{}{}", "  ".repeat(line.level as usize), line.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Shallowest level in the group.
    pub fn min_level(&self) -> u32 {
        self.lines.iter().map(|line| line.level).min().unwrap_or(0)
    }
}

/// Group paragraphs so that each level-0 paragraph opens a new group.
///
/// Blank paragraphs are skipped and do not split groups.
pub fn group_bullets(paragraphs: &[Paragraph]) -> Vec<BulletGroup> {
    let mut groups = Vec::new();
    let mut buffer: Vec<Paragraph> = Vec::new();
    for paragraph in paragraphs {
        if paragraph.text.trim().is_empty() {
            continue;
        }
        if paragraph.level == 0 && !buffer.is_empty() {
            groups.push(BulletGroup {
                lines: std::mem::take(&mut buffer),
            });
        }
        buffer.push(paragraph.clone());
    }
    if !buffer.is_empty() {
        groups.push(BulletGroup { lines: buffer });
    }
    groups
}
