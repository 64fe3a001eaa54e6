//! Page geometry and plain-text line layout for the rendered PDF.
//!
//! Text is set in Courier, whose glyphs are all 0.6em wide, so a line's width is
//! just its character count times the advance. Markup is not interpreted: LaTeX
//! commands are laid out as literal text.

use serde::{Deserialize, Serialize};

/// Courier advance width in em units, identical for every glyph.
pub const COURIER_ADVANCE_EM: f32 = 0.6;
const TAB_WIDTH: usize = 4;

/// Layout parameters for one rendered page. All lengths in PDF points (1/72 in).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    pub width_pt: f32,
    pub height_pt: f32,
    pub margin_pt: f32,
    pub font_size_pt: f32,
    /// Baseline-to-baseline distance.
    pub leading_pt: f32,
}

/// A4 portrait, 10mm margins, Courier 10pt on 12pt leading.
pub fn default_page_config() -> PageConfig {
    PageConfig {
        width_pt: 595.0,
        height_pt: 842.0,
        margin_pt: 28.35,
        font_size_pt: 10.0,
        leading_pt: 12.0,
    }
}

impl PageConfig {
    /// Characters that fit between the left and right margins. Never zero.
    pub fn chars_per_line(&self) -> usize {
        let usable = self.width_pt - 2.0 * self.margin_pt;
        let advance = self.font_size_pt * COURIER_ADVANCE_EM;
        ((usable / advance).floor() as usize).max(1)
    }

    /// Lines that fit between the top and bottom margins. Never zero.
    pub fn lines_per_page(&self) -> usize {
        let usable = self.height_pt - 2.0 * self.margin_pt;
        ((usable / self.leading_pt).floor() as usize).max(1)
    }

    /// Baseline of the first line on a page.
    pub fn first_baseline_pt(&self) -> f32 {
        self.height_pt - self.margin_pt - self.font_size_pt
    }
}

/// Greedy word-wraps `text` to `width` characters.
///
/// Source line breaks are kept (blank lines included). Words longer than the line
/// are hard-split, so no character is ever dropped.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for source_line in text.replace("\r\n", "\n").split('\n') {
        let expanded = source_line.replace('\t', &" ".repeat(TAB_WIDTH));
        let indent: String = expanded.chars().take_while(|c| *c == ' ').collect();
        // Keep indentation only while it leaves room for text.
        let indent = if indent.chars().count() < width / 2 {
            indent
        } else {
            String::new()
        };

        let words: Vec<&str> = expanded.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = indent.clone();
        let mut current_len = indent.chars().count();
        let mut first_on_line = true;

        for word in words {
            let mut chunk: Vec<char> = word.chars().collect();
            loop {
                let space = if first_on_line { 0 } else { 1 };
                if current_len + space + chunk.len() <= width {
                    if !first_on_line {
                        current.push(' ');
                    }
                    current.extend(chunk.iter());
                    current_len += space + chunk.len();
                    first_on_line = false;
                    break;
                }
                if !first_on_line {
                    // Current line is full: flush it and retry the word on a new line.
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                    first_on_line = true;
                    continue;
                }
                // Word alone is wider than the line: hard-split it.
                let room = width.saturating_sub(current_len).max(1);
                let head: String = chunk.iter().take(room).collect();
                current.push_str(&head);
                lines.push(std::mem::take(&mut current));
                chunk.drain(..room.min(chunk.len()));
                current_len = 0;
                if chunk.is_empty() {
                    break;
                }
            }
        }
        if !first_on_line || !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Splits laid-out lines into pages of `lines_per_page`. Always at least one page.
pub fn paginate(lines: Vec<String>, lines_per_page: usize) -> Vec<Vec<String>> {
    if lines.is_empty() {
        return vec![Vec::new()];
    }
    lines
        .chunks(lines_per_page.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}
