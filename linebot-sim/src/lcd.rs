//! Character LCD emulation.
//!
//! The robot's screen is 16 columns by 8 rows. Text is split on newlines and
//! each line is wrapped at word boundaries; words longer than a row are cut.
//! Rows past the bottom of the screen are dropped.

pub const COLUMNS: usize = 16;
pub const ROWS: usize = 8;

#[derive(Debug, Clone)]
pub struct Lcd {
    columns: usize,
    rows: usize,
    centered: bool,
    lines: Vec<String>,
}

impl Default for Lcd {
    fn default() -> Self {
        Self::new(COLUMNS, ROWS)
    }
}

impl Lcd {
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns: columns.max(1),
            rows,
            centered: false,
            lines: Vec::new(),
        }
    }

    pub fn centered(mut self, centered: bool) -> Self {
        self.centered = centered;
        self
    }

    /// Replace the screen contents.
    pub fn show(&mut self, text: &str) {
        let mut lines = layout(text, self.columns);
        lines.truncate(self.rows);
        if self.centered {
            for line in &mut lines {
                *line = center(line, self.columns);
            }
        }
        self.lines = lines;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn columns(&self) -> usize {
        self.columns
    }
}

/// Split on newlines, then wrap every line to `width` columns.
pub fn layout(text: &str, width: usize) -> Vec<String> {
    text.split('\n').flat_map(|line| wrap(line, width)).collect()
}

/// Wrap one line at spaces. An empty line stays one empty row.
pub fn wrap(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let mut word = word;
        loop {
            let current_len = current.chars().count();
            let word_len = word.chars().count();
            let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
            if needed <= width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                break;
            }
            if !current.is_empty() {
                rows.push(std::mem::take(&mut current));
                continue;
            }
            // a single word wider than the screen
            let split = word.char_indices().nth(width).map_or(word.len(), |(i, _)| i);
            rows.push(word[..split].to_string());
            word = &word[split..];
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() || rows.is_empty() {
        rows.push(current);
    }
    rows
}

pub fn center(line: &str, width: usize) -> String {
    let len = line.chars().count();
    if len >= width {
        return line.to_string();
    }
    let pad = (width - len) / 2;
    format!("{}{}", " ".repeat(pad), line)
}
