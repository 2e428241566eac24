use std::path::PathBuf;

use colored::Colorize;

pub mod ast;
pub mod intern;

/// Byte range into a [`SourceFile`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn in_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        self.contents
            .get(span.start..span.end.min(self.contents.len()))
            .unwrap_or_default()
    }

    /// 1-based line number of a byte offset
    pub fn row_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());

        self.contents.as_bytes()[..position]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1
    }

    /// 1-based column of a byte offset
    pub fn column_for_position(&self, position: usize) -> usize {
        position.min(self.contents.len()) - self.line_start(position) + 1
    }

    pub fn format_span_position(&self, span: Span) -> String {
        format!(
            "{}:{}:{}",
            self.origin,
            self.row_for_position(span.start),
            self.column_for_position(span.start)
        )
    }

    /// Renders the line containing the start of `span` with the spanned
    /// portion underlined by carets
    pub fn highlight_span(&self, span: Span) -> String {
        let start = self.line_start(span.start);
        let end = self.contents[start..]
            .find('\n')
            .map(|offset| start + offset)
            .unwrap_or(self.contents.len());

        let line = &self.contents[start..end];
        let row = self.row_for_position(span.start).to_string();
        let gutter = " ".repeat(row.len());

        let caret_start = span.start.clamp(start, end) - start;
        let caret_end = span.end.clamp(start, end) - start;
        let carets = "^".repeat((caret_end - caret_start).max(1));

        format!(
            "{gutter} {}\n{} {} {line}\n{gutter} {} {}{}",
            "|".blue(),
            row.blue(),
            "|".blue(),
            "|".blue(),
            " ".repeat(caret_start),
            carets.red(),
        )
    }

    fn line_start(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());

        self.contents[..position]
            .rfind('\n')
            .map(|newline| newline + 1)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let source = SourceFile::in_memory("let x = 1 in\nx + y");
        let y = source.contents.find('y').unwrap();

        assert_eq!(source.row_for_position(y), 2);
        assert_eq!(source.column_for_position(y), 5);
        assert_eq!(source.format_span_position(Span::new(y, y + 1)), "<memory>:2:5");
        assert_eq!(source.value_of_span(Span::new(y, y + 1)), "y");
    }

    #[test]
    fn highlight_underlines_the_span() {
        let source = SourceFile::in_memory("a\nlet x = oops in x");
        let start = source.contents.find("oops").unwrap();

        let rendered = source.highlight_span(Span::new(start, start + 4));
        let plain = strip_ansi_escapes::strip_str(rendered);

        assert_eq!(plain, "  |\n2 | let x = oops in x\n  |         ^^^^");
    }
}
