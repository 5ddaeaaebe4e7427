use std::borrow::Cow;
use std::fmt::Write as _;

use crate::model::{Alignment, ColumnType};

/// How one rendered column aligns its header and its cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    pub head: Alignment,
    pub body: Alignment,
}

impl ColumnLayout {
    pub fn both(alignment: Alignment) -> Self {
        Self {
            head: alignment,
            body: alignment,
        }
    }
}

impl From<&ColumnType> for ColumnLayout {
    fn from(column_type: &ColumnType) -> Self {
        Self {
            head: column_type.align_head,
            body: column_type.align_body,
        }
    }
}

/// Renders rows as a plain-text grid. Columns without a layout align left.
pub fn render_table(headers: &[String], rows: &[Vec<String>], layouts: &[ColumnLayout]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell)));
        }
    }

    for width in &mut widths {
        *width = (*width).max(1);
    }

    let layout = |idx: usize| layouts.get(idx).copied().unwrap_or_default();
    let mut output = String::new();

    let header_line = format_row(headers, &widths, |idx| layout(idx).head);
    let _ = writeln!(output, "{header_line}");

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator_cells = separator_widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>();
    let separator_line = format_row(&separator_cells, &separator_widths, |_| Alignment::Left);
    let _ = writeln!(output, "{separator_line}");

    for row in rows {
        let row_line = format_row(row, &widths, |idx| layout(idx).body);
        let _ = writeln!(output, "{row_line}");
    }

    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>], layouts: &[ColumnLayout]) {
    let rendered = render_table(headers, rows, layouts);
    print!("{rendered}");
}

fn format_row<F>(values: &[String], widths: &[usize], alignment: F) -> String
where
    F: Fn(usize) -> Alignment,
{
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        let Some(width) = widths.get(idx).copied() else {
            break;
        };
        let sanitized = sanitize_cell(value);
        let padding = width.saturating_sub(display_width(sanitized.as_ref()));
        let (left, right) = match alignment(idx) {
            Alignment::Left => (0, padding),
            Alignment::Right => (padding, 0),
            Alignment::Center => (padding / 2, padding - padding / 2),
        };
        cells.push(format!(
            "{}{}{}",
            " ".repeat(left),
            sanitized,
            " ".repeat(right)
        ));
    }
    let mut line = cells.join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| match ch {
                    '\n' | '\r' | '\t' => ' ',
                    other => other,
                })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}
