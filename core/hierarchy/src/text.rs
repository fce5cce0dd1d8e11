use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::render::DisplayNode;

/// How much of the tree a text rendering shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutlineStyle {
    /// Every row, fully expanded
    #[default]
    Full,
    /// Only what a tree widget shows on first paint: top-level rows, plus the
    /// children of rows carrying an expand hint
    Initial,
}

/// Text renderer for the tag tree, one row per line: `label  count`.
pub struct TreeTextRenderer {
    indent: usize,
    style: OutlineStyle,
}

impl Default for TreeTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeTextRenderer {
    pub fn new() -> Self {
        Self {
            indent: 2,
            style: OutlineStyle::Full,
        }
    }

    pub fn with_style(mut self, style: OutlineStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    pub fn render(&self, rows: &[DisplayNode]) -> String {
        let mut lines = Vec::new();
        for row in rows {
            self.render_row(row, 0, &mut lines);
        }
        lines.join("\n")
    }

    fn render_row(&self, row: &DisplayNode, depth: usize, lines: &mut Vec<String>) {
        let folded = self.style == OutlineStyle::Initial
            && !row.children.is_empty()
            && !row.expand_hint;
        let marker = if row.children.is_empty() {
            " "
        } else if folded {
            "+"
        } else {
            "-"
        };

        lines.push(format!(
            "{:width$}{} {}  {}",
            "",
            marker,
            row.display_label,
            row.count,
            width = depth * self.indent
        ));

        if folded {
            return;
        }
        for child in &row.children {
            self.render_row(child, depth + 1, lines);
        }
    }
}

/// Human-readable time since `then`, using the two most significant calendar
/// units: `1y`, `1y4mo`, `3mo25d`, `4m50s`, `5s`.
///
/// Units are compared field by field on the calendar, so a borrow from the
/// next unit uses fixed widths of 12 months, 30 days, 24 hours and 60
/// minutes/seconds.
pub fn format_elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const UNITS: [&str; 6] = ["y", "mo", "d", "h", "m", "s"];
    const SPANS: [i64; 5] = [12, 30, 24, 60, 60];

    let earlier = calendar_fields(&then);
    let mut later = calendar_fields(&now);

    for i in 0..SPANS.len() {
        let (major, minor) = (later[i] - earlier[i], later[i + 1] - earlier[i + 1]);
        if major > 1 || (major == 1 && minor >= 0) {
            return if minor < 0 {
                format!("{}{}{}{}", major - 1, UNITS[i], minor + SPANS[i], UNITS[i + 1])
            } else if minor == 0 {
                format!("{}{}", major, UNITS[i])
            } else {
                format!("{}{}{}{}", major, UNITS[i], minor, UNITS[i + 1])
            };
        }
        if major > 0 {
            later[i + 1] += SPANS[i];
        }
    }

    format!("{}s", later[5] - earlier[5])
}

fn calendar_fields(dt: &DateTime<Utc>) -> [i64; 6] {
    [
        dt.year() as i64,
        dt.month() as i64,
        dt.day() as i64,
        dt.hour() as i64,
        dt.minute() as i64,
        dt.second() as i64,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::render::{render, RenderOptions};
    use chrono::TimeZone;
    use labeled_files_schemas::TagOccurrence;

    fn ymd_hms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn sample_rows() -> Vec<DisplayNode> {
        let t = ymd_hms(2024, 1, 1, 0, 0, 0);
        let root = aggregate(&[
            TagOccurrence::new("work/report", 3, t),
            TagOccurrence::new("work/mail", 1, t),
            TagOccurrence::new("home/garden/beds", 2, t),
        ]);
        render(&root, &RenderOptions::with_threshold(1))
    }

    #[test]
    fn test_full_outline() {
        let text = TreeTextRenderer::new().render(&sample_rows());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "- work  4",
                "    report  3",
                "    mail  1",
                "  home/garden/beds  2",
            ]
        );
    }

    #[test]
    fn test_custom_indent() {
        let text = TreeTextRenderer::new().with_indent(4).render(&sample_rows());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "- work  4");
        assert_eq!(lines[1], "      report  3");
        assert_eq!(lines[3], "  home/garden/beds  2");
    }

    #[test]
    fn test_initial_outline_folds_rows_without_hint() {
        let text = TreeTextRenderer::new()
            .with_style(OutlineStyle::Initial)
            .render(&sample_rows());
        assert_eq!(text, "+ work  4\n  home/garden/beds  2");
    }

    #[test]
    fn test_elapsed_labels() {
        let base = ymd_hms(2020, 6, 15, 12, 30, 30);

        assert_eq!(format_elapsed(ymd_hms(2019, 6, 15, 12, 30, 30), base), "1y");
        assert_eq!(format_elapsed(ymd_hms(2019, 2, 15, 12, 30, 30), base), "1y4mo");
        assert_eq!(format_elapsed(ymd_hms(2019, 8, 15, 12, 30, 30), base), "10mo");
        assert_eq!(format_elapsed(ymd_hms(2020, 2, 15, 12, 30, 30), base), "4mo");
        assert_eq!(format_elapsed(ymd_hms(2020, 2, 20, 12, 30, 30), base), "3mo25d");
        assert_eq!(format_elapsed(ymd_hms(2020, 6, 15, 12, 25, 30), base), "5m");
        assert_eq!(format_elapsed(ymd_hms(2020, 6, 15, 12, 25, 40), base), "4m50s");
        assert_eq!(format_elapsed(ymd_hms(2020, 6, 15, 12, 30, 25), base), "5s");
    }
}
