use crate::span::SourceMap;

use super::Diagnostic;

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    /// `error[CODE]: message`, the primary label under its source line,
    /// then secondary labels, notes and the suggestion.
    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        let heading = match d.code {
            Some(code) => format!("error[{code}]"),
            None => "error".to_string(),
        };
        out.push_str(&format!("{}: {}\n", self.bold_red(&heading), self.bold(&d.message)));

        let primary = d.labels.iter().find(|l| l.is_primary);
        if let (Some(label), Some(source)) = (primary, &d.source) {
            let map = SourceMap::new(source);
            let (line, col) = map.lookup(label.span.start);
            let line_text = map.line(line);

            out.push_str(&format!("  {} {}:{}\n", self.cyan("-->"), line, col));

            let gutter = line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);

            out.push_str(&format!("{pad} {pipe}\n"));
            let line_num = self.cyan(&format!("{line:>gutter$}"));
            out.push_str(&format!("{line_num} {pipe} {line_text}\n"));

            // carets stop at the end of the line for spans that run past it
            let indent = col.saturating_sub(1);
            let room = line_text.chars().count().saturating_sub(indent).max(1);
            let carets = self.bold_red(&"^".repeat(label.span.len().clamp(1, room)));
            let indent = " ".repeat(indent);
            if label.message.is_empty() {
                out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
            } else {
                out.push_str(&format!("{pad} {pipe} {indent}{carets} {}\n", self.bold_red(&label.message)));
            }
            out.push_str(&format!("{pad} {pipe}\n"));
        }

        for label in d.labels.iter().filter(|l| !l.is_primary) {
            if label.message.is_empty() {
                continue;
            }
            match &d.source {
                Some(source) => {
                    let (line, col) = SourceMap::new(source).lookup(label.span.start);
                    out.push_str(&format!("  {} {} at {line}:{col}\n", self.dim("="), label.message));
                }
                None => out.push_str(&format!("  {} {}\n", self.dim("="), label.message)),
            }
        }
        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} help: {}\n", self.dim("="), suggestion));
        }
        if let Some(code) = d.code {
            out.push_str(&format!("  {} run `lunette --explain {code}` for details\n", self.dim("=")));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn make_diag(source: &str, start: usize, end: usize) -> Diagnostic {
        Diagnostic::error("attempt to call a nil value")
            .with_code("LUN-R002")
            .with_span(Span::new(start, end), "here")
            .with_source(source.to_string())
            .with_note("at instruction 2 (CALL 0 1)")
            .with_suggestion("check the name")
    }

    fn plain(d: &Diagnostic) -> String {
        AnsiRenderer { use_color: false }.render(d)
    }

    #[test]
    fn heading_carries_code() {
        let out = plain(&make_diag("nosuch(1)", 0, 6));
        assert!(out.starts_with("error[LUN-R002]: attempt to call a nil value\n"), "got:\n{out}");
        assert!(out.contains("--explain LUN-R002"));
    }

    #[test]
    fn heading_without_code() {
        let out = plain(&Diagnostic::error("something bad"));
        assert!(out.starts_with("error: something bad"));
        assert!(!out.contains("-->"));
        assert!(!out.contains("--explain"));
    }

    #[test]
    fn snippet_points_at_span() {
        let out = plain(&make_diag("x = 1\nnosuch(x)", 6, 12));
        assert!(out.contains("--> 2:1"), "got:\n{out}");
        assert!(out.contains("2 | nosuch(x)"), "got:\n{out}");
        assert!(out.contains("  | ^^^^^^ here"), "got:\n{out}");
    }

    #[test]
    fn notes_and_help() {
        let out = plain(&make_diag("nosuch(1)", 0, 6));
        assert!(out.contains("note: at instruction 2 (CALL 0 1)"));
        assert!(out.contains("help: check the name"));
    }

    #[test]
    fn empty_span_still_gets_one_caret() {
        let d = Diagnostic::error("expected expression, found end of input")
            .with_span(Span::at(7), "")
            .with_source("x = 1 +".to_string());
        let out = plain(&d);
        assert!(out.contains("|        ^\n"), "got:\n{out}");
    }

    #[test]
    fn unclosed_block_points_back_at_opener() {
        let source = "x = 1\nwhile x do\n  print(x)\n";
        let err = crate::compile(source).unwrap_err();
        let out = plain(&Diagnostic::from(&err).with_source(source));
        assert!(out.contains("error[LUN-S002]"), "got:\n{out}");
        assert!(out.contains("= block opened here at 2:1"), "got:\n{out}");
    }

    #[test]
    fn carets_count_characters() {
        let d = Diagnostic::error("bad")
            .with_span(Span::new(0, 20), "")
            .with_source("é = 1".to_string());
        let out = plain(&d);
        assert!(out.contains("| ^^^^^\n"), "got:\n{out}");
    }

    #[test]
    fn color_toggles_escape_codes() {
        let d = make_diag("nosuch(1)", 0, 6);
        assert!(AnsiRenderer { use_color: true }.render(&d).contains("\x1b["));
        assert!(!plain(&d).contains("\x1b["));
    }
}
