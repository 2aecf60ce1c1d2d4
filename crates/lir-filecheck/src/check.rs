//! Matching of collected expectations against captured output.
//!
//! The output stream is a materialized slice of lines with an integer
//! cursor. `CHECK` scans forward from the cursor (inclusive) and moves
//! it just past the first match; `CHECK-NEXT` looks only at the cursor
//! line. Both sides of every comparison go through [`normalize`] first,
//! so trailing comments, terminal colors and surrounding whitespace are
//! never significant.
//!
//! A failed expectation does not move the cursor and does not stop the
//! scan: all failures are collected so a single missing line reports
//! every expectation it broke.

use crate::directive::{CheckKind, CheckLine};

/// One unmatched expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub kind: CheckKind,
    /// Expected text as written in the test file.
    pub expected: String,
    /// The output line at the cursor when the expectation failed, as
    /// captured; `None` means the cursor was past the end of output.
    pub found: Option<String>,
}

impl CheckFailure {
    /// Human-readable one-liner for console and report diagnostics.
    pub fn describe(&self) -> String {
        match &self.found {
            Some(line) => format!(
                "{}: expected `{}`, found `{}`",
                self.kind.as_str(),
                self.expected.trim(),
                line
            ),
            None => format!(
                "{}: expected `{}`, reached end of output",
                self.kind.as_str(),
                self.expected.trim()
            ),
        }
    }
}

/// Match `checks` against `lines`, returning every failure.
///
/// An empty check list trivially passes, whatever the output.
pub fn check_lines(checks: &[CheckLine], lines: &[String]) -> Vec<CheckFailure> {
    let mut failures = Vec::new();
    let mut cursor = 0usize;

    for check in checks {
        let want = normalize(&check.expected);
        let hit = match check.kind {
            CheckKind::Check | CheckKind::CheckErr => lines
                .iter()
                .enumerate()
                .skip(cursor)
                .find(|(_, line)| normalize(line) == want)
                .map(|(i, _)| i),
            CheckKind::CheckNext => lines
                .get(cursor)
                .filter(|line| normalize(line) == want)
                .map(|_| cursor),
        };
        match hit {
            Some(i) => cursor = i + 1,
            None => failures.push(CheckFailure {
                kind: check.kind,
                expected: check.expected.clone(),
                found: lines.get(cursor).cloned(),
            }),
        }
    }

    failures
}

/// Canonicalize a line for comparison: strip ANSI CSI escape sequences,
/// truncate at the first unescaped `;`, trim surrounding whitespace.
///
/// ANSI goes first: a multi-parameter sequence like `ESC[1;31m` carries
/// a `;` that must not read as a comment start. The combination is
/// idempotent, which matching relies on since expectations and output
/// lines both pass through here.
pub fn normalize(line: &str) -> String {
    truncate_comment(&strip_ansi(line)).trim().to_string()
}

/// Cut off everything from the first `;` not preceded by a backslash.
/// Escaped markers stay escaped; unescaping would let a second pass see
/// a fresh comment start.
fn truncate_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b';' && (i == 0 || bytes[i - 1] != b'\\') {
            return &line[..i];
        }
    }
    line
}

/// Remove CSI escape sequences: `ESC [`, parameter bytes, then a final
/// byte in `0x40..=0x7e`. An unterminated sequence swallows the rest of
/// the line; an ESC not followed by `[` is dropped on its own.
fn strip_ansi(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('\u{40}'..='\u{7e}').contains(&c) {
                    break;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::parse;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn checks(src: &str) -> Vec<CheckLine> {
        parse(src).checks
    }

    #[test]
    fn normalize_truncates_comments() {
        assert_eq!(normalize("foo ; bar"), "foo");
        assert_eq!(normalize("; all comment"), "");
        assert_eq!(normalize("foo \\; kept ; cut"), "foo \\; kept");
        assert_eq!(normalize("plain"), "plain");
    }

    #[test]
    fn normalize_strips_ansi() {
        assert_eq!(normalize("\u{1b}[1m\u{1b}[32mok\u{1b}[0m"), "ok");
        assert_eq!(normalize("a \u{1b}[1;31mb\u{1b}[0m c"), "a b c");
        // Unterminated sequence swallows the rest of the line.
        assert_eq!(normalize("ok\u{1b}[3"), "ok");
        // Lone ESC is dropped, the next character survives.
        assert_eq!(normalize("a\u{1b}b"), "ab");
    }

    #[test]
    fn normalize_trims_last() {
        // Trimming before the ANSI strip would leave this trailing
        // space behind.
        assert_eq!(normalize("  foo \u{1b}[0m  "), "foo");
    }

    #[test]
    fn colored_diagnostics_match_plain_expectations() {
        // `ESC[1;31m` contains a `;`; cutting there would truncate the
        // whole line away instead of just removing the color.
        let cs = checks("; CHECK-ERR: error: duplicate unit @f\n");
        let colored = lines(&["\u{1b}[1;31merror: duplicate unit @f\u{1b}[0m"]);
        assert!(check_lines(&cs, &colored).is_empty());
    }

    #[test]
    fn normalize_is_idempotent() {
        let nasty = [
            "foo ; bar",
            "foo \\; kept ; cut",
            "\u{1b}[1m\u{1b}[32mok\u{1b}[0m",
            "a \u{1b}[1;31mb\u{1b}[0m c",
            "  foo \u{1b}[0m  ",
            "a\u{1b}[1;2m;b",
            "ok\u{1b}[",
            "a\u{1b}b",
            "   spaced   ",
            "",
            "\\;only",
        ];
        for raw in nasty {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn ordered_checks_match_at_nondecreasing_positions() {
        let cs = checks("; CHECK: a\n; CHECK: c\n");
        assert!(check_lines(&cs, &lines(&["a", "b", "c"])).is_empty());
        // Out of order fails the second expectation.
        let cs = checks("; CHECK: c\n; CHECK: a\n");
        let fails = check_lines(&cs, &lines(&["a", "b", "c"]));
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].expected, " a");
        assert_eq!(fails[0].found, None);
    }

    #[test]
    fn duplicate_check_needs_two_occurrences() {
        let cs = checks("; CHECK: a\n; CHECK: a\n");
        assert!(check_lines(&cs, &lines(&["a", "x", "a"])).is_empty());
        let fails = check_lines(&cs, &lines(&["a"]));
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].kind, CheckKind::Check);
        assert_eq!(fails[0].found, None);
    }

    #[test]
    fn check_next_requires_adjacency() {
        let cs = checks("; CHECK: a\n; CHECK-NEXT: b\n");
        assert!(check_lines(&cs, &lines(&["a", "b"])).is_empty());

        let fails = check_lines(&cs, &lines(&["a", "x", "b"]));
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].kind, CheckKind::CheckNext);
        assert_eq!(fails[0].found.as_deref(), Some("x"));
    }

    #[test]
    fn check_next_at_end_of_output() {
        let cs = checks("; CHECK: a\n; CHECK-NEXT: b\n");
        let fails = check_lines(&cs, &lines(&["a"]));
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].found, None);
        assert!(fails[0].describe().contains("end of output"));
    }

    #[test]
    fn failed_check_leaves_cursor_for_later_directives() {
        let cs = checks("; CHECK: missing\n; CHECK: b\n");
        let fails = check_lines(&cs, &lines(&["a", "b"]));
        // The first expectation fails but the second still matches from
        // the unmoved cursor.
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].expected, " missing");
        assert_eq!(fails[0].found.as_deref(), Some("a"));
    }

    #[test]
    fn check_err_matches_like_check() {
        let cs = checks("; CHECK-ERR: boom\n");
        assert!(check_lines(&cs, &lines(&["noise", "boom"])).is_empty());
        let fails = check_lines(&cs, &lines(&["noise"]));
        assert_eq!(fails[0].kind, CheckKind::CheckErr);
    }

    #[test]
    fn output_lines_are_normalized_too() {
        let cs = checks("; CHECK: proc @p () ()\n");
        let out = lines(&["  \u{1b}[1mproc @p () ()\u{1b}[0m ; emitted\t"]);
        assert!(check_lines(&cs, &out).is_empty());
    }

    #[test]
    fn empty_checks_pass_and_empty_output_fails_checks() {
        assert!(check_lines(&[], &lines(&["whatever"])).is_empty());
        let cs = checks("; CHECK: a\n; CHECK-NEXT: b\n");
        let fails = check_lines(&cs, &[]);
        assert_eq!(fails.len(), 2);
        assert!(fails.iter().all(|f| f.found.is_none()));
    }

    #[test]
    fn every_failure_is_collected() {
        let cs = checks("; CHECK: one\n; CHECK: two\n; CHECK: three\n");
        let fails = check_lines(&cs, &lines(&["zero"]));
        assert_eq!(fails.len(), 3);
    }
}
