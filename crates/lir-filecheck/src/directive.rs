//! Extraction of `;`-comment directives from test files.
//!
//! A directive is a comment line whose first word is one of the known
//! markers:
//!
//! ```text
//! ; RUN: lir-check %s
//! ; CHECK: entity @top () () {
//! ; CHECK-NEXT: }
//! ; CHECK-ERR: unknown unit @bogus
//! ; IGNORE
//! ; FAIL
//! ```
//!
//! `RUN:` names the command to execute for the file (the first one
//! wins), the `CHECK` family describes the expected output in file
//! order, and the bare markers flag the file as a whole. Every other
//! comment line is ignored, as is anything outside a comment.

/// Matching discipline of one expectation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Scan forward from the cursor for a matching line.
    Check,
    /// The line at the cursor itself must match.
    CheckNext,
    /// Same matching as [`CheckKind::Check`]; kept distinct so failure
    /// reports show the marker the test author wrote.
    CheckErr,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Check => "CHECK",
            CheckKind::CheckNext => "CHECK-NEXT",
            CheckKind::CheckErr => "CHECK-ERR",
        }
    }
}

/// One expectation, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLine {
    pub kind: CheckKind,
    /// Text after the marker with trailing whitespace removed. Matching
    /// normalizes both sides, so leading whitespace kept here is
    /// harmless and lets diagnostics echo the line as written.
    pub expected: String,
}

/// Everything the directive scan extracts from one test file.
#[derive(Debug, Clone, Default)]
pub struct Directives {
    /// First `RUN:` line shell-split into words; `Err` carries the
    /// diagnostic for a payload that could not be split.
    pub run: Option<Result<Vec<String>, String>>,
    /// File carries a bare `; IGNORE` marker.
    pub ignore: bool,
    /// File carries a bare `; FAIL` marker: the command is expected to
    /// exit non-zero.
    pub should_fail: bool,
    pub checks: Vec<CheckLine>,
}

#[derive(Debug, Clone, Copy)]
enum Marker {
    Run,
    Check(CheckKind),
    Ignore,
    Fail,
}

/// Longest marker first so `CHECK-NEXT:` is never read as `CHECK:` with
/// a stray payload. The bare markers are boundary-checked in
/// [`marker_of`].
const MARKERS: &[(&str, Marker)] = &[
    ("CHECK-NEXT:", Marker::Check(CheckKind::CheckNext)),
    ("CHECK-ERR:", Marker::Check(CheckKind::CheckErr)),
    ("CHECK:", Marker::Check(CheckKind::Check)),
    ("RUN:", Marker::Run),
    ("IGNORE", Marker::Ignore),
    ("FAIL", Marker::Fail),
];

/// Scan a whole test file for directives.
pub fn parse(text: &str) -> Directives {
    let mut out = Directives::default();
    for line in text.lines() {
        let Some((marker, rest)) = marker_of(line) else {
            continue;
        };
        match marker {
            Marker::Run => {
                if out.run.is_none() {
                    out.run = Some(split_run_words(rest));
                }
            }
            Marker::Check(kind) => out.checks.push(CheckLine {
                kind,
                expected: rest.trim_end().to_string(),
            }),
            Marker::Ignore => out.ignore = true,
            Marker::Fail => out.should_fail = true,
        }
    }
    out
}

/// Split a `RUN:` payload into command words, honoring quotes and
/// backslash escapes.
pub fn split_run_words(raw: &str) -> Result<Vec<String>, String> {
    let raw = raw.trim();
    match shlex::split(raw) {
        Some(words) if words.is_empty() => Err("RUN: names no command".to_string()),
        Some(words) => Ok(words),
        None => Err(format!("RUN: has unbalanced quoting: {raw}")),
    }
}

fn marker_of(line: &str) -> Option<(Marker, &str)> {
    let body = line.trim_start().strip_prefix(';')?.trim_start();
    for &(word, marker) in MARKERS {
        let Some(rest) = body.strip_prefix(word) else {
            continue;
        };
        // Bare markers must end at a word boundary so comments like
        // `; IGNORED-FILES ...` do not flag the file.
        let bare = matches!(marker, Marker::Ignore | Marker::Fail);
        if bare && rest.chars().next().is_some_and(is_word_char) {
            continue;
        }
        return Some((marker, rest));
    }
    None
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_checks_in_file_order() {
        let d = parse(
            "; RUN: lir-check %s\n\
             entity @top () () {\n\
             ; CHECK: top: ok\n\
             }\n\
             ; CHECK-NEXT: done\n\
             ; CHECK-ERR: unknown unit\n",
        );
        assert_eq!(d.run, Some(Ok(vec!["lir-check".to_string(), "%s".to_string()])));
        assert!(!d.ignore);
        assert!(!d.should_fail);
        let kinds: Vec<CheckKind> = d.checks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CheckKind::Check, CheckKind::CheckNext, CheckKind::CheckErr]
        );
        assert_eq!(d.checks[0].expected, " top: ok");
        assert_eq!(d.checks[1].expected, " done");
    }

    #[test]
    fn first_run_line_wins() {
        let d = parse("; RUN: first %s\n; RUN: second %s\n");
        assert_eq!(
            d.run,
            Some(Ok(vec!["first".to_string(), "%s".to_string()]))
        );
    }

    #[test]
    fn run_honors_quoting() {
        let d = parse("; RUN: lir-check --flag 'a b' c\\ d\n");
        let words = d.run.unwrap().unwrap();
        assert_eq!(words, vec!["lir-check", "--flag", "a b", "c d"]);
    }

    #[test]
    fn malformed_run_is_an_error_not_a_panic() {
        let d = parse("; RUN: lir-check 'unterminated\n");
        let err = d.run.unwrap().unwrap_err();
        assert!(err.contains("unbalanced"), "got: {err}");

        let d = parse("; RUN:\n");
        let err = d.run.unwrap().unwrap_err();
        assert!(err.contains("no command"), "got: {err}");
    }

    #[test]
    fn bare_markers_need_a_word_boundary() {
        assert!(parse("; IGNORE\n").ignore);
        assert!(parse(";IGNORE\n").ignore);
        assert!(parse("  ; IGNORE this one is flaky\n").ignore);
        assert!(!parse("; IGNORED-FILES are elsewhere\n").ignore);
        assert!(!parse("; IGNOREme\n").ignore);

        assert!(parse("; FAIL\n").should_fail);
        assert!(!parse("; FAILURE modes are documented\n").should_fail);
    }

    #[test]
    fn markers_are_case_sensitive_and_comment_bound() {
        assert!(parse("; ignore\n").checks.is_empty());
        assert!(!parse("; ignore\n").ignore);
        // Outside a comment nothing is a directive.
        let d = parse("CHECK: not a directive\nRUN: also not\n");
        assert!(d.checks.is_empty());
        assert!(d.run.is_none());
        // A marker must follow the `;` directly (modulo whitespace).
        assert!(parse("; see CHECK: below\n").checks.is_empty());
    }

    #[test]
    fn check_next_is_not_read_as_check() {
        let d = parse("; CHECK-NEXT: x\n");
        assert_eq!(d.checks[0].kind, CheckKind::CheckNext);
        let d = parse("; CHECKMATE: x\n");
        assert!(d.checks.is_empty());
    }

    #[test]
    fn expected_text_keeps_leading_trims_trailing() {
        let d = parse("; CHECK:   %0 = add i32 %a %b   \n");
        assert_eq!(d.checks[0].expected, "   %0 = add i32 %a %b");
    }
}
