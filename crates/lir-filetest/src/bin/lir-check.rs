//! Minimal structural checker for `.lir` assembly.
//!
//! Not a verifier: it strips comments, tracks brace nesting and unit
//! names, and reports the obvious structural mistakes. The shipped
//! regression corpus runs against it, so the suite works without a
//! full toolchain installed.

use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut dump = false;
    let mut files = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dump" | "-d" => dump = true,
            "--help" | "-h" => {
                println!("usage: lir-check [--dump] FILE...");
                return ExitCode::SUCCESS;
            }
            _ if arg.starts_with('-') => {
                eprintln!("lir-check: unknown option: {arg}");
                return ExitCode::from(2);
            }
            _ => files.push(arg),
        }
    }
    if files.is_empty() {
        eprintln!("lir-check: no input files");
        return ExitCode::from(2);
    }

    let mut ok = true;
    for file in &files {
        let text = match std::fs::read_to_string(Path::new(file)) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("lir-check: {file}: {err}");
                return ExitCode::from(2);
            }
        };
        let scan = scan_text(&text);
        if dump {
            for line in &scan.canon {
                println!("{line}");
            }
        } else {
            for unit in &scan.units {
                println!("@{unit}: ok");
            }
        }
        for err in &scan.errors {
            eprintln!("error: {err}");
        }
        ok &= scan.errors.is_empty();
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[derive(Debug, Default)]
struct Scan {
    /// Unit names in declaration order.
    units: Vec<String>,
    /// Comment-stripped, trimmed, non-blank lines for `--dump`.
    canon: Vec<String>,
    errors: Vec<String>,
}

const UNIT_KINDS: &[&str] = &["func", "proc", "entity"];

fn scan_text(text: &str) -> Scan {
    let mut scan = Scan::default();
    let mut depth = 0usize;

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        scan.canon.push(line.to_string());

        if depth == 0 {
            let kind = line.split_whitespace().next().unwrap_or_default();
            if kind == "declare" {
                match unit_name(line) {
                    Some(_) => continue,
                    None => {
                        scan.errors.push(format!("line {lineno}: declare without a unit name"));
                        continue;
                    }
                }
            }
            if !UNIT_KINDS.contains(&kind) {
                scan.errors
                    .push(format!("line {lineno}: expected unit, found: {line}"));
                continue;
            }
            let Some(name) = unit_name(line) else {
                scan.errors
                    .push(format!("line {lineno}: {kind} without a unit name"));
                continue;
            };
            if !line.ends_with('{') {
                scan.errors
                    .push(format!("line {lineno}: expected `{{` after unit header"));
                continue;
            }
            if scan.units.iter().any(|u| u == name) {
                scan.errors
                    .push(format!("line {lineno}: duplicate unit @{name}"));
            }
            scan.units.push(name.to_string());
            depth = 1;
            continue;
        }

        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => {
                    if depth == 0 {
                        scan.errors.push(format!("line {lineno}: unexpected `}}`"));
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }

    if depth != 0 {
        scan.errors.push("unbalanced braces at end of file".to_string());
    }
    scan
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn unit_name(line: &str) -> Option<&str> {
    let at = line.find('@')?;
    let rest = &line[at + 1..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_units_scan_clean() {
        let scan = scan_text(
            "; a comment\n\
             entity @top (i32 %0) (i32 %1) {\n\
                 %2 = add i32 %0 %1\n\
             }\n\
             \n\
             func @helper (i32 %a) void {\n\
             %entry:\n\
                 %v = var {i32, i64}\n\
             }\n\
             declare @ext (i32) void\n",
        );
        assert!(scan.errors.is_empty(), "errors: {:?}", scan.errors);
        assert_eq!(scan.units, vec!["top", "helper"]);
    }

    #[test]
    fn unbalanced_braces_are_reported() {
        let scan = scan_text("proc @p () () {\n%entry:\n");
        assert_eq!(scan.errors, vec!["unbalanced braces at end of file"]);

        let scan = scan_text("func @f () void {\n}\n}\n");
        assert_eq!(scan.errors.len(), 1);
        assert!(scan.errors[0].contains("expected unit"), "got: {:?}", scan.errors);
    }

    #[test]
    fn duplicate_units_are_reported_with_their_line() {
        let scan = scan_text("func @f () void {\n}\nfunc @f () void {\n}\n");
        assert_eq!(scan.errors, vec!["line 3: duplicate unit @f"]);
    }

    #[test]
    fn stray_toplevel_lines_are_reported() {
        let scan = scan_text("%0 = add i32 %1 %2\n");
        assert_eq!(scan.errors.len(), 1);
        assert!(scan.errors[0].contains("expected unit"));
    }

    #[test]
    fn comments_never_reach_the_scan() {
        let scan = scan_text("; func @commented () void {\nentity @e () () { ; trailing\n}\n");
        assert!(scan.errors.is_empty(), "errors: {:?}", scan.errors);
        assert_eq!(scan.units, vec!["e"]);
        assert_eq!(scan.canon, vec!["entity @e () () {", "}"]);
    }

    #[test]
    fn unit_name_extraction() {
        assert_eq!(unit_name("func @foo.bar_2 () void {"), Some("foo.bar_2"));
        assert_eq!(unit_name("func @ () void {"), None);
        assert_eq!(unit_name("func () void {"), None);
    }
}
