//! Console output in the cargo-test style plus the optional JSON
//! report.

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::sched::{TestResult, TestStatus};

pub const REPORT_SCHEMA_VERSION: &str = "lir.filetest.report@0.1.0";

const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Streams per-test lines as results arrive in discovery order.
///
/// `begin` prints the unterminated `test <name> ...` prefix before the
/// result is known, so a watcher always sees which test the harness is
/// waiting on.
pub struct Console {
    pub verbose: bool,
}

impl Console {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn running(&self, count: usize) {
        println!("running {count} tests");
    }

    pub fn begin(&mut self, name: &str) {
        print!("test {name} ...");
        let _ = std::io::stdout().flush();
    }

    pub fn finish(&mut self, result: &TestResult) {
        match result.status {
            TestStatus::Passed => println!(" {GREEN}passed{RESET}"),
            TestStatus::Ignored => println!(" ignored"),
            TestStatus::Failed => {
                if result.outcome.as_ref().is_some_and(|o| o.timed_out) {
                    print!(" timeout,");
                }
                println!(" {BOLD}{RED}FAILED{RESET}");
                if self.verbose {
                    self.dump_failure(result);
                }
            }
        }
    }

    fn dump_failure(&self, result: &TestResult) {
        if let Some(argv) = &result.command {
            println!("# command: {}", argv.join(" "));
        }
        for diag in &result.diags {
            println!("# {}: {}", diag.code, diag.message);
        }
        if let Some(outcome) = &result.outcome {
            println!("\n=== STDERR{} ===", cap_marker(outcome.stderr_truncated));
            print!("{}", outcome.stderr);
            println!("\n=== STDOUT{} ===", cap_marker(outcome.stdout_truncated));
            print!("{}", outcome.stdout);
            println!();
        }
    }

    /// Print the failure list and the final verdict line. Returns true
    /// when no test failed.
    pub fn summary(&self, results: &[TestResult]) -> bool {
        let failed: Vec<&TestResult> = results
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
            .collect();
        let passed = results
            .iter()
            .filter(|r| r.status == TestStatus::Passed)
            .count();
        let ignored = results
            .iter()
            .filter(|r| r.status == TestStatus::Ignored)
            .count();

        println!();
        if !failed.is_empty() {
            println!("failures:");
            for r in &failed {
                println!("    {}", r.name);
            }
            println!();
        }
        let verdict = if failed.is_empty() {
            format!("{BOLD}{GREEN}PASSED{RESET}")
        } else {
            format!("{BOLD}{RED}FAILED{RESET}")
        };
        println!(
            "test result: {verdict}. {passed} passed, {} failed, {ignored} ignored",
            failed.len()
        );
        failed.is_empty()
    }
}

fn cap_marker(truncated: bool) -> &'static str {
    if truncated {
        " (truncated)"
    } else {
        ""
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diag {
    pub code: String,
    pub message: String,
}

impl Diag {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FiletestReport {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub invocation: InvocationInfo,
    pub summary: Summary,
    pub tests: Vec<TestRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationInfo {
    pub argv: Vec<String>,
    pub cwd: String,
    pub tests_dir: String,
    pub jobs: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub passed: u64,
    pub failed: u64,
    pub ignored: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRow {
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diags: Vec<Diag>,
}

impl TestRow {
    fn from_result(result: &TestResult) -> Self {
        Self {
            name: result.name.clone(),
            status: result.status.as_str().to_string(),
            duration_ms: result.duration_ms,
            exit_code: result.outcome.as_ref().map(|o| o.exit_code),
            timed_out: result.outcome.as_ref().map(|o| o.timed_out),
            stdout_truncated: result.outcome.as_ref().map(|o| o.stdout_truncated),
            stderr_truncated: result.outcome.as_ref().map(|o| o.stderr_truncated),
            // The argv is bulky and only interesting for reproducing a
            // failure.
            command: if result.status == TestStatus::Failed {
                result.command.clone()
            } else {
                None
            },
            diags: result.diags.clone(),
        }
    }
}

pub fn finalize_report(
    tests_dir: &Path,
    jobs: usize,
    timeout: Duration,
    elapsed: Duration,
    results: &[TestResult],
) -> FiletestReport {
    let mut summary = Summary::default();
    for r in results {
        match r.status {
            TestStatus::Passed => summary.passed += 1,
            TestStatus::Failed => summary.failed += 1,
            TestStatus::Ignored => summary.ignored += 1,
        }
    }
    summary.duration_ms = elapsed.as_millis() as u64;

    FiletestReport {
        schema_version: REPORT_SCHEMA_VERSION.to_string(),
        tool: ToolInfo {
            name: "lir-filetest".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        invocation: InvocationInfo {
            argv: std::env::args().collect(),
            cwd: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
            tests_dir: tests_dir.display().to_string(),
            jobs,
            timeout_secs: timeout.as_secs(),
        },
        summary,
        tests: results.iter().map(TestRow::from_result).collect(),
    }
}

pub fn write_report(report: &FiletestReport, out_path: &Path) -> Result<()> {
    let json = serde_json::to_string(report)? + "\n";
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report dir: {}", parent.display()))?;
        }
    }
    std::fs::write(out_path, json.as_bytes())
        .with_context(|| format!("write report: {}", out_path.display()))
}
