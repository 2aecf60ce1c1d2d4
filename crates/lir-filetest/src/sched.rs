//! Bounded-parallel execution of test cases with in-order reporting.
//!
//! A fixed pool of worker threads pulls case indices from a shared
//! counter, so at most `jobs` checker processes are in flight at any
//! time. Workers push `(index, result)` pairs over a channel; the
//! driving thread holds out-of-order arrivals in a buffer and reports
//! strictly in discovery order. One slow test therefore delays the
//! *printing* of its successors, never their execution.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lir_filecheck::check_lines;

use crate::case::TestCase;
use crate::report::{Console, Diag};

/// Cap on each captured stream; a checker that floods its output gets
/// truncated, not the harness OOM-killed.
const OUTPUT_CAP: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub jobs: usize,
    pub timeout: Duration,
}

/// Captured run of one checker process.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    Ignored,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Passed => "pass",
            TestStatus::Failed => "fail",
            TestStatus::Ignored => "ignored",
        }
    }
}

/// Final verdict for one test.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    /// Resolved argv, when binding succeeded.
    pub command: Option<Vec<String>>,
    pub diags: Vec<Diag>,
    /// Absent for ignored tests and for commands that never launched.
    pub outcome: Option<ExecutionOutcome>,
}

impl TestResult {
    fn ignored(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: TestStatus::Ignored,
            duration_ms: 0,
            command: None,
            diags: Vec::new(),
            outcome: None,
        }
    }

    fn failed_before_launch(case: &TestCase, started: Instant, diag: Diag) -> Self {
        Self {
            name: case.spec.name.clone(),
            status: TestStatus::Failed,
            duration_ms: elapsed_ms(started),
            command: case.command.as_ref().ok().cloned(),
            diags: vec![diag],
            outcome: None,
        }
    }
}

/// Run every case and stream per-test lines to `console` in discovery
/// order. The returned vector is in the same order.
pub fn run_cases(
    cases: &[TestCase],
    config: &RunConfig,
    console: &mut Console,
) -> Result<Vec<TestResult>> {
    if cases.is_empty() {
        return Ok(Vec::new());
    }

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, TestResult)>();

    std::thread::scope(|scope| {
        let jobs = config.jobs.max(1).min(cases.len());
        for _ in 0..jobs {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                if idx >= cases.len() {
                    return;
                }
                let case = &cases[idx];
                let result = if case.spec.ignore {
                    TestResult::ignored(&case.spec.name)
                } else {
                    run_case(case, config.timeout)
                };
                if tx.send((idx, result)).is_err() {
                    return;
                }
            });
        }
        drop(tx);

        let mut ordered = Vec::with_capacity(cases.len());
        let mut pending: BTreeMap<usize, TestResult> = BTreeMap::new();
        for slot in 0..cases.len() {
            console.begin(&cases[slot].spec.name);
            let result = loop {
                if let Some(r) = pending.remove(&slot) {
                    break r;
                }
                match rx.recv() {
                    Ok((idx, r)) if idx == slot => break r,
                    Ok((idx, r)) => {
                        pending.insert(idx, r);
                    }
                    Err(_) => anyhow::bail!(
                        "worker exited without reporting test {}",
                        cases[slot].spec.name
                    ),
                }
            };
            console.finish(&result);
            ordered.push(result);
        }
        Ok(ordered)
    })
}

/// Execute one non-ignored case to its verdict. Never fails the batch:
/// anything that goes wrong becomes this test's failed result.
fn run_case(case: &TestCase, timeout: Duration) -> TestResult {
    let started = Instant::now();

    let argv = match &case.command {
        Ok(argv) => argv,
        Err(err) => {
            return TestResult::failed_before_launch(
                case,
                started,
                Diag::new("ERUN_MALFORMED", err.clone()),
            );
        }
    };

    let outcome = match spawn_and_wait(argv, &case.spec.path, timeout) {
        Ok(outcome) => outcome,
        Err(err) => {
            return TestResult::failed_before_launch(
                case,
                started,
                Diag::new("ERUN_LAUNCH", format!("{err:#}")),
            );
        }
    };

    let mut diags = Vec::new();
    let failed = if outcome.timed_out {
        diags.push(Diag::new(
            "ERUN_TIMEOUT",
            format!("killed after {}s", timeout.as_secs()),
        ));
        true
    } else if (outcome.exit_code == 0) == case.spec.should_fail {
        let expected = if case.spec.should_fail {
            "non-zero"
        } else {
            "zero"
        };
        diags.push(Diag::new(
            "ERUN_EXIT",
            format!("expected {expected} exit code, got {}", outcome.exit_code),
        ));
        true
    } else {
        // stdout first, then stderr: one stream, stable order.
        let lines: Vec<String> = outcome
            .stdout
            .lines()
            .chain(outcome.stderr.lines())
            .map(str::to_string)
            .collect();
        let failures = check_lines(&case.spec.checks, &lines);
        for f in &failures {
            let code = if f.found.is_none() {
                "ECHECK_EOF"
            } else {
                "ECHECK_MISMATCH"
            };
            diags.push(Diag::new(code, f.describe()));
        }
        !diags.is_empty()
    };

    TestResult {
        name: case.spec.name.clone(),
        status: if failed {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        },
        duration_ms: elapsed_ms(started),
        command: Some(argv.clone()),
        diags,
        outcome: Some(outcome),
    }
}

/// Spawn the resolved argv with the test's directory as working
/// directory and drain both pipes off-thread so a chatty child cannot
/// deadlock against a full pipe. On unix the child leads its own
/// process group, so a timeout kill reaches anything it forked.
fn spawn_and_wait(argv: &[String], test_path: &Path, timeout: Duration) -> Result<ExecutionOutcome> {
    let (program, args) = argv.split_first().context("empty command")?;
    let cwd = test_path.parent().unwrap_or(Path::new("."));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .current_dir(cwd);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 && libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn checker: {program}"))?;

    let stdout = child.stdout.take().context("take stdout")?;
    let stderr = child.stderr.take().context("take stderr")?;

    let stdout_thread = std::thread::spawn(move || read_to_end_capped(stdout, OUTPUT_CAP));
    let stderr_thread = std::thread::spawn(move || read_to_end_capped(stderr, OUTPUT_CAP));

    let (status, timed_out) = wait_with_wall_timeout(&mut child, timeout)?;

    let (stdout_bytes, stdout_truncated) = stdout_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))?;
    let (stderr_bytes, stderr_truncated) = stderr_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))?;

    #[cfg(unix)]
    let exit_signal = {
        use std::os::unix::process::ExitStatusExt as _;
        status.signal()
    };
    #[cfg(not(unix))]
    let exit_signal: Option<i32> = None;

    let exit_code = match status.code() {
        Some(code) => code,
        None => exit_signal.map(|s| 128 + s).unwrap_or(1),
    };

    Ok(ExecutionOutcome {
        exit_code,
        timed_out,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        stdout_truncated,
        stderr_truncated,
    })
}

fn wait_with_wall_timeout(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    let start = Instant::now();
    let deadline = start.checked_add(timeout);

    loop {
        if let Some(status) = child.try_wait().context("try_wait checker")? {
            return Ok((status, false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_child_and_group(child);
            let status = child.wait().context("wait checker after kill")?;
            return Ok((status, true));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// SIGKILL the child's whole process group, then the child itself.
/// Grandchildren inherit the pipe write ends; they have to die too or
/// the capture threads never see EOF.
fn kill_child_and_group(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pid) = i32::try_from(child.id()) {
        unsafe {
            let _ = libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            break;
        }
        if truncated {
            continue;
        }
        let remaining = cap.saturating_sub(buf.len());
        if n <= remaining {
            buf.extend_from_slice(&tmp[..n]);
        } else {
            buf.extend_from_slice(&tmp[..remaining]);
            truncated = true;
        }
    }

    Ok((buf, truncated))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
