//! Regression-test harness for the lir toolchain.
//!
//! Discovers `.lir` files under the tests directory, runs the checker
//! named by each file's `RUN:` line (or `lir-check` by default) with
//! bounded parallelism, and matches the captured output against the
//! file's `CHECK` directives.

mod case;
mod discover;
mod report;
mod resolve;
mod sched;
#[cfg(test)]
mod testutil;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use crate::report::Console;
use crate::resolve::Resolver;
use crate::sched::RunConfig;

/// Execute the `.lir` regression suite.
#[derive(Debug, Parser)]
#[command(name = "lir-filetest", version)]
struct Cli {
    /// Directory where tests are located.
    #[arg(long, value_name = "DIR", default_value = "filetests")]
    tests: PathBuf,

    /// Root directory of the toolchain crate. Builds run here; checkers
    /// always run in each test file's directory.
    #[arg(long = "crate", value_name = "DIR", default_value = ".")]
    crate_dir: PathBuf,

    /// Build the toolchain binaries in debug mode and test against them.
    #[arg(long)]
    debug: bool,

    /// Build the toolchain binaries in release mode and test against them.
    #[arg(long)]
    release: bool,

    /// Use toolchain binaries installed at this prefix.
    #[arg(long, value_name = "PREFIX")]
    prefix: Option<String>,

    /// Checker run on tests without a RUN: line.
    #[arg(long, value_name = "NAME", default_value = "lir-check")]
    checker: String,

    /// Number of tests run concurrently.
    #[arg(long, value_name = "N", default_value_t = 16)]
    jobs: usize,

    /// Seconds a single test may run before it is killed.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Only run tests whose name contains this substring.
    #[arg(long, value_name = "SUBSTR")]
    filter: Option<String>,

    /// With --filter, match the whole name instead of a substring.
    #[arg(long)]
    exact: bool,

    /// List the selected tests instead of running them.
    #[arg(long)]
    list: bool,

    /// Also write a JSON report to this path.
    #[arg(long, value_name = "PATH")]
    report_out: Option<PathBuf>,

    /// Print diagnostics and stdout/stderr of failing tests.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let args = Cli::parse();
    let started = Instant::now();

    if args.debug && args.release {
        anyhow::bail!("--debug and --release are mutually exclusive");
    }

    let install_prefix = if args.debug || args.release {
        build_toolchain(&args.crate_dir, args.release)?
    } else {
        args.prefix.clone().unwrap_or_default()
    };

    if args.verbose {
        println!("# crate:   {}", args.crate_dir.display());
        println!("# tests:   {}", args.tests.display());
        println!("# prefix:  {install_prefix}");
    }

    let resolver = Resolver::new(install_prefix);

    let mut discovered = discover::discover_tests(&args.tests)?;
    if let Some(filter) = &args.filter {
        if args.exact {
            discovered.retain(|t| t.name == *filter);
        } else {
            discovered.retain(|t| t.name.contains(filter));
        }
    }

    let mut cases = Vec::with_capacity(discovered.len());
    for t in &discovered {
        cases.push(case::load_case(t, &args.checker, &resolver)?);
    }

    if args.list {
        for case in &cases {
            let expect = if case.spec.ignore {
                "ignore"
            } else if case.spec.should_fail {
                "fail"
            } else {
                "pass"
            };
            println!("{}\t{}", case.spec.name, expect);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut console = Console::new(args.verbose);
    console.running(cases.len());

    let config = RunConfig {
        jobs: args.jobs,
        timeout: Duration::from_secs(args.timeout_secs),
    };
    let results = sched::run_cases(&cases, &config, &mut console)?;

    let ok = console.summary(&results);

    if let Some(out_path) = &args.report_out {
        let report =
            report::finalize_report(&args.tests, args.jobs, config.timeout, started.elapsed(), &results);
        report::write_report(&report, out_path)?;
        if args.verbose {
            eprintln!("# report:  {}", out_path.display());
        }
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

/// Build the toolchain's binaries and derive the install prefix from
/// cargo's target directory, so freshly built tools win over anything
/// on PATH.
fn build_toolchain(crate_dir: &Path, release: bool) -> Result<String> {
    let mut build = std::process::Command::new("cargo");
    build.arg("build").arg("--bins");
    if release {
        build.arg("--release");
    }
    let status = build
        .stdin(std::process::Stdio::null())
        .current_dir(crate_dir)
        .status()
        .context("run cargo build")?;
    if !status.success() {
        anyhow::bail!("cargo build failed: {status}");
    }

    let metadata = std::process::Command::new("cargo")
        .args(["metadata", "--format-version", "1", "--no-deps"])
        .stdin(std::process::Stdio::null())
        .current_dir(crate_dir)
        .output()
        .context("run cargo metadata")?;
    if !metadata.status.success() {
        anyhow::bail!("cargo metadata failed: {}", metadata.status);
    }
    let doc: serde_json::Value =
        serde_json::from_slice(&metadata.stdout).context("parse cargo metadata JSON")?;
    let target_dir = doc
        .get("target_directory")
        .and_then(|v| v.as_str())
        .context("cargo metadata lacks target_directory")?;

    let profile = if release { "release" } else { "debug" };
    Ok(format!("{target_dir}/{profile}/"))
}
