//! Binding of discovered files to their directives and resolved
//! commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use lir_filecheck::directive::{self, Directives};
use lir_filecheck::CheckLine;

use crate::discover::DiscoveredTest;
use crate::resolve::{Resolver, PATH_PLACEHOLDER};

/// Parsed shape of one test file.
#[derive(Debug, Clone)]
pub struct TestSpec {
    /// Root-relative name, also the report key.
    pub name: String,
    pub path: PathBuf,
    pub ignore: bool,
    pub should_fail: bool,
    pub checks: Vec<CheckLine>,
}

/// A spec bound to the argument vector the scheduler will spawn.
///
/// `command` is `Err` when the `RUN:` line could not be split; the
/// scheduler turns that into a failed result for this one test instead
/// of refusing the whole batch.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub spec: TestSpec,
    pub command: Result<Vec<String>, String>,
}

/// Read, parse and bind one test file. Only the read can fail here;
/// everything wrong *inside* the file is deferred to the test's own
/// result.
pub fn load_case(test: &DiscoveredTest, checker: &str, resolver: &Resolver) -> Result<TestCase> {
    let text = std::fs::read_to_string(&test.path)
        .with_context(|| format!("read test file: {}", test.path.display()))?;
    Ok(bind_case(test, directive::parse(&text), checker, resolver))
}

fn bind_case(
    test: &DiscoveredTest,
    directives: Directives,
    checker: &str,
    resolver: &Resolver,
) -> TestCase {
    let template = match directives.run {
        Some(split) => split,
        None => Ok(vec![checker.to_string(), PATH_PLACEHOLDER.to_string()]),
    };
    let command = template.map(|words| resolver.resolve(&words, &test.path));

    TestCase {
        spec: TestSpec {
            name: test.name.clone(),
            path: test.path.clone(),
            ignore: directives.ignore,
            should_fail: directives.should_fail,
            checks: directives.checks,
        },
        command,
    }
}
