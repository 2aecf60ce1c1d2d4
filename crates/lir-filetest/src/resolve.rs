//! Resolution of `RUN:` command words into a spawnable argument vector.
//!
//! Words are rewritten in four mutually exclusive ways, checked in this
//! order after `%s` substitution:
//!
//! 1. toolchain binaries (`lir-*`) get the install prefix prepended;
//! 2. words with glob characters expand, sorted, against the test's
//!    directory (no matches means no arguments);
//! 3. words naming an existing file or directory next to the test are
//!    made absolute;
//! 4. anything else is passed through untouched.
//!
//! Resolution never touches the filesystem beyond reads, so binding a
//! test case is repeatable and safe to do for ignored tests too.

use std::path::Path;

use globset::Glob;
use walkdir::WalkDir;

/// Name prefix of the toolchain's binaries.
pub const TOOL_PREFIX: &str = "lir-";

/// Placeholder replaced by the absolute path of the test file.
pub const PATH_PLACEHOLDER: &str = "%s";

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    /// Prepended verbatim to toolchain binary names, so a non-empty
    /// prefix normally ends with a path separator.
    pub install_prefix: String,
}

impl Resolver {
    pub fn new(install_prefix: impl Into<String>) -> Self {
        Self {
            install_prefix: install_prefix.into(),
        }
    }

    /// Resolve template words against one test file. `test_path` must
    /// be absolute; the test's parent directory anchors glob expansion
    /// and relative path lookup.
    pub fn resolve(&self, words: &[String], test_path: &Path) -> Vec<String> {
        let test_dir = test_path.parent().unwrap_or(Path::new("."));
        let path_str = test_path.display().to_string();

        let mut out = Vec::with_capacity(words.len());
        for word in words {
            let word = word.replace(PATH_PLACEHOLDER, &path_str);
            if word.starts_with(TOOL_PREFIX) {
                out.push(format!("{}{}", self.install_prefix, word));
            } else if has_glob_chars(&word) {
                out.extend(expand_glob(&word, test_dir));
            } else if test_dir.join(&word).exists() {
                out.push(test_dir.join(&word).display().to_string());
            } else {
                out.push(word);
            }
        }
        out
    }
}

fn has_glob_chars(word: &str) -> bool {
    word.chars().any(|c| matches!(c, '*' | '?' | '['))
}

/// Expand one glob word against `root`. Matches come back sorted and
/// absolute. A word that fails to compile as a glob, like a stray `[`,
/// simply matches nothing.
fn expand_glob(word: &str, root: &Path) -> Vec<String> {
    let Ok(glob) = Glob::new(word) else {
        return Vec::new();
    };
    let matcher = glob.compile_matcher();

    let mut hits = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        if matcher.is_match(rel) {
            hits.push(entry.path().display().to_string());
        }
    }
    hits.sort();
    hits
}
