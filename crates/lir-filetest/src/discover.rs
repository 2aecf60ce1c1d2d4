//! Discovery of `.lir` test files under the tests root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// A discovered test file: absolute path plus the root-relative name
/// the harness reports it under.
#[derive(Debug, Clone)]
pub struct DiscoveredTest {
    pub name: String,
    pub path: PathBuf,
}

/// Collect every `*.lir` file under `root`, sorted by name. Names use
/// `/` separators regardless of platform so reports stay stable.
pub fn discover_tests(root: &Path) -> Result<Vec<DiscoveredTest>> {
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("resolve tests dir: {}", root.display()))?;

    let mut out = Vec::new();
    for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lir") {
            continue;
        }
        let rel = path.strip_prefix(&root).unwrap_or(path);
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(DiscoveredTest {
            name,
            path: path.to_path_buf(),
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}
