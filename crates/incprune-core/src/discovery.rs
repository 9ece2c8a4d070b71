//! Source file discovery.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::PrunerConfig;
use crate::error::{PrunerError, Result};

/// Collect the files to scan under `target`.
///
/// A file target is returned as is. A directory is walked recursively with
/// entries of each directory in file-name order; hidden entries and anything
/// inside the build directory are skipped.
pub fn collect_sources(target: &Path, config: &PrunerConfig) -> Result<Vec<PathBuf>> {
    if !target.exists() {
        return Err(PrunerError::TargetNotFound(target.to_path_buf()));
    }
    if target.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }

    // In-source builds put the build dir at or above the target; nothing to exclude then.
    let target_abs = target.canonicalize()?;
    let build_dir = config
        .build_dir
        .canonicalize()
        .ok()
        .filter(|b| !target_abs.starts_with(b));
    let mut files = Vec::new();

    let walker = WalkDir::new(target)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            (e.depth() == 0 || !is_hidden(e)) && !is_inside(e.path(), build_dir.as_deref())
        });

    for entry in walker {
        let entry = entry.map_err(|e| PrunerError::Discovery {
            path: target.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let accepted = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| config.accepts_extension(e))
            .unwrap_or(false);
        if accepted {
            files.push(entry.into_path());
        }
    }

    debug!(target = %target.display(), count = files.len(), "collected sources");
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_inside(path: &Path, dir: Option<&Path>) -> bool {
    let Some(dir) = dir else {
        return false;
    };
    path.canonicalize()
        .map(|p| p.starts_with(dir))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "int x;\n").unwrap();
    }

    #[test]
    fn walks_in_stable_order_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/b.cc");
        touch(root, "src/a.cpp");
        touch(root, "src/a.h");
        touch(root, "src/.hidden.cc");
        touch(root, ".git/x.cc");
        touch(root, "build/gen.cc");
        touch(root, "lib/z.cc");

        let config = PrunerConfig {
            build_dir: root.join("build"),
            ..PrunerConfig::default()
        };
        let files = collect_sources(root, &config).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["lib/z.cc", "src/a.cpp", "src/b.cc"]);
    }

    #[test]
    fn single_file_target_ignores_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "only.cxx");
        let files = collect_sources(&dir.path().join("only.cxx"), &PrunerConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn missing_target_is_an_error() {
        let err = collect_sources(Path::new("/definitely/not/here"), &PrunerConfig::default())
            .unwrap_err();
        assert!(matches!(err, PrunerError::TargetNotFound(_)));
    }
}
