//! Whole-file textual mutation with snapshot rollback.
//!
//! A [`FileMutator`] owns one source file for the duration of a run. It keeps
//! the file's lines as read at open time plus a [`MutationState`] per line,
//! and renders the file from those: original lines verbatim, commented-out
//! lines prefixed with `// `, deleted lines omitted. Line indices therefore
//! never shift, however many lines are deleted.
//!
//! Every write replaces the whole file through a temp file and an atomic
//! rename, after checking that nobody else changed the file since the last
//! write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::candidate::{is_comment_prefixed, is_live_include, strip_terminator, MutationState};
use crate::error::MutationError;

/// Prefix applied to tentatively removed lines.
pub const COMMENT_MARKER: &str = "// ";

type MutResult<T> = std::result::Result<T, MutationError>;

/// File content and line states captured before a mutation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    text: String,
    states: Vec<MutationState>,
}

/// Applies and reverts include edits on one file.
#[derive(Debug)]
pub struct FileMutator {
    path: PathBuf,
    lines: Vec<String>,
    states: Vec<MutationState>,
    /// States as of the last successful write
    written: Vec<MutationState>,
    disk_digest: String,
}

impl FileMutator {
    /// Read `path` and start tracking it; every line starts `Original`.
    pub fn open(path: impl AsRef<Path>) -> MutResult<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path).map_err(|source| MutationError::Read {
            path: path.clone(),
            source,
        })?;
        let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
        let states = vec![MutationState::Original; lines.len()];

        Ok(Self {
            path,
            lines,
            written: states.clone(),
            states,
            disk_digest: digest_hex(text.as_bytes()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// State of 1-based `line`, `None` when out of range.
    pub fn state(&self, line: usize) -> Option<MutationState> {
        line.checked_sub(1).and_then(|i| self.states.get(i)).copied()
    }

    /// Lines currently commented out and awaiting a verdict.
    pub fn pending(&self) -> Vec<usize> {
        self.lines_in(MutationState::CommentedOut)
    }

    /// Lines confirmed for deletion.
    pub fn deleted(&self) -> Vec<usize> {
        self.lines_in(MutationState::Deleted)
    }

    /// Deleted lines already absent from the file on disk.
    pub fn removed_on_disk(&self) -> Vec<usize> {
        self.written
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == MutationState::Deleted)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Whether the file on disk lags behind the tracked states.
    pub fn has_unwritten_changes(&self) -> bool {
        self.states != self.written
    }

    /// Current content as it is (or will be) on disk.
    pub fn render(&self) -> String {
        self.render_states(&self.states)
    }

    /// Capture the current content and states for a later [`revert`](Self::revert).
    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            text: self.render(),
            states: self.states.clone(),
        }
    }

    /// Comment out every listed line that is still a live include directive.
    ///
    /// Lines that are out of range, already mutated, already comment-prefixed
    /// or no longer an include are skipped. The file is written once if
    /// anything changed. Returns the lines actually commented out.
    pub fn comment(&mut self, lines: &[usize]) -> MutResult<Vec<usize>> {
        let before = self.states.clone();
        let mut applied = Vec::new();

        for &line in lines {
            let Some(idx) = line.checked_sub(1).filter(|&i| i < self.lines.len()) else {
                debug!(file = %self.path.display(), line, "line out of range, skipping");
                continue;
            };
            if self.states[idx] != MutationState::Original {
                debug!(file = %self.path.display(), line, state = ?self.states[idx], "line already mutated, skipping");
                continue;
            }
            let text = strip_terminator(&self.lines[idx]);
            if is_comment_prefixed(text) {
                info!(file = %self.path.display(), line, "Skipping line (already commented): {}", text.trim());
                continue;
            }
            if !is_live_include(text) {
                debug!(file = %self.path.display(), line, "line no longer holds an include, skipping");
                continue;
            }
            self.states[idx] = MutationState::CommentedOut;
            applied.push(line);
        }

        if !applied.is_empty() {
            if let Err(e) = self.write() {
                self.states = before;
                return Err(e);
            }
        }
        Ok(applied)
    }

    /// Mark every commented-out line deleted without writing.
    ///
    /// Call only after a passing verification. The lines disappear from the
    /// file on the next write.
    pub fn confirm(&mut self) -> Vec<usize> {
        let confirmed = self.pending();
        for &line in &confirmed {
            self.states[line - 1] = MutationState::Deleted;
        }
        confirmed
    }

    /// Confirm the pending lines and rewrite the file without them.
    pub fn delete(&mut self) -> MutResult<Vec<usize>> {
        let before = self.states.clone();
        let confirmed = self.confirm();
        if let Err(e) = self.write() {
            self.states = before;
            return Err(e);
        }
        Ok(confirmed)
    }

    /// Restore only the pending lines to their original text and write.
    pub fn rollback(&mut self) -> MutResult<Vec<usize>> {
        let before = self.states.clone();
        let restored = self.pending();
        if restored.is_empty() {
            return Ok(restored);
        }
        for &line in &restored {
            self.states[line - 1] = MutationState::Original;
        }
        if let Err(e) = self.write() {
            self.states = before;
            return Err(e);
        }
        Ok(restored)
    }

    /// Restore the file verbatim to `snapshot`.
    pub fn revert(&mut self, snapshot: &FileSnapshot) -> MutResult<()> {
        self.write_text(&snapshot.text)?;
        self.states = snapshot.states.clone();
        self.written = snapshot.states.clone();
        Ok(())
    }

    /// Rewrite the file from the current states.
    pub fn flush(&mut self) -> MutResult<()> {
        self.write()
    }

    fn lines_in(&self, wanted: MutationState) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == wanted)
            .map(|(i, _)| i + 1)
            .collect()
    }

    fn render_states(&self, states: &[MutationState]) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.len() + 3).sum());
        for (line, state) in self.lines.iter().zip(states) {
            match state {
                MutationState::Original => out.push_str(line),
                MutationState::CommentedOut => {
                    out.push_str(COMMENT_MARKER);
                    out.push_str(line);
                }
                MutationState::Deleted => {}
            }
        }
        out
    }

    fn write(&mut self) -> MutResult<()> {
        let text = self.render();
        self.write_text(&text)?;
        self.written = self.states.clone();
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> MutResult<()> {
        let on_disk = fs::read(&self.path).map_err(|source| MutationError::Read {
            path: self.path.clone(),
            source,
        })?;
        if digest_hex(&on_disk) != self.disk_digest {
            return Err(MutationError::ConcurrentModification(self.path.clone()));
        }

        write_atomic(&self.path, text.as_bytes()).map_err(|source| MutationError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.disk_digest = digest_hex(text.as_bytes());
        Ok(())
    }
}

/// Replace `path` with `contents` via a sibling temp file and rename,
/// keeping the original permissions.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path)?.permissions();

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "#include <iostream>\n#include \"unused.h\"\n#include \"other.h\"\n\nint main() {}\n";

    fn setup(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cc");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn comment_writes_all_lines_once() {
        let (_dir, path) = setup(SOURCE);
        let mut m = FileMutator::open(&path).unwrap();

        let applied = m.comment(&[2, 3]).unwrap();

        assert_eq!(applied, vec![2, 3]);
        assert_eq!(
            read(&path),
            "#include <iostream>\n// #include \"unused.h\"\n// #include \"other.h\"\n\nint main() {}\n"
        );
        assert_eq!(m.state(2), Some(MutationState::CommentedOut));
    }

    #[test]
    fn delete_removes_lines_without_blank_residue() {
        let (_dir, path) = setup(SOURCE);
        let mut m = FileMutator::open(&path).unwrap();
        m.comment(&[2]).unwrap();

        let deleted = m.delete().unwrap();

        assert_eq!(deleted, vec![2]);
        assert_eq!(read(&path), "#include <iostream>\n#include \"other.h\"\n\nint main() {}\n");
        assert_eq!(m.state(2), Some(MutationState::Deleted));
    }

    #[test]
    fn revert_restores_snapshot_verbatim() {
        let (_dir, path) = setup(SOURCE);
        let mut m = FileMutator::open(&path).unwrap();
        let snap = m.snapshot();
        m.comment(&[2, 3]).unwrap();

        m.revert(&snap).unwrap();

        assert_eq!(read(&path), SOURCE);
        assert!(m.pending().is_empty());
        assert!(!m.has_unwritten_changes());
    }

    #[test]
    fn confirmed_lines_stay_on_disk_until_next_write() {
        let (_dir, path) = setup(SOURCE);
        let mut m = FileMutator::open(&path).unwrap();
        m.comment(&[2]).unwrap();
        m.confirm();

        assert!(m.has_unwritten_changes());
        assert!(m.removed_on_disk().is_empty());
        assert!(read(&path).contains("// #include"));

        m.comment(&[3]).unwrap();
        assert_eq!(m.removed_on_disk(), vec![2]);
        assert!(!m.has_unwritten_changes());
    }

    #[test]
    fn rollback_only_touches_pending_lines() {
        let (_dir, path) = setup(SOURCE);
        let mut m = FileMutator::open(&path).unwrap();
        m.comment(&[2]).unwrap();
        m.confirm();
        m.comment(&[3]).unwrap();

        let restored = m.rollback().unwrap();

        assert_eq!(restored, vec![3]);
        assert_eq!(read(&path), "#include <iostream>\n#include \"other.h\"\n\nint main() {}\n");
    }

    #[test]
    fn never_double_comments() {
        let (_dir, path) = setup("// #include \"x.h\"\n#include <y.h>\n");
        let mut m = FileMutator::open(&path).unwrap();

        let applied = m.comment(&[1]).unwrap();

        assert!(applied.is_empty());
        assert_eq!(read(&path), "// #include \"x.h\"\n#include <y.h>\n");
    }

    #[test]
    fn skips_lines_that_are_no_longer_includes() {
        let (_dir, path) = setup(SOURCE);
        let mut m = FileMutator::open(&path).unwrap();

        let applied = m.comment(&[4, 5, 42]).unwrap();

        assert!(applied.is_empty());
        assert_eq!(read(&path), SOURCE);
    }

    #[test]
    fn crlf_and_missing_final_newline_preserved() {
        let content = "#include <a.h>\r\n#include <b.h>";
        let (_dir, path) = setup(content);
        let mut m = FileMutator::open(&path).unwrap();

        m.comment(&[2]).unwrap();
        assert_eq!(read(&path), "#include <a.h>\r\n// #include <b.h>");
        m.delete().unwrap();
        assert_eq!(read(&path), "#include <a.h>\r\n");
    }

    #[test]
    fn external_edit_is_detected() {
        let (_dir, path) = setup(SOURCE);
        let mut m = FileMutator::open(&path).unwrap();
        fs::write(&path, "int changed;\n").unwrap();

        let err = m.comment(&[2]).unwrap_err();

        assert!(matches!(err, MutationError::ConcurrentModification(_)));
        assert_eq!(m.state(2), Some(MutationState::Original));
        assert_eq!(read(&path), "int changed;\n");
    }

    #[cfg(unix)]
    #[test]
    fn permissions_survive_rewrite() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, path) = setup(SOURCE);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let mut m = FileMutator::open(&path).unwrap();

        m.comment(&[2]).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
