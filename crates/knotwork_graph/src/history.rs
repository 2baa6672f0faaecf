// SPDX-License-Identifier: MIT OR Apache-2.0
//! Version history of a document.
//!
//! Every commit stores a zstd-compressed snapshot of the whole document.
//! Versions are never renumbered; the undo stack is a linear list of version
//! numbers with a cursor, and committing after an undo drops everything
//! above the cursor from the stack (the versions themselves stay
//! addressable until pruned).

use crate::error::HistoryError;

#[derive(Debug, Clone)]
struct Version {
    data: Option<Vec<u8>>,
    message: String,
    size: usize,
}

/// Compressed snapshots and a linear undo stack over them
#[derive(Debug, Clone)]
pub struct History {
    versions: Vec<Version>,
    undo_stack: Vec<usize>,
    cursor: Option<usize>,
    file_version: Option<usize>,
    pub(crate) edit_group_level: u32,
    compression_level: i32,
    history_limit: Option<usize>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(3, None)
    }
}

impl History {
    /// Create an empty history
    pub fn new(compression_level: i32, history_limit: Option<usize>) -> Self {
        Self {
            versions: Vec::new(),
            undo_stack: Vec::new(),
            cursor: None,
            file_version: None,
            edit_group_level: 0,
            compression_level,
            history_limit,
        }
    }

    /// Forget every version
    pub fn reset(&mut self) {
        self.versions.clear();
        self.undo_stack.clear();
        self.cursor = None;
        self.file_version = None;
        self.edit_group_level = 0;
    }

    /// Store a snapshot as a new version on top of the undo cursor
    pub fn commit(&mut self, snapshot: &[u8], message: &str) -> Result<usize, HistoryError> {
        let data = zstd::encode_all(snapshot, self.compression_level)?;
        let version = self.versions.len();
        self.versions.push(Version {
            data: Some(data),
            message: message.to_owned(),
            size: snapshot.len(),
        });
        let position = match self.cursor {
            Some(cursor) => {
                self.undo_stack.truncate(cursor + 1);
                cursor + 1
            }
            None => {
                self.undo_stack.clear();
                0
            }
        };
        self.undo_stack.push(version);
        self.cursor = Some(position);
        self.enforce_limit();
        tracing::debug!("committed version {version}: {message}");
        Ok(version)
    }

    /// Decompressed snapshot of `version`
    pub fn snapshot(&self, version: usize) -> Result<Vec<u8>, HistoryError> {
        let entry = self
            .versions
            .get(version)
            .ok_or(HistoryError::BadVersion(version))?;
        let data = entry.data.as_ref().ok_or(HistoryError::Pruned(version))?;
        let bytes = zstd::decode_all(&data[..]).map_err(|e| {
            tracing::error!("version {version} does not decompress: {e}");
            HistoryError::Corrupt(version)
        })?;
        if bytes.len() != entry.size {
            tracing::error!(
                "version {version} decompressed to {} bytes, expected {}",
                bytes.len(),
                entry.size
            );
            return Err(HistoryError::Corrupt(version));
        }
        Ok(bytes)
    }

    fn is_available(&self, version: usize) -> bool {
        self.versions.get(version).is_some_and(|v| v.data.is_some())
    }

    /// Stack position and version an undo would move to
    pub(crate) fn undo_target(&self) -> Result<(usize, usize), HistoryError> {
        match self.cursor {
            Some(cursor) if cursor > 0 => Ok((cursor - 1, self.undo_stack[cursor - 1])),
            _ => Err(HistoryError::AtOldest),
        }
    }

    /// Stack position and version a redo would move to
    pub(crate) fn redo_target(&self) -> Result<(usize, usize), HistoryError> {
        match self.cursor {
            Some(cursor) if cursor + 1 < self.undo_stack.len() => {
                Ok((cursor + 1, self.undo_stack[cursor + 1]))
            }
            _ => Err(HistoryError::AtNewest),
        }
    }

    pub(crate) fn set_cursor(&mut self, position: usize) {
        if position < self.undo_stack.len() {
            self.cursor = Some(position);
        }
    }

    /// Whether an undo is possible
    pub fn can_undo(&self) -> bool {
        self.undo_target().is_ok_and(|(_, v)| self.is_available(v))
    }

    /// Whether a redo is possible
    pub fn can_redo(&self) -> bool {
        self.redo_target().is_ok_and(|(_, v)| self.is_available(v))
    }

    /// Version under the undo cursor
    pub fn current_version(&self) -> Option<usize> {
        self.cursor.map(|cursor| self.undo_stack[cursor])
    }

    /// Number of versions ever committed
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Commit message of `version`
    pub fn version_message(&self, version: usize) -> Option<&str> {
        self.versions.get(version).map(|v| v.message.as_str())
    }

    /// Versions on the undo stack, oldest first
    pub fn undo_stack(&self) -> &[usize] {
        &self.undo_stack
    }

    /// Version last written to disk
    pub fn file_version(&self) -> Option<usize> {
        self.file_version
    }

    /// Remember the current version as the one on disk
    pub fn mark_saved(&mut self) {
        self.file_version = self.current_version();
    }

    /// Drop snapshot data of versions that are not on the undo stack
    pub fn prune(&mut self) {
        let mut freed = 0;
        for (version, entry) in self.versions.iter_mut().enumerate() {
            if entry.data.is_some() && !self.undo_stack.contains(&version) {
                entry.data = None;
                freed += 1;
            }
        }
        if freed > 0 {
            tracing::debug!("pruned {freed} versions");
        }
    }

    fn enforce_limit(&mut self) {
        let Some(limit) = self.history_limit else {
            return;
        };
        let keep_from = self.undo_stack.len().saturating_sub(limit.max(1));
        for &version in &self.undo_stack[..keep_from] {
            if let Some(entry) = self.versions.get_mut(version) {
                entry.data = None;
            }
        }
    }

    /// Bytes held by compressed snapshots and messages
    pub fn memory_bytes_used(&self) -> usize {
        self.versions
            .iter()
            .map(|v| v.data.as_ref().map_or(0, Vec::len) + v.message.len())
            .sum()
    }

    /// Whether an edit group is open
    pub fn in_edit_group(&self) -> bool {
        self.edit_group_level > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(history: &mut History, text: &str) -> usize {
        history.commit(text.as_bytes(), text).unwrap()
    }

    #[test]
    fn test_commit_and_snapshot() {
        let mut history = History::default();
        let v = commit(&mut history, "hello world");
        assert_eq!(v, 0);
        assert_eq!(history.snapshot(v).unwrap(), b"hello world");
        assert_eq!(history.current_version(), Some(0));
        assert!(matches!(history.snapshot(5), Err(HistoryError::BadVersion(5))));
        assert!(history.memory_bytes_used() > 0);
    }

    #[test]
    fn test_commit_after_undo_truncates_stack() {
        let mut history = History::default();
        for text in ["a", "b", "c", "d"] {
            commit(&mut history, text);
        }
        let (pos, version) = history.undo_target().unwrap();
        history.set_cursor(pos);
        assert_eq!(version, 2);
        let (pos, _) = history.undo_target().unwrap();
        history.set_cursor(pos);
        assert_eq!(history.current_version(), Some(1));
        assert!(history.can_redo());

        let e = commit(&mut history, "e");
        assert_eq!(e, 4);
        assert_eq!(history.undo_stack(), &[0, 1, 4]);
        assert!(!history.can_redo());
        assert!(matches!(history.redo_target(), Err(HistoryError::AtNewest)));
        assert_eq!(history.version_message(2), Some("c"));
    }

    #[test]
    fn test_prune_keeps_stack() {
        let mut history = History::default();
        for text in ["a", "b", "c"] {
            commit(&mut history, text);
        }
        history.set_cursor(0);
        commit(&mut history, "d");
        let before = history.memory_bytes_used();
        history.prune();
        assert!(history.memory_bytes_used() < before);
        assert!(matches!(history.snapshot(1), Err(HistoryError::Pruned(1))));
        assert_eq!(history.snapshot(3).unwrap(), b"d");
        assert_eq!(history.snapshot(0).unwrap(), b"a");
    }

    #[test]
    fn test_history_limit() {
        let mut history = History::new(3, Some(2));
        for text in ["a", "b", "c", "d"] {
            commit(&mut history, text);
        }
        assert!(history.snapshot(1).is_err());
        assert!(history.snapshot(2).is_ok());
        assert!(history.can_undo());
        history.set_cursor(2);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_mark_saved() {
        let mut history = History::default();
        commit(&mut history, "a");
        history.mark_saved();
        commit(&mut history, "b");
        assert_eq!(history.file_version(), Some(0));
        assert_ne!(history.current_version(), history.file_version());
    }
}
