use std::{collections::BTreeSet, path::Path};

/// Outcome of a rescan (4.8): the full current set plus what changed since
/// the previously cached set, so the caller can decide incremental vs full
/// sweep without rescanning again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub current: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl Diff {
    /// Additions only (no deletions) are the common case and are sent
    /// incrementally; anything else -- or the peer being its own tracker --
    /// requires a full sweep so deletions actually propagate (4.8).
    pub fn needs_full_sweep(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Lists the shared directory's immediate files (no recursion) as a flat
/// name set and diffs it against `previous`.
pub async fn rescan(shared_dir: &Path, previous: &BTreeSet<String>) -> std::io::Result<Diff> {
    let mut current = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(shared_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                current.insert(name.to_string());
            }
        }
    }

    let added = current.difference(previous).cloned().collect();
    let removed = previous.difference(&current).cloned().collect();

    Ok(Diff {
        current,
        added,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn additions_only_does_not_require_a_full_sweep() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("a.txt")).unwrap();
        let previous = BTreeSet::new();

        let diff = rescan(dir.path(), &previous).await.unwrap();
        assert_eq!(diff.added, BTreeSet::from(["a.txt".to_string()]));
        assert!(diff.removed.is_empty());
        assert!(!diff.needs_full_sweep());
    }

    #[tokio::test]
    async fn a_removed_file_requires_a_full_sweep() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("a.txt")).unwrap();
        let previous = BTreeSet::from(["a.txt".to_string(), "b.txt".to_string()]);

        let diff = rescan(dir.path(), &previous).await.unwrap();
        assert_eq!(diff.removed, BTreeSet::from(["b.txt".to_string()]));
        assert!(diff.needs_full_sweep());
    }

    #[tokio::test]
    async fn no_change_yields_an_empty_diff() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("a.txt")).unwrap();
        let previous = BTreeSet::from(["a.txt".to_string()]);

        let diff = rescan(dir.path(), &previous).await.unwrap();
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(!diff.needs_full_sweep());
    }
}
