use std::path::PathBuf;

/// One file uploaded as a single chunk of a push job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushArtifact {
    pub path: PathBuf,
    /// 0-based upload position.
    pub index: usize,
    pub is_last: bool,
}

impl PushArtifact {
    pub fn new(path: PathBuf, index: usize, is_last: bool) -> Self {
        Self {
            path,
            index,
            is_last,
        }
    }

    /// Numbers `paths` in order; the final one is flagged as last.
    pub fn sequence(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PushArtifact> {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        let total = paths.len();
        paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| PushArtifact::new(path, index, index + 1 == total))
            .collect()
    }
}
