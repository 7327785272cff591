use crate::audio;
use crate::sanitize::SanitizeRules;
use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Marker every ambiguous character collapses to when building reduced keys.
const WILDCARD: char = '\u{fffd}';

/// Why a playlist reference could not be repaired.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no file on disk matches '{0}'")]
    NotFound(String),
    #[error("'{reference}' matches {} files equally well", .candidates.len())]
    Ambiguous {
        reference: String,
        candidates: Vec<PathBuf>,
    },
}

/// Read-only snapshot of every audio file under the source root.
///
/// Built once per run and shared by all workers. Resolution is a pure lookup
/// over the snapshot, so tests can inject synthetic path lists instead of a
/// real directory tree.
pub struct FsIndex {
    root: Option<PathBuf>,
    files: FxHashSet<PathBuf>,
    by_key: FxHashMap<String, Vec<PathBuf>>,
    ambiguous: FxHashSet<char>,
}

impl FsIndex {
    /// Scan the source root and snapshot every audio file below it.
    pub fn build(root: &Path, rules: &SanitizeRules) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && audio::is_audio_file(entry.path()) {
                if let Ok(rel) = entry.path().strip_prefix(root) {
                    paths.push(rel.to_path_buf());
                }
            }
        }
        let mut index = Self::from_paths(paths, rules);
        index.root = Some(root.to_path_buf());
        Ok(index)
    }

    /// Build from an explicit list of root-relative paths.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>, rules: &SanitizeRules) -> Self {
        let ambiguous = rules.ambiguous_set();
        let mut files = FxHashSet::default();
        let mut by_key: FxHashMap<String, Vec<PathBuf>> = FxHashMap::default();

        for path in paths {
            let key = reduced_key(&path.to_string_lossy(), &ambiguous);
            by_key.entry(key).or_default().push(path.clone());
            files.insert(path);
        }

        Self {
            root: None,
            files,
            by_key,
            ambiguous,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Repair a playlist reference against the snapshot.
    ///
    /// Exact matches (after separator normalization) win. Otherwise every
    /// character some filesystem may have substituted collapses to a
    /// wildcard, and a file whose reduced key matches the reference's is a
    /// candidate. A unique candidate resolves; several candidates fall back
    /// to edit distance, and a tie at the minimum is reported as ambiguous
    /// rather than guessed at.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ResolveError> {
        let Some(normalized) = self.normalize(raw) else {
            return Err(ResolveError::NotFound(raw.to_string()));
        };

        let exact = PathBuf::from(&normalized);
        if self.files.contains(&exact) {
            return Ok(exact);
        }

        let key = reduced_key(&normalized, &self.ambiguous);
        let candidates = match self.by_key.get(&key) {
            Some(candidates) => candidates,
            None => return Err(ResolveError::NotFound(raw.to_string())),
        };
        if candidates.len() == 1 {
            return Ok(candidates[0].clone());
        }

        let best = candidates
            .iter()
            .map(|c| strsim::levenshtein(&normalized, &c.to_string_lossy()))
            .min()
            .unwrap_or(0);
        let mut closest: Vec<PathBuf> = candidates
            .iter()
            .filter(|c| strsim::levenshtein(&normalized, &c.to_string_lossy()) == best)
            .cloned()
            .collect();
        if closest.len() == 1 {
            return Ok(closest.remove(0));
        }

        closest.sort();
        Err(ResolveError::Ambiguous {
            reference: raw.to_string(),
            candidates: closest,
        })
    }

    /// Normalize a reference to a root-relative, forward-slash path. Returns
    /// None for absolute references outside the source root.
    fn normalize(&self, raw: &str) -> Option<String> {
        let slashed = raw.trim().replace('\\', "/");
        let path = Path::new(&slashed);

        let rel = if path.is_absolute() {
            let root = self.root.as_deref()?;
            path.strip_prefix(root).ok()?.to_path_buf()
        } else {
            path.strip_prefix(".")
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf())
        };

        Some(rel.to_string_lossy().into_owned())
    }
}

fn reduced_key(path: &str, ambiguous: &FxHashSet<char>) -> String {
    path.chars()
        .map(|c| if ambiguous.contains(&c) { WILDCARD } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(paths: &[&str]) -> FsIndex {
        FsIndex::from_paths(
            paths.iter().map(PathBuf::from),
            &SanitizeRules::default(),
        )
    }

    #[test]
    fn test_resolve_exact_match() {
        let index = index(&["Albums/Song_Title.flac", "Albums/Other.mp3"]);
        let resolved = index.resolve("Albums/Song_Title.flac").unwrap();
        assert_eq!(resolved, PathBuf::from("Albums/Song_Title.flac"));
    }

    #[test]
    fn test_resolve_exact_match_windows_separators() {
        let index = index(&["Albums/Song_Title.flac"]);
        let resolved = index.resolve("Albums\\Song_Title.flac").unwrap();
        assert_eq!(resolved, PathBuf::from("Albums/Song_Title.flac"));
    }

    #[test]
    fn test_resolve_mangled_reference() {
        // The playlist was authored against the original name; an
        // intermediate filesystem replaced '?' with '_' on disk.
        let index = index(&["Song_Title.flac", "Another.flac"]);
        let resolved = index.resolve("Song?Title.flac").unwrap();
        assert_eq!(resolved, PathBuf::from("Song_Title.flac"));
    }

    #[test]
    fn test_resolve_mangled_directory_component() {
        let index = index(&["AC_DC/Back In Black/Hells Bells.mp3"]);
        let resolved = index.resolve("AC?DC/Back In Black/Hells Bells.mp3").unwrap();
        assert_eq!(
            resolved,
            PathBuf::from("AC_DC/Back In Black/Hells Bells.mp3")
        );
    }

    #[test]
    fn test_resolve_not_found() {
        let index = index(&["Song_Title.flac"]);
        let err = index.resolve("Missing.flac").unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn test_resolve_respects_directory_depth() {
        // Same file name at a different depth must not match.
        let index = index(&["Deep/Nested/Song_Title.flac"]);
        let err = index.resolve("Song?Title.flac").unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn test_resolve_ambiguous_reports_all_candidates() {
        // Two copies mangled differently are equally close to the reference.
        let index = index(&["Song_Title.flac", "Song|Title.flac"]);
        let err = index.resolve("Song?Title.flac").unwrap_err();
        match err {
            ResolveError::Ambiguous { candidates, .. } => {
                assert_eq!(
                    candidates,
                    vec![
                        PathBuf::from("Song_Title.flac"),
                        PathBuf::from("Song|Title.flac"),
                    ]
                );
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_prefers_smallest_edit_distance() {
        // Both reduce to the same key, but one needs a single substitution
        // and the other two.
        let index = index(&["a_b_c.mp3", "a\"b|c.mp3"]);
        let resolved = index.resolve("a?b_c.mp3").unwrap();
        assert_eq!(resolved, PathBuf::from("a_b_c.mp3"));
    }

    #[test]
    fn test_resolve_absolute_reference_under_root() -> Result<()> {
        use std::fs;
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("Music");
        fs::create_dir_all(root.join("Albums"))?;
        fs::write(root.join("Albums/Track.mp3"), b"test")?;

        let index = FsIndex::build(&root, &SanitizeRules::default())?;
        assert_eq!(index.len(), 1);

        let reference = root.join("Albums/Track.mp3");
        let resolved = index.resolve(reference.to_str().unwrap()).unwrap();
        assert_eq!(resolved, PathBuf::from("Albums/Track.mp3"));
        Ok(())
    }

    #[test]
    fn test_build_indexes_audio_files_only() -> Result<()> {
        use std::fs;
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("Music");
        fs::create_dir_all(root.join("Empty/Dir"))?;
        fs::write(root.join("track.mp3"), b"test")?;
        fs::write(root.join("cover.jpg"), b"test")?;
        fs::write(root.join("playlist.m3u8"), b"track.mp3")?;

        let index = FsIndex::build(&root, &SanitizeRules::default())?;
        assert_eq!(index.len(), 1);
        assert!(index.resolve("track.mp3").is_ok());
        assert!(index.resolve("cover.jpg").is_err());
        Ok(())
    }
}
