//! Canonical paths relative to the watch root

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error normalizing a path
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("absolute path not allowed: {}", .0.display())]
    Absolute(PathBuf),
    #[error("parent directory component not allowed: {}", .0.display())]
    ParentComponent(PathBuf),
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8(PathBuf),
    #[error("{} is outside of {}", .path.display(), .root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// A path relative to the watch root
///
/// Always `/`-separated, never absolute, never empty, and free of `.` and
/// `..` components. Ordering is plain string ordering, which is what gives
/// diff passes their deterministic output order.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
    /// Normalize a relative path
    ///
    /// - Rejects `..` and absolute paths
    /// - Removes `./` components
    /// - Joins with `/`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PathError> {
        let path = path.as_ref();
        let mut parts: Vec<&str> = Vec::new();

        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| PathError::NonUtf8(path.to_path_buf()))?;
                    parts.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(PathError::ParentComponent(path.to_path_buf()))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Absolute(path.to_path_buf()))
                }
            }
        }

        if parts.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(parts.join("/")))
    }

    /// Relativize an absolute path against the watch root
    pub fn from_absolute(root: &Path, path: &Path) -> Result<Self, PathError> {
        let rel = path.strip_prefix(root).map_err(|_| PathError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;
        Self::new(rel)
    }

    /// The canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this path under `root`
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut full = root.to_path_buf();
        full.extend(self.0.split('/'));
        full
    }

    /// Last component
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// True when `self` lies strictly below the directory `dir`
    pub fn is_inside(&self, dir: &RelPath) -> bool {
        self.0.len() > dir.0.len()
            && self.0.starts_with(dir.as_str())
            && self.0.as_bytes()[dir.0.len()] == b'/'
    }
}

impl TryFrom<String> for RelPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RelPath::new(value)
    }
}

impl From<RelPath> for String {
    fn from(value: RelPath) -> Self {
        value.0
    }
}

impl std::borrow::Borrow<str> for RelPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RelPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(RelPath::new("src/main.rs").unwrap().as_str(), "src/main.rs");
        assert_eq!(RelPath::new("./src/./main.rs").unwrap().as_str(), "src/main.rs");
        assert!(matches!(RelPath::new("../etc/passwd"), Err(PathError::ParentComponent(_))));
        assert!(matches!(RelPath::new("/etc/passwd"), Err(PathError::Absolute(_))));
        assert_eq!(RelPath::new("."), Err(PathError::Empty));
        assert_eq!(RelPath::new(""), Err(PathError::Empty));
    }

    #[test]
    fn test_from_absolute() {
        let root = Path::new("/srv/watched");
        let rel = RelPath::from_absolute(root, Path::new("/srv/watched/a/b.txt")).unwrap();
        assert_eq!(rel.as_str(), "a/b.txt");
        assert_eq!(rel.to_path(root), PathBuf::from("/srv/watched/a/b.txt"));

        assert!(matches!(
            RelPath::from_absolute(root, Path::new("/srv/other/x")),
            Err(PathError::OutsideRoot { .. })
        ));
        assert_eq!(RelPath::from_absolute(root, root), Err(PathError::Empty));
    }

    #[test]
    fn test_is_inside() {
        let dir = RelPath::new("docs").unwrap();
        assert!(RelPath::new("docs/a.txt").unwrap().is_inside(&dir));
        assert!(RelPath::new("docs/sub/b.txt").unwrap().is_inside(&dir));
        assert!(!RelPath::new("docs").unwrap().is_inside(&dir));
        assert!(!RelPath::new("docs2/a.txt").unwrap().is_inside(&dir));
    }

    #[test]
    fn test_lexicographic_order() {
        let mut paths = vec![
            RelPath::new("b.txt").unwrap(),
            RelPath::new("a/z.txt").unwrap(),
            RelPath::new("a.txt").unwrap(),
        ];
        paths.sort();
        let names: Vec<_> = paths.iter().map(RelPath::as_str).collect();
        assert_eq!(names, ["a.txt", "a/z.txt", "b.txt"]);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(RelPath::new("a/b/c.txt").unwrap().file_name(), "c.txt");
        assert_eq!(RelPath::new("c.txt").unwrap().file_name(), "c.txt");
    }
}
