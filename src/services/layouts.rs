use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Registration targets a crop can be matched against.
///
/// Names are the file names of the layout rasters in the layouts
/// directory, e.g. `site-A.tif`.
#[derive(Debug, Clone, Default)]
pub struct LayoutCatalog {
    dir: Option<PathBuf>,
    names: BTreeSet<String>,
}

impl LayoutCatalog {
    /// Scan `dir` for layout files. Hidden files and subdirectories are
    /// skipped.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| LayoutError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| LayoutError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.insert(name.to_string());
                }
            }
        }

        tracing::info!(dir = %dir.display(), count = names.len(), "Loaded layout catalog");
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            names,
        })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dir: None,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        is_plain_name(name) && self.names.contains(name)
    }

    /// Path of a layout file on disk, if the catalog is directory-backed.
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        if !self.contains(name) {
            return None;
        }
        self.dir.as_ref().map(|dir| dir.join(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A layout name must be a bare file name.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Cannot read layouts directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_files_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("site-A.tif"), b"raster").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let catalog = LayoutCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["site-A.tif"]);
        assert_eq!(
            catalog.path_of("site-A.tif"),
            Some(dir.path().join("site-A.tif"))
        );
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(LayoutCatalog::load("/definitely/not/here").is_err());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let catalog = LayoutCatalog::from_names(["site-A", "../etc/passwd"]);
        assert!(catalog.contains("site-A"));
        assert!(!catalog.contains("../etc/passwd"));
        assert!(!catalog.contains("site-B"));
        assert!(catalog.path_of("site-A").is_none());
    }
}
