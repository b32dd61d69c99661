//! Directory listing for run directories, the backup root and mirror stores.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory listing
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Report directories as well as files
    pub include_dirs: bool,
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Entry name (last path component)
    pub name: String,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry) -> std::io::Result<Self> {
        let metadata = entry.metadata()?;
        let is_dir = metadata.is_dir();
        Ok(Self {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().to_string(),
            size: if is_dir { 0 } else { metadata.len() },
            is_dir,
        })
    }
}

/// Compile exclude globs. An invalid pattern is reported with its text.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

/// List the direct children of `root`, sorted by name.
///
/// The root itself is never reported.
pub fn walk_directory(root: &Path, options: WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() && !options.include_dirs {
            continue;
        }
        entries.push(FileInfo::from_entry(&entry)?);
    }

    Ok(entries)
}

/// Calculate total size of all files in a listing
pub fn total_size(files: &[FileInfo]) -> u64 {
    files.iter().map(|f| f.size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_is_sorted_and_skips_nested() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("b.txt"), b"content1")?;
        fs::write(temp_dir.path().join("a.txt"), b"content2")?;
        fs::write(temp_dir.path().join("subdir/c.txt"), b"content3")?;

        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        Ok(())
    }

    #[test]
    fn test_include_dirs() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("231106mon"))?;
        fs::write(temp_dir.path().join("notes.txt"), b"x")?;

        let options = WalkOptions { include_dirs: true };
        let entries = walk_directory(temp_dir.path(), options)?;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].size, 0);

        Ok(())
    }

    #[test]
    fn test_total_size() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file1.txt"), b"12345")?;
        fs::write(temp_dir.path().join("file2.txt"), b"1234567")?;

        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(total_size(&files), 12);

        Ok(())
    }

    #[test]
    fn test_globset_matches_entry_names() {
        let set = build_globset(&["*.swp".to_string(), "cache".to_string()]).unwrap();
        assert!(set.is_match("file.swp"));
        assert!(set.is_match("cache"));
        assert!(!set.is_match("file.txt"));
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        assert!(build_globset(&["a[".to_string()]).is_err());
    }
}
