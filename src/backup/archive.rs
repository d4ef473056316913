//! Tree archives and file hashing
//!
//! Derived subtrees (virtual environments, collected static assets) are
//! reproducible from the tree and its dependency manifest, so they are left
//! out of archives and left in place when a tree is cleared.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StewardError, StewardResult};

/// Normalized set of relative paths excluded from archives
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    paths: Vec<PathBuf>,
}

impl Exclusions {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| PathBuf::from(p.as_ref().trim_matches('/')))
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
        }
    }

    /// `rel` is an excluded path or lies inside one
    pub fn covers(&self, rel: &Path) -> bool {
        self.paths.iter().any(|p| rel.starts_with(p))
    }

    /// `rel` is a strict ancestor of an excluded path
    fn contains_excluded(&self, rel: &Path) -> bool {
        self.paths
            .iter()
            .any(|p| p.starts_with(rel) && p.as_path() != rel)
    }
}

/// Write a gzip tarball of `root` to `dest`, skipping excluded subtrees
///
/// Symlinks are stored as links, never followed.
pub fn archive_tree(root: &Path, dest: &Path, exclude: &Exclusions) -> StewardResult<()> {
    if !root.is_dir() {
        return Err(StewardError::Archive(format!(
            "Tree root is not a directory: {}",
            root.display()
        )));
    }

    let file = File::create(dest)
        .map_err(|e| StewardError::Archive(format!("Failed to create {}: {}", dest.display(), e)))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !exclude.covers(rel)
        });

    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| StewardError::Archive(e.to_string()))?;

        if entry.file_type().is_dir() {
            builder.append_dir(rel, entry.path())
        } else {
            builder.append_path_with_name(entry.path(), rel)
        }
        .map_err(|e| {
            StewardError::Archive(format!("Failed to add {}: {}", entry.path().display(), e))
        })?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| StewardError::Archive(format!("Failed to finish archive: {}", e)))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| StewardError::Archive(format!("Failed to compress archive: {}", e)))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    debug!(root = %root.display(), dest = %dest.display(), "Tree archived");
    Ok(())
}

/// Unpack a gzip tarball into `dest`, preserving permissions
pub fn extract_tree(archive: &Path, dest: &Path) -> StewardResult<()> {
    let file = File::open(archive).map_err(|e| {
        StewardError::Archive(format!("Failed to open {}: {}", archive.display(), e))
    })?;
    fs::create_dir_all(dest)?;

    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(dest).map_err(|e| {
        StewardError::Archive(format!(
            "Failed to extract {} into {}: {}",
            archive.display(),
            dest.display(),
            e
        ))
    })?;

    debug!(archive = %archive.display(), dest = %dest.display(), "Tree extracted");
    Ok(())
}

/// Delete everything under `root` except preserved subtrees
///
/// The root directory itself is kept. Returns the number of entries removed.
pub fn clear_tree(root: &Path, preserve: &Exclusions) -> StewardResult<usize> {
    if !root.exists() {
        return Ok(0);
    }
    clear_dir(root, root, preserve)
}

fn clear_dir(root: &Path, dir: &Path, preserve: &Exclusions) -> StewardResult<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let file_type = entry.file_type()?;

        if preserve.covers(&rel) {
            continue;
        }
        if file_type.is_dir() && preserve.contains_excluded(&rel) {
            removed += clear_dir(root, &path, preserve)?;
            continue;
        }

        if file_type.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> StewardResult<String> {
    let file = File::open(path)
        .map_err(|e| StewardError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Size of a file, 0 if it cannot be read
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn file_set(root: &Path) -> BTreeSet<String> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| {
                e.unwrap()
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .display()
                    .to_string()
            })
            .collect()
    }

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("app/static")).unwrap();
        fs::create_dir_all(root.join("venv/bin")).unwrap();
        fs::create_dir_all(root.join("staticfiles")).unwrap();
        fs::write(root.join("manage.py"), "#!/usr/bin/env python").unwrap();
        fs::write(root.join("app/views.py"), "def index(): pass").unwrap();
        fs::write(root.join("app/static/site.css"), "body {}").unwrap();
        fs::write(root.join("venv/bin/python"), "elf").unwrap();
        fs::write(root.join("staticfiles/site.css"), "body {}").unwrap();
        std::os::unix::fs::symlink("views.py", root.join("app/link.py")).unwrap();
    }

    #[test]
    fn test_archive_round_trip_excludes_derived() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        sample_tree(&src);

        let archive = temp.path().join("tree.tar.gz");
        let exclude = Exclusions::new(["venv", "staticfiles/"]);
        archive_tree(&src, &archive, &exclude).unwrap();

        let dest = temp.path().join("dest");
        extract_tree(&archive, &dest).unwrap();

        let expected: BTreeSet<String> = [
            "app",
            "app/link.py",
            "app/static",
            "app/static/site.css",
            "app/views.py",
            "manage.py",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(file_set(&dest), expected);
        assert!(fs::symlink_metadata(dest.join("app/link.py"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn test_archive_nested_exclusion() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        sample_tree(&src);

        let archive = temp.path().join("tree.tar.gz");
        archive_tree(&src, &archive, &Exclusions::new(["app/static"])).unwrap();

        let dest = temp.path().join("dest");
        extract_tree(&archive, &dest).unwrap();
        assert!(dest.join("app/views.py").exists());
        assert!(!dest.join("app/static").exists());
        assert!(dest.join("venv/bin/python").exists());
    }

    #[test]
    fn test_clear_tree_keeps_preserved_paths() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app-root");
        sample_tree(&root);

        clear_tree(&root, &Exclusions::new(["venv", "app/static"])).unwrap();

        let expected: BTreeSet<String> = ["app", "app/static", "app/static/site.css", "venv", "venv/bin", "venv/bin/python"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(file_set(&root), expected);
        assert!(root.exists());
    }

    #[test]
    fn test_clear_missing_tree_is_noop() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            clear_tree(&temp.path().join("absent"), &Exclusions::default()).unwrap(),
            0
        );
    }

    #[test]
    fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
