//! File I/O utilities with atomic writes
//!
//! Used for steward's settings and snapshot metadata: a reader either sees the
//! previous file or the complete new one, never a half-written document.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StewardError;

/// Read JSON from a file, returning an error if file doesn't exist
pub fn read_json_required<T, P>(path: P) -> Result<T, StewardError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let file = File::open(path)
        .map_err(|e| StewardError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| StewardError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), StewardError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            StewardError::Io(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| StewardError::Io(format!("Failed to create temp file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| StewardError::Json(format!("Failed to serialize data: {}", e)))?;

    writer
        .flush()
        .map_err(|e| StewardError::Io(format!("Failed to flush data: {}", e)))?;

    writer
        .get_ref()
        .sync_all()
        .map_err(|e| StewardError::Io(format!("Failed to sync data: {}", e)))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StewardError::Io(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

/// Fsync a directory so a rename inside it is durable
pub fn sync_dir<P: AsRef<Path>>(dir: P) -> Result<(), StewardError> {
    File::open(dir.as_ref())
        .and_then(|d| d.sync_all())
        .map_err(|e| StewardError::Io(format!("Failed to sync {}: {}", dir.as_ref().display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct Marker {
        version: String,
        revision: u32,
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marker.json");

        let data = Marker {
            version: "4.4.9".to_string(),
            revision: 3,
        };

        write_json_atomic(&path, &data).unwrap();
        let loaded: Marker = read_json_required(&path).unwrap();
        assert_eq!(data, loaded);
    }

    #[test]
    fn test_atomic_write_no_temp_file_left() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marker.json");

        write_json_atomic(&path, &Marker::default()).unwrap();

        assert!(path.exists());
        assert!(!temp_dir.path().join("marker.json.tmp").exists());
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("marker.json");

        write_json_atomic(&path, &Marker::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_read_json_required() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marker.json");

        assert!(read_json_required::<Marker, _>(&path).is_err());

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            read_json_required::<Marker, _>(&path),
            Err(StewardError::Json(_))
        ));
    }
}
