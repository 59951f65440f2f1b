//! Zip archive assembly and saving.

use std::io::{Cursor, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::domain::{AppError, ArchiveSink, Result};

/// One file inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub contents: String,
}

impl ArchiveEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Compress entries into a zip held in memory.
///
/// # Errors
/// Returns error if an entry cannot be written.
pub fn build_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for entry in entries {
        zip.start_file(entry.name.as_str(), options)
            .map_err(AppError::archive)?;
        zip.write_all(entry.contents.as_bytes())
            .map_err(|e| AppError::io(format!("Failed to write {}", entry.name), e))?;
    }

    let cursor = zip.finish().map_err(AppError::archive)?;
    Ok(cursor.into_inner())
}

/// Saves archives into a directory (the exports folder).
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ArchiveSink for DirectorySink {
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::io(format!("Failed to create {}", self.dir.display()), e))?;

        let path = self.dir.join(file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::io(format!("Failed to write {}", path.display()), e))?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved archive");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn test_build_zip_contains_entries() {
        let bytes = build_zip(&[
            ArchiveEntry::new("a.json", "{}"),
            ArchiveEntry::new("a.md", "# A\n"),
        ])
        .unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut md = String::new();
        archive.by_name("a.md").unwrap().read_to_string(&mut md).unwrap();
        assert_eq!(md, "# A\n");
    }

    #[tokio::test]
    async fn test_directory_sink_writes_file() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("exports"));

        let saved = sink.save("out.zip", vec![1, 2, 3]).await.unwrap();

        assert!(saved.ends_with("out.zip"));
        assert_eq!(std::fs::read(&saved).unwrap(), vec![1, 2, 3]);
    }
}
