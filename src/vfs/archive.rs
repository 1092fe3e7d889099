//! Zip bundling for directory downloads
//!
//! Object bodies are written chunk by chunk; only the finished archive is
//! held in memory, bounded by `max_bytes`.

use std::io::{Cursor, Write};

use bytes::Bytes;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};

pub(crate) struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    root: String,
    written: u64,
    max_bytes: u64,
    entries: usize,
}

impl ArchiveBuilder {
    pub(crate) fn new(root: &str, max_bytes: u64) -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            root: root.trim_end_matches('/').to_string(),
            written: 0,
            max_bytes,
            entries: 0,
        }
    }

    fn entry_name(&self, relative: &str) -> String {
        format!("{}/{}", self.root, relative)
    }

    /// Begin a file entry at `<root>/<relative>`
    pub(crate) fn start_file(&mut self, relative: &str) -> Result<()> {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer.start_file(self.entry_name(relative), options)?;
        self.entries += 1;
        Ok(())
    }

    /// Add an empty directory entry
    pub(crate) fn add_directory(&mut self, relative: &str) -> Result<()> {
        self.writer
            .add_directory(self.entry_name(relative), FileOptions::default())?;
        self.entries += 1;
        Ok(())
    }

    /// Append to the current file entry
    pub(crate) fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.written += chunk.len() as u64;
        if self.written > self.max_bytes {
            return Err(Error::Archive(format!(
                "archive exceeds the {} byte limit",
                self.max_bytes
            )));
        }
        self.writer.write_all(chunk)?;
        Ok(())
    }

    pub(crate) fn entries(&self) -> usize {
        self.entries
    }

    pub(crate) fn finish(mut self) -> Result<Bytes> {
        let cursor = self.writer.finish()?;
        Ok(Bytes::from(cursor.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_build_archive() {
        let mut archive = ArchiveBuilder::new("docs", 1024);
        archive.start_file("a.txt").unwrap();
        archive.write_chunk(b"abc").unwrap();
        archive.start_file("sub/b.txt").unwrap();
        archive.write_chunk(b"hel").unwrap();
        archive.write_chunk(b"lo").unwrap();
        archive.add_directory("empty/").unwrap();
        assert_eq!(archive.entries(), 3);

        let bytes = archive.finish().unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(zip.len(), 3);

        let mut content = String::new();
        zip.by_name("docs/sub/b.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
        assert!(zip.by_name("docs/empty/").unwrap().is_dir());
    }

    #[test]
    fn test_size_limit() {
        let mut archive = ArchiveBuilder::new("big", 4);
        archive.start_file("x.bin").unwrap();
        archive.write_chunk(b"1234").unwrap();
        assert!(matches!(archive.write_chunk(b"5"), Err(Error::Archive(_))));
    }
}
