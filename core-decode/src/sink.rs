//! # PCM Sinks
//!
//! Where drained PCM accumulates until the WAV container is written. The WAV
//! header carries the payload length, so the whole payload has to exist
//! before the first header byte can be final.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const SPOOL_BUFFER_BYTES: usize = 64 * 1024;

/// Append-only PCM accumulator.
pub trait PcmSink: Send {
    /// Appends `data`, preserving drain order.
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Bytes appended so far.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finishes appending and returns a reader over everything appended.
    fn into_reader(self: Box<Self>) -> io::Result<Box<dyn Read + Send>>;
}

/// Holds PCM in a growable buffer.
#[derive(Debug, Default)]
pub struct MemoryPcmSink {
    buffer: Vec<u8>,
}

impl MemoryPcmSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl PcmSink for MemoryPcmSink {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn into_reader(self: Box<Self>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.buffer)))
    }
}

/// Spools PCM to a scratch file named after the operation.
///
/// The file is removed when the sink, or the reader it turns into, is
/// dropped, so a failed or cancelled conversion leaves nothing behind.
#[derive(Debug)]
pub struct SpoolPcmSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    len: u64,
}

impl SpoolPcmSink {
    /// Creates `{dir}/{operation_id}.raw`, creating `dir` if needed.
    pub fn create(dir: &Path, operation_id: Uuid) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.raw", operation_id));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        debug!(path = %path.display(), "Created PCM spool file");

        Ok(Self {
            path,
            writer: Some(BufWriter::with_capacity(SPOOL_BUFFER_BYTES, file)),
            len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PcmSink for SpoolPcmSink {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("spool already finished"))?;
        writer.write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn into_reader(mut self: Box<Self>) -> io::Result<Box<dyn Read + Send>> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        let file = File::open(&self.path)?;
        // The reader takes over deleting the file.
        let path = std::mem::take(&mut self.path);
        Ok(Box::new(SpoolReader {
            reader: BufReader::with_capacity(SPOOL_BUFFER_BYTES, file),
            path,
        }))
    }
}

impl Drop for SpoolPcmSink {
    fn drop(&mut self) {
        self.writer.take();
        remove_spool(&self.path);
    }
}

struct SpoolReader {
    reader: BufReader<File>,
    path: PathBuf,
}

impl Read for SpoolReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for SpoolReader {
    fn drop(&mut self) {
        remove_spool(&self.path);
    }
}

fn remove_spool(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed PCM spool file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove PCM spool file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_preserves_order() {
        let mut sink = MemoryPcmSink::new();
        sink.append(&[1, 2]).unwrap();
        sink.append(&[]).unwrap();
        sink.append(&[3]).unwrap();
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.as_bytes(), &[1, 2, 3]);

        let mut out = Vec::new();
        Box::new(sink).into_reader().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_spool_sink_round_trips_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SpoolPcmSink::create(&dir.path().join("spool"), Uuid::new_v4()).unwrap();
        let path = sink.path().to_path_buf();

        sink.append(&[9; 100_000]).unwrap();
        sink.append(&[7; 10]).unwrap();
        assert_eq!(sink.len(), 100_010);

        let mut reader = Box::new(sink).into_reader().unwrap();
        assert!(path.exists());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 100_010);
        assert_eq!(&out[100_000..], &[7; 10]);

        drop(reader);
        assert!(!path.exists());
    }

    #[test]
    fn test_dropped_spool_sink_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SpoolPcmSink::create(dir.path(), Uuid::new_v4()).unwrap();
        let path = sink.path().to_path_buf();
        assert!(path.exists());

        drop(sink);
        assert!(!path.exists());
    }
}
