use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::TransferError;

/// Random-access source of upload bytes.
pub trait ByteSource: Send + Sync {
    /// Total size in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `len` bytes starting at `start`.
    fn read_range(
        &self,
        start: u64,
        len: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + '_>>;
}

fn check_range(start: u64, len: u64, size: u64) -> Result<(), TransferError> {
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransferError::OutOfRange { start, len, size }),
    }
}

/// Bytes held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(
        &self,
        start: u64,
        len: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + '_>> {
        Box::pin(async move {
            check_range(start, len, self.len())?;
            let (start, end) = (start as usize, (start + len) as usize);
            Ok(self.data[start..end].to_vec())
        })
    }
}

/// A file on disk, read with seek + exact reads.
///
/// The size is captured at open time; the file must not change underneath an
/// upload.
pub struct FileSource {
    file: Mutex<tokio::fs::File>,
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Opens `path` for chunked reading.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.size
    }

    fn read_range(
        &self,
        start: u64,
        len: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + '_>> {
        Box::pin(async move {
            check_range(start, len, self.size)?;
            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(start)).await?;
            let mut buf = vec![0u8; len as usize];
            file.read_exact(&mut buf).await?;
            Ok(buf)
        })
    }
}
