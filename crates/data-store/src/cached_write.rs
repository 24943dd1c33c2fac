//! Write-through data-file writer.
//!
//! [`CachedFileWriter`] sits between the parquet writer and the (possibly
//! remote) object store. Every buffer is fanned out to the primary upload,
//! to the optional local cache mirror, and to the footer recorder when it
//! is armed. The cache copy must stay bit-identical to the remote copy, so
//! any cache write failure is fatal for the file being written.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::BoxFuture;
use object_store::buffered::BufWriter;
use parquet::arrow::async_writer::AsyncFileWriter;
use parquet::errors::ParquetError;
use tokio::io::AsyncWriteExt as _;

/// Captures the bytes the columnar writer emits during its finalize
/// window, so the footer can be stored in the catalog without re-reading
/// the remote file.
///
/// Cloning yields another handle onto the same buffer; the data-file
/// writer keeps one handle and arms it right before closing the columnar
/// writer.
#[derive(Debug, Clone, Default)]
pub struct FooterRecorder {
    inner: Arc<RecorderInner>,
}

#[derive(Debug, Default)]
struct RecorderInner {
    armed: AtomicBool,
    buf: Mutex<Vec<u8>>,
}

impl FooterRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording. Writes before this call are not captured.
    pub fn arm(&self) {
        self.inner.armed.store(true, Ordering::Release);
    }

    fn record(&self, bytes: &[u8]) {
        if self.inner.armed.load(Ordering::Acquire) {
            self.inner
                .buf
                .lock()
                .expect("recorder lock poisoned")
                .extend_from_slice(bytes);
        }
    }

    /// Stops recording and takes the captured bytes.
    pub fn take(&self) -> Vec<u8> {
        self.inner.armed.store(false, Ordering::Release);
        std::mem::take(&mut *self.inner.buf.lock().expect("recorder lock poisoned"))
    }
}

#[derive(Debug)]
struct CacheHandle {
    path: PathBuf,
    file: tokio::fs::File,
}

/// A parquet [`AsyncFileWriter`] that mirrors every write to a local cache
/// file and to the armed [`FooterRecorder`].
///
/// The cache handle is present only when the data store decided caching is
/// possible for this file (remote base path, cache enabled, disk space
/// above the gate). A short or failed write on any sink fails the write.
#[derive(Debug)]
pub struct CachedFileWriter {
    primary: BufWriter,
    cache: Option<CacheHandle>,
    recorder: FooterRecorder,
}

impl CachedFileWriter {
    pub(crate) fn new(primary: BufWriter, cache: Option<(PathBuf, tokio::fs::File)>) -> Self {
        Self {
            primary,
            cache: cache.map(|(path, file)| CacheHandle { path, file }),
            recorder: FooterRecorder::new(),
        }
    }

    /// A handle onto this writer's footer recorder.
    pub fn recorder(&self) -> FooterRecorder {
        self.recorder.clone()
    }

    /// The local cache path mirrored by this writer, if any.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache.as_ref().map(|c| c.path.as_path())
    }
}

impl AsyncFileWriter for CachedFileWriter {
    fn write(&mut self, bs: Bytes) -> BoxFuture<'_, parquet::errors::Result<()>> {
        Box::pin(async move {
            self.recorder.record(&bs);
            if let Some(cache) = &mut self.cache {
                cache.file.write_all(&bs).await.map_err(|source| {
                    external(CacheWriteError {
                        path: cache.path.clone(),
                        source,
                    })
                })?;
            }
            self.primary
                .write_all(&bs)
                .await
                .map_err(|source| external(PrimaryWriteError { source }))?;
            Ok(())
        })
    }

    fn complete(&mut self) -> BoxFuture<'_, parquet::errors::Result<()>> {
        Box::pin(async move {
            self.primary
                .shutdown()
                .await
                .map_err(|source| external(PrimaryWriteError { source }))?;
            if let Some(cache) = &mut self.cache {
                let sync = async {
                    cache.file.flush().await?;
                    cache.file.sync_all().await
                };
                sync.await.map_err(|source| {
                    external(CacheWriteError {
                        path: cache.path.clone(),
                        source,
                    })
                })?;
            }
            Ok(())
        })
    }
}

fn external(err: impl std::error::Error + Send + Sync + 'static) -> ParquetError {
    ParquetError::External(Box::new(err))
}

/// The local cache mirror diverged from the primary copy.
///
/// The current data file must be abandoned: a cache file that is not
/// bit-identical to the remote copy would poison every later cache-local
/// read.
#[derive(Debug, thiserror::Error)]
#[error("cache write failed for {path}")]
pub struct CacheWriteError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// The primary (object store) upload failed.
#[derive(Debug, thiserror::Error)]
#[error("object store write failed")]
pub struct PrimaryWriteError {
    #[source]
    source: std::io::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_captures_only_while_armed() {
        let recorder = FooterRecorder::new();
        recorder.record(b"before");
        recorder.arm();
        recorder.record(b"footer");
        recorder.record(b"PAR1");
        assert_eq!(recorder.take(), b"footerPAR1");

        // Taking disarms.
        recorder.record(b"after");
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn recorder_handles_share_state() {
        let a = FooterRecorder::new();
        let b = a.clone();
        b.arm();
        a.record(b"xyz");
        assert_eq!(b.take(), b"xyz");
    }
}
