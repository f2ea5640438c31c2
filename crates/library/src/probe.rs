//! Bounded archive probing.
//!
//! Every listing and entry read goes through a [`Prober`], which caps how
//! many run at once and how long each may take.

use folio_archive::error::{ErrorKind, Result};
use folio_archive::{EntryInfo, ReaderHandle};
use exn::ResultExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Runs archive listings and entry reads with a concurrency ceiling and a
/// per-call timeout.
///
/// A call that times out returns to its caller, but the reader work behind
/// it keeps its permit until it finishes. Hung archives never push the
/// number of running reads past the ceiling.
#[derive(Clone)]
pub struct Prober {
    reader: ReaderHandle,
    permits: Arc<Semaphore>,
    timeout: Duration,
}
impl Prober {
    pub fn new(reader: ReaderHandle, max_concurrent: usize, timeout: Duration) -> Self {
        Self { reader, permits: Arc::new(Semaphore::new(max_concurrent.max(1))), timeout }
    }

    async fn bounded<T, F, Fut>(&self, archive: &Path, op: F) -> Result<T>
    where
        F: FnOnce(ReaderHandle, PathBuf) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits).acquire_owned().await.or_raise(|| ErrorKind::Task)?;
        let work = op(Arc::clone(&self.reader), archive.to_path_buf());
        let task = tokio::spawn(async move {
            let result = work.await;
            drop(permit);
            result
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined.or_raise(|| ErrorKind::Task)?,
            Err(_) => {
                warn!(archive = %archive.display(), timeout = ?self.timeout, "archive read timed out");
                exn::bail!(ErrorKind::TimedOut(archive.to_path_buf()))
            },
        }
    }

    pub async fn list(&self, archive: &Path) -> Result<Vec<EntryInfo>> {
        self.bounded(archive, |reader, archive| async move { reader.list(&archive).await }).await
    }

    pub async fn read(&self, archive: &Path, entry: &str) -> Result<Vec<u8>> {
        let entry = entry.to_string();
        self.bounded(archive, |reader, archive| async move { reader.read_entry(&archive, &entry).await }).await
    }
}
