use crate::classifier::{SizeClass, SizeClassifier};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::paths::{response_file_name, unix_ms, PARTIAL_SUFFIX};
use relay_protocol::{LargeResultMarker, ResponseFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;

/// A payload offloaded to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub format: ResponseFormat,
    pub created_at: SystemTime,
    pub ttl: Duration,
}

impl ResponseFile {
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.created_at + self.ttl
    }

    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at() <= now
    }

    #[must_use]
    pub fn marker(&self) -> LargeResultMarker {
        LargeResultMarker::new(
            self.path.display().to_string(),
            self.size_bytes,
            self.format,
        )
    }
}

/// Result of [`ResponseStore::offload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPayload {
    Inline(Arc<[u8]>),
    Offloaded(ResponseFile),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub skipped_in_use: usize,
    pub bytes_freed: u64,
}

struct TrackedFile {
    file: ResponseFile,
    open_readers: usize,
    last_access: SystemTime,
}

#[derive(Default)]
struct StoreState {
    files: HashMap<PathBuf, TrackedFile>,
}

struct StoreInner {
    config: StoreConfig,
    classifier: SizeClassifier,
    state: Mutex<StoreState>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// File-backed storage for offloaded payloads with TTL garbage collection and range reads.
///
/// Cloning is cheap; clones share bookkeeping, so a sweeper task and request handlers see the
/// same open-reader counts.
#[derive(Clone)]
pub struct ResponseStore {
    inner: Arc<StoreInner>,
}

impl ResponseStore {
    /// Creates the store directory and picks up responses left by a previous run.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let classifier = SizeClassifier::new(config.inline_max_bytes)?;
        tokio::fs::create_dir_all(&config.dir).await?;
        let dir = tokio::fs::canonicalize(&config.dir).await?;
        let config = StoreConfig { dir, ..config };

        let (shutdown, _) = watch::channel(false);
        let store = Self {
            inner: Arc::new(StoreInner {
                config,
                classifier,
                state: Mutex::new(StoreState::default()),
                closed: AtomicBool::new(false),
                shutdown,
            }),
        };
        let restored = store.rehydrate().await?;
        log::debug!(
            "response store opened at {} ({restored} existing files)",
            store.dir().display()
        );
        Ok(store)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.inner.config.dir
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn classifier(&self) -> SizeClassifier {
        self.inner.classifier
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stops accepting writes and signals every sweeper spawned from this store.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let _ = self.inner.shutdown.send(true);
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// Number of files currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the payload inline when it is small enough, otherwise writes it to disk.
    pub async fn offload(
        &self,
        tree_id: &str,
        payload: Vec<u8>,
        format: ResponseFormat,
    ) -> Result<StoredPayload> {
        match self.inner.classifier.classify_bytes(&payload) {
            SizeClass::Inline => Ok(StoredPayload::Inline(payload.into())),
            SizeClass::Offload => {
                let file = self.store(tree_id, &payload, format).await?;
                log::info!(
                    "offloaded {} bytes for {tree_id} to {}",
                    file.size_bytes,
                    file.path.display()
                );
                Ok(StoredPayload::Offloaded(file))
            }
        }
    }

    /// Writes `payload` to a fresh file. A failed write leaves nothing behind.
    pub async fn store(
        &self,
        tree_id: &str,
        payload: &[u8],
        format: ResponseFormat,
    ) -> Result<ResponseFile> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let created_at = SystemTime::now();
        let name = response_file_name(tree_id, unix_ms(created_at), format);
        self.persist(&name, payload, format, created_at).await
    }

    /// Writes `{name}.partial`, renames it to `name` and starts tracking the result. The
    /// partial file is removed before returning on any failure.
    async fn persist(
        &self,
        name: &str,
        payload: &[u8],
        format: ResponseFormat,
        created_at: SystemTime,
    ) -> Result<ResponseFile> {
        let path = self.dir().join(name);
        let tmp = self.dir().join(format!("{name}{PARTIAL_SUFFIX}"));

        if let Err(err) = write_then_rename(&tmp, &path, payload).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            log::warn!("response write to {} failed: {err}", path.display());
            return Err(err.into());
        }

        let file = ResponseFile {
            path: path.clone(),
            size_bytes: payload.len() as u64,
            format,
            created_at,
            ttl: self.inner.config.ttl,
        };
        self.state().files.insert(
            path,
            TrackedFile {
                file: file.clone(),
                open_readers: 0,
                last_access: created_at,
            },
        );
        Ok(file)
    }

    /// Reads up to `length` bytes at `offset` without loading the whole file.
    ///
    /// Reads past the end return the available tail (possibly empty). `length` is clamped to
    /// the configured `max_range_bytes`.
    pub async fn read_range(&self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        let path = self.resolve(path)?;
        let _reader = self.acquire_reader(&path)?;

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.display().to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let length = length.min(self.inner.config.max_range_bytes);
        let mut buf = Vec::with_capacity(usize::try_from(length).unwrap_or(0).min(64 * 1024));
        file.take(length).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Looks up a tracked file.
    #[must_use]
    pub fn stat(&self, path: &Path) -> Option<ResponseFile> {
        let path = self.resolve(path).ok()?;
        self.state().files.get(&path).map(|tracked| tracked.file.clone())
    }

    /// Removes expired files that no reader holds, plus stale partial writes.
    pub async fn sweep(&self, now: SystemTime) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut doomed: Vec<ResponseFile> = Vec::new();
        {
            let mut state = self.state();
            report.scanned = state.files.len();
            state.files.retain(|_, tracked| {
                if !tracked.file.is_expired(now) {
                    return true;
                }
                if tracked.open_readers > 0 {
                    report.skipped_in_use += 1;
                    return true;
                }
                doomed.push(tracked.file.clone());
                false
            });
        }

        for file in doomed {
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    report.removed += 1;
                    report.bytes_freed += file.size_bytes;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    report.removed += 1;
                }
                Err(err) => log::warn!("sweep: remove {} failed: {err}", file.path.display()),
            }
        }

        report.removed += self.sweep_untracked(now).await?;

        if report.removed > 0 || report.skipped_in_use > 0 {
            log::info!(
                "sweep removed {} files ({} bytes), {} still in use",
                report.removed,
                report.bytes_freed,
                report.skipped_in_use
            );
        }
        Ok(report)
    }

    /// Partial writes of a crashed process and expired files nobody tracks.
    async fn sweep_untracked(&self, now: SystemTime) -> Result<usize> {
        let ttl = self.inner.config.ttl;
        let mut removed = 0usize;
        let mut entries = tokio::fs::read_dir(self.dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_partial = name.ends_with(PARTIAL_SUFFIX);
            if !is_partial && ResponseFormat::from_file_name(name).is_none() {
                continue;
            }
            if !is_partial && self.state().files.contains_key(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified + ttl > now {
                continue;
            }
            if tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn rehydrate(&self) -> Result<usize> {
        let ttl = self.inner.config.ttl;
        let mut restored = 0usize;
        let mut entries = tokio::fs::read_dir(self.dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(format) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(ResponseFormat::from_file_name)
            else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let created_at = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            self.state().files.insert(
                path.clone(),
                TrackedFile {
                    file: ResponseFile {
                        path,
                        size_bytes: meta.len(),
                        format,
                        created_at,
                        ttl,
                    },
                    open_readers: 0,
                    last_access: created_at,
                },
            );
            restored += 1;
        }
        Ok(restored)
    }

    /// Accepts only plain file names directly inside the store directory.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let outside = || StoreError::OutsideStore(path.display().to_string());
        let name = path.file_name().ok_or_else(outside)?;
        let parent = path.parent().ok_or_else(outside)?;
        if parent != self.dir() {
            return Err(outside());
        }
        Ok(self.dir().join(name))
    }

    fn acquire_reader(&self, path: &Path) -> Result<ReaderGuard> {
        let mut state = self.state();
        let tracked = state
            .files
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.display().to_string()))?;
        tracked.open_readers += 1;
        tracked.last_access = SystemTime::now();
        Ok(ReaderGuard {
            store: self.clone(),
            path: path.to_path_buf(),
        })
    }

    /// Last time a reader touched `path`.
    #[must_use]
    pub fn last_access(&self, path: &Path) -> Option<SystemTime> {
        let path = self.resolve(path).ok()?;
        self.state().files.get(&path).map(|tracked| tracked.last_access)
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

struct ReaderGuard {
    store: ResponseStore,
    path: PathBuf,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        if let Some(tracked) = self.store.state().files.get_mut(&self.path) {
            tracked.open_readers = tracked.open_readers.saturating_sub(1);
        }
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, payload: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(tmp, payload).await?;
    tokio::fs::rename(tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(temp: &TempDir, inline_max_bytes: u64) -> ResponseStore {
        ResponseStore::open(StoreConfig {
            inline_max_bytes,
            ..StoreConfig::in_dir(temp.path().join("responses"))
        })
        .await
        .expect("open store")
    }

    #[tokio::test]
    async fn store_writes_named_file() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        let file = store
            .store("../evil/tree", b"{\"a\":1}", ResponseFormat::Json)
            .await
            .unwrap();
        assert_eq!(file.size_bytes, 7);
        assert_eq!(file.path.parent(), Some(store.dir()));
        let name = file.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("_._evil_tree-"), "{name}");
        assert_eq!(tokio::fs::read(&file.path).await.unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn failed_rename_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        store
            .store("tree", b"kept", ResponseFormat::Json)
            .await
            .unwrap();

        // A non-empty directory where the response should land: the partial write succeeds and
        // the rename onto it fails.
        let target = store.dir().join("blocked.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("inside"), b"x").unwrap();

        let err = store
            .persist("blocked.json", b"payload", ResponseFormat::Json, SystemTime::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IoError(_)), "{err}");

        let partials: Vec<String> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(PARTIAL_SUFFIX))
            .collect();
        assert!(partials.is_empty(), "{partials:?}");
        assert_eq!(store.len(), 1);
        assert!(store.stat(&target).is_none());
    }

    #[tokio::test]
    async fn offload_respects_threshold() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 8).await;

        let small = store
            .offload("t", b"1234567".to_vec(), ResponseFormat::Json)
            .await
            .unwrap();
        assert!(matches!(small, StoredPayload::Inline(ref bytes) if bytes.len() == 7));
        assert!(store.is_empty());

        let large = store
            .offload("t", b"12345678".to_vec(), ResponseFormat::Json)
            .await
            .unwrap();
        let StoredPayload::Offloaded(file) = large else {
            panic!("expected offload");
        };
        assert_eq!(file.marker().status, "large_result");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn read_range_reads_slices_and_tail() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        let file = store
            .store("t", b"0123456789", ResponseFormat::Text)
            .await
            .unwrap();

        assert_eq!(store.read_range(&file.path, 2, 3).await.unwrap(), b"234");
        assert_eq!(store.read_range(&file.path, 8, 100).await.unwrap(), b"89");
        assert!(store.read_range(&file.path, 50, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_range_rejects_foreign_paths() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        let err = store
            .read_range(Path::new("/etc/passwd"), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OutsideStore(_)));

        let sneaky = store.dir().join("..").join("x.json");
        assert!(matches!(
            store.read_range(&sneaky, 0, 1).await.unwrap_err(),
            StoreError::OutsideStore(_)
        ));
    }

    #[tokio::test]
    async fn sweep_removes_expired_and_keeps_fresh() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        let file = store.store("t", b"abc", ResponseFormat::Json).await.unwrap();

        let report = store.sweep(SystemTime::now()).await.unwrap();
        assert_eq!(report.removed, 0);
        assert!(file.path.exists());

        let later = file.expires_at();
        let report = store.sweep(later).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.bytes_freed, 3);
        assert!(!file.path.exists());

        let err = store.read_range(&file.path, 0, 3).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn sweep_skips_files_with_open_readers() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        let file = store.store("t", b"abc", ResponseFormat::Json).await.unwrap();

        let guard = store.acquire_reader(&file.path).unwrap();
        let report = store.sweep(file.expires_at()).await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.skipped_in_use, 1);
        assert!(file.path.exists());

        drop(guard);
        let report = store.sweep(file.expires_at()).await.unwrap();
        assert_eq!(report.removed, 1);
    }

    #[tokio::test]
    async fn sweep_removes_stale_partials() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        let partial = store.dir().join("t-1-00.json.partial");
        tokio::fs::write(&partial, b"half").await.unwrap();

        let report = store
            .sweep(SystemTime::now() + store.config().ttl + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(report.removed, 1);
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn reopen_restores_existing_files() {
        let temp = TempDir::new().unwrap();
        let path = {
            let store = open_store(&temp, 16).await;
            store
                .store("t", b"keep", ResponseFormat::Json)
                .await
                .unwrap()
                .path
        };
        let store = open_store(&temp, 16).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.read_range(&path, 0, 4).await.unwrap(), b"keep");
    }

    #[tokio::test]
    async fn closed_store_rejects_writes() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 16).await;
        store.close();
        assert!(matches!(
            store.store("t", b"x", ResponseFormat::Json).await,
            Err(StoreError::Closed)
        ));
    }
}
