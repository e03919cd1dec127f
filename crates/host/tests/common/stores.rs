//! Store wrappers that let tests pause, interleave, and fail operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use syncnote_protocol::{Document, DocumentPath};
use syncnote_store::{DocumentStore, MemoryStore, StoreError, Subscription};
use tokio::sync::{watch, Barrier, Semaphore};

/// A [`MemoryStore`] whose writes can be held and whose reads can rendezvous
pub struct GatedStore {
    pub inner: MemoryStore,
    hold_writes: AtomicBool,
    write_permits: Semaphore,
    waiting_writes: watch::Sender<usize>,
    read_barrier: Mutex<Option<Arc<Barrier>>>,
}

impl GatedStore {
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            hold_writes: AtomicBool::new(false),
            write_permits: Semaphore::new(0),
            waiting_writes: watch::channel(0).0,
            read_barrier: Mutex::new(None),
        })
    }

    /// Park every following write until [`Self::release_writes`]
    pub fn hold_writes(&self) {
        self.hold_writes.store(true, Ordering::SeqCst);
    }

    pub fn release_writes(&self, count: usize) {
        self.write_permits.add_permits(count);
    }

    /// Wait until `count` writes are parked
    pub async fn writes_parked(&self, count: usize) {
        let mut rx = self.waiting_writes.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    /// Make reads wait for each other after reading, `parties` at a time
    pub fn sync_reads(&self, parties: usize) {
        *self.read_barrier.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let doc = self.inner.get(path).await?;
        let barrier = self.read_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(doc)
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> Result<(), StoreError> {
        if self.hold_writes.load(Ordering::SeqCst) {
            self.waiting_writes.send_modify(|n| *n += 1);
            let permit = self.write_permits.acquire().await;
            self.waiting_writes.send_modify(|n| *n -= 1);
            permit
                .map_err(|_| StoreError::Unavailable("gate closed".into()))?
                .forget();
        }
        self.inner.set_merge(path, fields).await
    }

    fn subscribe(&self, path: &DocumentPath) -> Subscription {
        self.inner.subscribe(path)
    }
}

/// A [`MemoryStore`] whose reads or writes can be made to fail
pub struct FlakyStore {
    pub inner: MemoryStore,
    write_error: Mutex<Option<StoreError>>,
    read_error: Mutex<Option<StoreError>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            write_error: Mutex::new(None),
            read_error: Mutex::new(None),
        })
    }

    pub fn fail_writes(&self, error: Option<StoreError>) {
        *self.write_error.lock().unwrap() = error;
    }

    pub fn fail_reads(&self, error: Option<StoreError>) {
        *self.read_error.lock().unwrap() = error;
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let error = self.read_error.lock().unwrap().clone();
        match error {
            Some(error) => Err(error),
            None => self.inner.get(path).await,
        }
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> Result<(), StoreError> {
        let error = self.write_error.lock().unwrap().clone();
        match error {
            Some(error) => Err(error),
            None => self.inner.set_merge(path, fields).await,
        }
    }

    fn subscribe(&self, path: &DocumentPath) -> Subscription {
        self.inner.subscribe(path)
    }
}
