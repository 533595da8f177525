//! Background indexing over a bounded queue.
//!
//! Producers call [`BackgroundIndexer::index`] and friends from synchronous
//! code; a full queue blocks the producer until the worker catches up. The
//! worker is a dedicated OS thread, so no async runtime is required. Calling
//! the enqueue methods from inside an async task is not supported (tokio's
//! blocking send panics there).

use std::sync::{Arc, Mutex};
use std::thread;

use strand_types::MessageId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{SearchError, SearchResult};
use crate::index::{DocMetadata, SearchIndex};

enum Job {
    Index {
        id: MessageId,
        content: String,
        metadata: DocMetadata,
    },
    Remove(MessageId),
    Flush(oneshot::Sender<()>),
}

pub struct BackgroundIndexer {
    index: Arc<SearchIndex>,
    sender: Option<mpsc::Sender<Job>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl BackgroundIndexer {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn spawn(index: Arc<SearchIndex>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Job>(capacity.max(1));
        let target = Arc::clone(&index);
        let worker = thread::Builder::new()
            .name("strand-indexer".into())
            .spawn(move || {
                info!("background indexer started");
                let mut indexed = 0u64;
                while let Some(job) = receiver.blocking_recv() {
                    match job {
                        Job::Index { id, content, metadata } => {
                            target.index(id, &content, metadata);
                            indexed += 1;
                        }
                        Job::Remove(id) => {
                            target.remove(&id);
                        }
                        Job::Flush(done) => {
                            debug!(indexed, "indexer flushed");
                            let _ = done.send(());
                        }
                    }
                }
                info!(indexed, "background indexer stopped");
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start indexer thread");
                None
            }
        };
        Self {
            index,
            sender: Some(sender),
            worker: Mutex::new(worker),
        }
    }

    /// The index this worker writes into.
    pub fn index_handle(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    pub fn index(&self, id: MessageId, content: impl Into<String>, metadata: DocMetadata) -> SearchResult<()> {
        self.send(Job::Index {
            id,
            content: content.into(),
            metadata,
        })
    }

    pub fn remove(&self, id: MessageId) -> SearchResult<()> {
        self.send(Job::Remove(id))
    }

    /// Block until every job enqueued before this call has been applied.
    pub fn flush(&self) -> SearchResult<()> {
        let (done, wait) = oneshot::channel();
        self.send(Job::Flush(done))?;
        wait.blocking_recv().map_err(|_| SearchError::IndexerClosed)
    }

    fn send(&self, job: Job) -> SearchResult<()> {
        if self.worker.lock().expect("lock poisoned").is_none() {
            return Err(SearchError::IndexerClosed);
        }
        let sender = self.sender.as_ref().ok_or(SearchError::IndexerClosed)?;
        sender.blocking_send(job).map_err(|_| SearchError::IndexerClosed)
    }
}

impl Drop for BackgroundIndexer {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.worker.lock().expect("lock poisoned").take() {
            if handle.join().is_err() {
                warn!("indexer thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for BackgroundIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundIndexer")
            .field("index", &self.index)
            .finish()
    }
}
