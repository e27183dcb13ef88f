// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::RequestState;
use crate::{Block, BlockId, BlockManager, CompressionType, Storable};
use rustc_hash::FxHashMap;
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread::JoinHandle;

type WriteState = Arc<RequestState<crate::Result<()>>>;

/// Handle to one pending asynchronous block write.
pub struct WriteRequest(WriteState);

impl WriteRequest {
    /// Blocks until the write has hit the backing file.
    ///
    /// # Errors
    ///
    /// Surfaces the write's I/O error unchanged.
    pub fn wait(self) -> crate::Result<()> {
        self.0.wait_take()
    }
}

struct Job<T> {
    block: Block<T>,
    id: BlockId,
    state: WriteState,
}

struct Inner<T> {
    manager: Arc<BlockManager>,
    compression: CompressionType,
    buffers: Mutex<Vec<Block<T>>>,
    pending: Mutex<FxHashMap<BlockId, WriteState>>,
}

/// Writes blocks in the background while the merge keeps producing.
///
/// Buffers are pooled: [`WritePool::get_buffer`] hands one out,
/// and completed writes put theirs back.
pub struct WritePool<T: Storable> {
    inner: Arc<Inner<T>>,
    tx: Mutex<Option<Sender<Job<T>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    block_len: usize,
}

impl<T: Storable> WritePool<T> {
    /// Creates a pool with `buffers` pre-allocated block buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(
        manager: Arc<BlockManager>,
        block_len: usize,
        compression: CompressionType,
        buffers: usize,
    ) -> crate::Result<Self> {
        let inner = Arc::new(Inner {
            manager,
            compression,
            buffers: Mutex::new((0..buffers).map(|_| Block::new(block_len)).collect()),
            pending: Mutex::new(FxHashMap::default()),
        });

        let (tx, rx) = mpsc::channel::<Job<T>>();

        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name("seqheap-write".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let result = job
                        .block
                        .encode_slot(worker_inner.compression)
                        .and_then(|bytes| worker_inner.manager.write_slot(job.id, &bytes));

                    lock(&worker_inner.buffers).push(job.block);

                    // the slot is durable before the pending entry disappears,
                    // so a get_request miss always means the data is on disk
                    lock(&worker_inner.pending).remove(&job.id);
                    job.state.complete(result);
                }
            })?;

        Ok(Self {
            inner,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            block_len,
        })
    }

    /// The block manager this pool writes to.
    #[must_use]
    pub fn manager(&self) -> &Arc<BlockManager> {
        &self.inner.manager
    }

    /// Element count per block.
    #[must_use]
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Compression applied to the block slots.
    #[must_use]
    pub fn compression(&self) -> CompressionType {
        self.inner.compression
    }

    /// Hands out a free block buffer, allocating if the pool ran dry.
    #[must_use]
    pub fn get_buffer(&self) -> Block<T> {
        lock(&self.inner.buffers)
            .pop()
            .unwrap_or_else(|| Block::new(self.block_len))
    }

    /// Enqueues an asynchronous write of `block` to slot `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool has already shut down.
    pub fn write(&self, block: Block<T>, id: BlockId) -> crate::Result<()> {
        debug_assert_eq!(block.len(), self.block_len);

        let state = RequestState::new();
        lock(&self.inner.pending).insert(id, Arc::clone(&state));

        let sent = match &*lock(&self.tx) {
            Some(tx) => tx.send(Job { block, id, state }).is_ok(),
            None => false,
        };

        if sent {
            Ok(())
        } else {
            lock(&self.inner.pending).remove(&id);
            Err(crate::Error::Io(std::io::Error::other(
                "write pool has shut down",
            )))
        }
    }

    /// Returns a waitable handle if a write for `id` is still pending.
    ///
    /// The handle is handed out at most once per write; `None` means the
    /// block is already on disk (or was never written through this pool).
    #[must_use]
    pub fn get_request(&self, id: BlockId) -> Option<WriteRequest> {
        lock(&self.inner.pending).remove(&id).map(WriteRequest)
    }
}

impl<T: Storable> Drop for WritePool<T> {
    fn drop(&mut self) {
        // closing the channel lets the worker finish all queued writes
        drop(lock(&self.tx).take());

        if let Some(worker) = lock(&self.worker).take() {
            let _ = worker.join();
        }
    }
}

#[allow(clippy::expect_used)]
fn lock<M>(mutex: &Mutex<M>) -> std::sync::MutexGuard<'_, M> {
    mutex.lock().expect("lock is poisoned")
}
