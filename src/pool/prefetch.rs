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

type ReadState<T> = Arc<RequestState<crate::Result<Block<T>>>>;

struct Job<T> {
    id: BlockId,
    state: ReadState<T>,
}

struct Inner<T> {
    manager: Arc<BlockManager>,
    block_len: usize,
    compression: CompressionType,
    capacity: usize,
    in_flight: Mutex<FxHashMap<BlockId, ReadState<T>>>,
}

/// Reads blocks ahead of the merge that will consume them.
///
/// A [`PrefetchPool::hint`] starts an asynchronous read; the later
/// [`PrefetchPool::read`] joins it, or falls back to a synchronous read if
/// the block was never hinted. Hints are advisory and silently dropped once
/// `capacity` reads are in flight.
pub struct PrefetchPool<T: Storable> {
    inner: Arc<Inner<T>>,
    tx: Mutex<Option<Sender<Job<T>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Storable> PrefetchPool<T> {
    /// Creates a pool with up to `capacity` in-flight reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(
        manager: Arc<BlockManager>,
        block_len: usize,
        compression: CompressionType,
        capacity: usize,
    ) -> crate::Result<Self> {
        let inner = Arc::new(Inner {
            manager,
            block_len,
            compression,
            capacity,
            in_flight: Mutex::new(FxHashMap::default()),
        });

        let (tx, rx) = mpsc::channel::<Job<T>>();

        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name("seqheap-prefetch".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let result = worker_inner
                        .manager
                        .read_slot(job.id)
                        .and_then(|bytes| Block::decode_slot(&bytes, worker_inner.block_len));
                    job.state.complete(result);
                }
            })?;

        Ok(Self {
            inner,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The block manager this pool reads from.
    #[must_use]
    pub fn manager(&self) -> &Arc<BlockManager> {
        &self.inner.manager
    }

    /// Element count per block.
    #[must_use]
    pub fn block_len(&self) -> usize {
        self.inner.block_len
    }

    /// Compression expected in the block slots.
    #[must_use]
    pub fn compression(&self) -> CompressionType {
        self.inner.compression
    }

    /// Suggests reading `id` soon.
    pub fn hint(&self, id: BlockId) {
        let state = {
            let mut in_flight = lock(&self.inner.in_flight);
            if in_flight.len() >= self.inner.capacity || in_flight.contains_key(&id) {
                return;
            }

            let state = RequestState::new();
            in_flight.insert(id, Arc::clone(&state));
            state
        };

        log::trace!("prefetch: hinting block {id}");

        let sent = match &*lock(&self.tx) {
            Some(tx) => tx.send(Job { id, state }).is_ok(),
            None => false,
        };

        if !sent {
            lock(&self.inner.in_flight).remove(&id);
        }
    }

    /// Reads block `id`, joining an in-flight prefetch if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the block is corrupt.
    pub fn read(&self, id: BlockId) -> crate::Result<Block<T>> {
        let pending = lock(&self.inner.in_flight).remove(&id);

        if let Some(state) = pending {
            log::trace!("prefetch: joining in-flight read of block {id}");
            return state.wait_take();
        }

        let bytes = self.inner.manager.read_slot(id)?;
        Block::decode_slot(&bytes, self.inner.block_len)
    }

    /// Discards a hint whose block will never be read (sequence teardown).
    pub fn forget(&self, id: BlockId) {
        lock(&self.inner.in_flight).remove(&id);
    }
}

impl<T: Storable> Drop for PrefetchPool<T> {
    fn drop(&mut self) {
        // closing the channel lets the worker drain and exit
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
