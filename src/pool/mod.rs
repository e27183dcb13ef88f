// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Asynchronous block I/O.
//!
//! Both pools wrap one background worker thread fed over a channel. The
//! queue borrows the pools (shared, behind `Arc`s) and must not assume it is
//! their sole client; their lifetime strictly encloses the queue's.

mod prefetch;
mod write;

pub use prefetch::PrefetchPool;
pub use write::{WritePool, WriteRequest};

use std::sync::{Arc, Condvar, Mutex};

/// Completion slot shared between a worker thread and one waiter.
pub(crate) struct RequestState<R> {
    slot: Mutex<Option<R>>,
    done: Condvar,
}

impl<R> RequestState<R> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            done: Condvar::new(),
        })
    }

    /// Publishes the result and wakes the waiter.
    pub(crate) fn complete(&self, value: R) {
        #[allow(clippy::expect_used)]
        let mut slot = self.slot.lock().expect("lock is poisoned");
        *slot = Some(value);
        self.done.notify_all();
    }

    /// Blocks until the result is published, then takes it.
    pub(crate) fn wait_take(&self) -> R {
        #[allow(clippy::expect_used)]
        let mut slot = self.slot.lock().expect("lock is poisoned");

        loop {
            if let Some(value) = slot.take() {
                return value;
            }

            #[allow(clippy::expect_used)]
            {
                slot = self.done.wait(slot).expect("lock is poisoned");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::{AllocPolicy, Block, BlockManager, CompressionType, Value};
    use std::sync::Arc;
    use test_log::test;

    #[test]
    fn pools_write_then_prefetch_roundtrip() {
        let block_len = 32;
        let manager =
            Arc::new(BlockManager::temporary(Block::<u64>::raw_size(block_len)).unwrap());

        let w_pool = WritePool::<u64>::new(
            Arc::clone(&manager),
            block_len,
            CompressionType::None,
            2,
        )
        .unwrap();
        let p_pool = PrefetchPool::<u64>::new(
            Arc::clone(&manager),
            block_len,
            CompressionType::None,
            2,
        )
        .unwrap();

        let ids = manager.new_blocks(AllocPolicy::Recycle, 1);

        let mut block = w_pool.get_buffer();
        for (i, item) in block.items_mut().iter_mut().enumerate() {
            *item = i as u64;
        }
        w_pool.write(block, ids[0]).unwrap();

        // make the pending write observable before reading it back
        if let Some(req) = w_pool.get_request(ids[0]) {
            req.wait().unwrap();
        }

        let read = p_pool.read(ids[0]).unwrap();
        for i in 0..block_len {
            assert_eq!(i as u64, read[i]);
        }
    }

    #[test]
    fn prefetch_hint_then_read() {
        let block_len = 8;
        let manager =
            Arc::new(BlockManager::temporary(Block::<u32>::raw_size(block_len)).unwrap());

        let w_pool =
            WritePool::<u32>::new(Arc::clone(&manager), block_len, CompressionType::None, 1)
                .unwrap();
        let p_pool =
            PrefetchPool::<u32>::new(Arc::clone(&manager), block_len, CompressionType::None, 4)
                .unwrap();

        let ids = manager.new_blocks(AllocPolicy::Recycle, 1);

        let mut block = w_pool.get_buffer();
        block.items_mut()[0] = 42;
        w_pool.write(block, ids[0]).unwrap();
        if let Some(req) = w_pool.get_request(ids[0]) {
            req.wait().unwrap();
        }

        p_pool.hint(ids[0]);
        let read = p_pool.read(ids[0]).unwrap();
        assert_eq!(42, read[0]);

        // a forgotten hint must not leak into later reads
        p_pool.hint(ids[0]);
        p_pool.forget(ids[0]);
        let read = p_pool.read(ids[0]).unwrap();
        assert_eq!(42, read[0]);
    }

    #[test]
    fn sentinel_padding_survives_roundtrip() {
        let block_len = 4;
        let manager =
            Arc::new(BlockManager::temporary(Block::<u64>::raw_size(block_len)).unwrap());

        let w_pool =
            WritePool::<u64>::new(Arc::clone(&manager), block_len, CompressionType::None, 1)
                .unwrap();
        let p_pool =
            PrefetchPool::<u64>::new(Arc::clone(&manager), block_len, CompressionType::None, 1)
                .unwrap();

        let ids = manager.new_blocks(AllocPolicy::Recycle, 1);

        // right-aligned fill: the first half stays sentinel
        let mut block = w_pool.get_buffer();
        block.items_mut()[2] = 1;
        block.items_mut()[3] = 2;
        w_pool.write(block, ids[0]).unwrap();
        if let Some(req) = w_pool.get_request(ids[0]) {
            req.wait().unwrap();
        }

        let read = p_pool.read(ids[0]).unwrap();
        assert_eq!(u64::sentinel(), read[0]);
        assert_eq!(u64::sentinel(), read[1]);
        assert_eq!(1, read[2]);
        assert_eq!(2, read[3]);
    }
}
