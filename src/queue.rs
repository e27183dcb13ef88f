// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The queue coordinator: level cascade, deletion buffers, promotion.

#![allow(clippy::indexing_slicing)]

use crate::{
    block::{Block, BlockManager},
    ext_merger::ExtMerger,
    insert_heap::InsertHeap,
    loser_tree::LoserTree,
    merge::{merge2, merge3, merge4},
    pool::{PrefetchPool, WritePool},
    Config, Storable,
};
use std::sync::Arc;

/// An external-memory priority queue.
///
/// Elements come back out in ascending [`Ord`] order. The queue is a
/// single-threaded, non-reentrant object; concurrency exists only at the
/// I/O boundary inside the two pools it borrows.
///
/// `push` and `pop` may block on disk whenever a buffer refill, a promotion
/// across the internal/external boundary, or a block boundary inside an
/// external merger is crossed.
pub struct PriorityQueue<T: Storable> {
    config: Config,

    /// Internal mergers, levels `0..int_levels`
    itree: Vec<LoserTree<T>>,

    /// External mergers, levels `int_levels..`
    etree: Vec<ExtMerger<T>>,

    /// One delete buffer per level (extra slot for the sentinel)
    buffer2: Vec<Vec<T>>,
    min2: Vec<usize>,

    /// Overall delete buffer
    buffer1: Vec<T>,
    min1: usize,

    insert_heap: InsertHeap<T>,

    /// How many levels are active
    active_levels: usize,

    /// Total size not counting the insert heap and buffer1
    inner_len: u64,
}

impl<T: Storable> PriorityQueue<T> {
    /// Creates a queue on top of two shared I/O pools.
    ///
    /// Both pools must be built over the same block manager and the same
    /// block length as `config.block_len`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid or does not match the pools.
    #[must_use]
    pub fn new(
        config: Config,
        p_pool: Arc<PrefetchPool<T>>,
        w_pool: Arc<WritePool<T>>,
    ) -> Self {
        config.validate();
        assert_eq!(config.block_len, p_pool.block_len());
        assert_eq!(config.block_len, w_pool.block_len());
        debug_assert!(Arc::ptr_eq(p_pool.manager(), w_pool.manager()));

        let sentinel = T::sentinel();
        let levels = config.levels();
        let manager = Arc::clone(w_pool.manager());

        Self {
            itree: (0..config.int_levels)
                .map(|_| LoserTree::new(config.int_arity))
                .collect(),
            etree: (0..config.ext_levels)
                .map(|_| {
                    ExtMerger::new(
                        config.ext_arity,
                        config.block_len,
                        config.alloc,
                        Arc::clone(&manager),
                        Arc::clone(&p_pool),
                        Arc::clone(&w_pool),
                    )
                })
                .collect(),
            buffer2: (0..levels)
                .map(|_| vec![sentinel.clone(); config.run_length + 1])
                .collect(),
            min2: vec![config.run_length; levels],
            buffer1: vec![sentinel; config.buffer1_size + 1],
            min1: config.buffer1_size,
            insert_heap: InsertHeap::with_capacity(config.run_length),
            active_levels: 0,
            inner_len: 0,
            config,
        }
    }

    /// Creates a queue with its own temporary block store and private pools.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file or the pool workers cannot be
    /// created.
    pub fn open_temp(config: Config) -> crate::Result<Self> {
        config.validate();

        let manager = Arc::new(BlockManager::temporary(Block::<T>::raw_size(
            config.block_len,
        ))?);

        let p_pool = Arc::new(PrefetchPool::new(
            Arc::clone(&manager),
            config.block_len,
            config.compression,
            config.prefetch_slots,
        )?);

        let w_pool = Arc::new(WritePool::new(
            manager,
            config.block_len,
            config.compression,
            config.write_buffers,
        )?);

        Ok(Self::new(config, p_pool, w_pool))
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner_len + self.insert_heap.len() as u64 + self.size1() as u64
    }

    /// Returns `true` if the queue holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate internal memory consumption in bytes.
    ///
    /// After draining the queue this returns to its construction-time
    /// baseline; anything above that is live segment storage.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        let fixed_buffers = (self.config.buffer1_size
            + 1
            + self.config.levels() * (self.config.run_length + 1))
            * std::mem::size_of::<T>();

        std::mem::size_of::<Self>()
            + fixed_buffers
            + self.insert_heap.mem_cons()
            + self.itree.iter().map(LoserTree::mem_cons).sum::<usize>()
            + self.etree.iter().map(ExtMerger::mem_cons).sum::<usize>()
    }

    /// Borrows the smallest element, or `None` if the queue is empty.
    #[must_use]
    pub fn top(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }

        let buffer_head = &self.buffer1[self.min1];

        match self.insert_heap.min() {
            Some(heap_head) if heap_head < buffer_head => Some(heap_head),
            _ => Some(buffer_head),
        }
    }

    /// Inserts one element.
    ///
    /// The sentinel value (see [`Value::sentinel`](crate::Value::sentinel))
    /// is reserved and must not be pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if spilling a full insert heap to disk fails.
    pub fn push(&mut self, value: T) -> crate::Result<()> {
        debug_assert!(value != T::sentinel(), "the sentinel cannot be pushed");

        if self.insert_heap.is_full() {
            self.empty_insert_heap()?;
        }

        self.insert_heap.push(value);
        Ok(())
    }

    /// Removes and returns the smallest element, or `None` if the queue is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer refill had to touch disk and failed.
    pub fn pop(&mut self) -> crate::Result<Option<T>> {
        if self.is_empty() {
            return Ok(None);
        }

        let from_heap = match self.insert_heap.min() {
            Some(heap_head) => heap_head < &self.buffer1[self.min1],
            None => false,
        };

        if from_heap {
            return Ok(self.insert_heap.pop_min());
        }

        debug_assert!(self.min1 < self.config.buffer1_size);
        let value = self.buffer1[self.min1].clone();
        self.min1 += 1;

        if self.min1 == self.config.buffer1_size {
            self.refill_buffer1()?;
        }

        Ok(Some(value))
    }

    /// Residual element count of buffer1.
    fn size1(&self) -> usize {
        self.config.buffer1_size - self.min1
    }

    /// Residual element count of buffer2\[level\].
    fn size2(&self, level: usize) -> usize {
        self.config.run_length - self.min2[level]
    }

    fn merger_len(&self, level: usize) -> u64 {
        if level < self.config.int_levels {
            self.itree[level].len()
        } else {
            self.etree[level - self.config.int_levels].len()
        }
    }

    /// Tops up buffer2\[level\] from its merger; returns the new residual.
    fn refill_buffer2(&mut self, level: usize) -> crate::Result<usize> {
        log::trace!("refill_buffer2({level})");

        let n = self.config.run_length;
        let tree_len = self.merger_len(level);
        let residual = self.size2(level);

        let (target, fill) = if tree_len + residual as u64 >= n as u64 {
            // buffer will be filled completely
            (0, n - residual)
        } else {
            (n - tree_len as usize - residual, tree_len as usize)
        };

        // slide the residual to the front of its new window (overlap-safe:
        // the target never lies right of the current position)
        let from = self.min2[level];
        debug_assert!(target <= from);
        if target != from {
            let buffer = &mut self.buffer2[level];
            for i in 0..residual {
                buffer[target + i] = buffer[from + i].clone();
            }
        }
        self.min2[level] = target;

        let start = target + residual;
        if level < self.config.int_levels {
            self.itree[level].multi_merge(&mut self.buffer2[level][start..start + fill]);
        } else {
            self.etree[level - self.config.int_levels]
                .multi_merge(&mut self.buffer2[level][start..start + fill])?;
        }

        Ok(residual + fill)
    }

    /// Moves elements from the level buffers into the overall delete buffer.
    fn refill_buffer1(&mut self) -> crate::Result<()> {
        log::trace!("refill_buffer1(), {} active levels", self.active_levels);

        let b1 = self.config.buffer1_size;
        let mut total: u64 = 0;

        let mut level = self.active_levels;
        while level > 0 {
            level -= 1;

            if self.size2(level) < b1 {
                let sz = self.refill_buffer2(level)?;

                // topmost active level dry now?
                if sz == 0 && level == self.active_levels - 1 {
                    self.active_levels -= 1;
                } else {
                    total += sz as u64;
                }
            } else {
                // actually only a sufficient lower bound
                total += b1 as u64;
            }
        }

        let sz = if total >= b1 as u64 {
            self.inner_len -= b1 as u64;
            b1
        } else {
            // mergers and level buffers run empty
            debug_assert_eq!(self.inner_len, total);
            self.inner_len = 0;
            total as usize
        };

        let min1 = b1 - sz;
        self.min1 = min1;

        // the simplified merge routines below find everything they are
        // asked for in the level buffers
        match self.active_levels {
            0 => {}
            1 => {
                let m = self.min2[0];
                self.buffer1[min1..min1 + sz]
                    .clone_from_slice(&self.buffer2[0][m..m + sz]);
                self.min2[0] += sz;
            }
            2 => {
                let mut c0 = self.min2[0];
                let mut c1 = self.min2[1];
                merge2(
                    &self.buffer2[0],
                    &mut c0,
                    &self.buffer2[1],
                    &mut c1,
                    &mut self.buffer1[min1..min1 + sz],
                );
                self.min2[0] = c0;
                self.min2[1] = c1;
            }
            3 => {
                let mut c0 = self.min2[0];
                let mut c1 = self.min2[1];
                let mut c2 = self.min2[2];
                merge3(
                    &self.buffer2[0],
                    &mut c0,
                    &self.buffer2[1],
                    &mut c1,
                    &self.buffer2[2],
                    &mut c2,
                    &mut self.buffer1[min1..min1 + sz],
                );
                self.min2[0] = c0;
                self.min2[1] = c1;
                self.min2[2] = c2;
            }
            4 => {
                let mut c0 = self.min2[0];
                let mut c1 = self.min2[1];
                let mut c2 = self.min2[2];
                let mut c3 = self.min2[3];
                merge4(
                    &self.buffer2[0],
                    &mut c0,
                    &self.buffer2[1],
                    &mut c1,
                    &self.buffer2[2],
                    &mut c2,
                    &self.buffer2[3],
                    &mut c3,
                    &mut self.buffer1[min1..min1 + sz],
                );
                self.min2[0] = c0;
                self.min2[1] = c1;
                self.min2[2] = c2;
                self.min2[3] = c3;
            }
            _ => panic!("the delete buffer refill merges at most four active levels"),
        }

        Ok(())
    }

    /// Ensures the merger at `level` can accept one more segment, promoting
    /// levels upward as needed. Returns the level where space was found.
    fn make_space_available(&mut self, level: usize) -> crate::Result<usize> {
        log::trace!("make_space_available({level})");

        let levels = self.config.levels();
        let il = self.config.int_levels;

        debug_assert!(level < levels);
        debug_assert!(level <= self.active_levels);

        if level == self.active_levels {
            self.active_levels += 1;
        }

        let available = if level < il {
            self.itree[level].space_available()
        } else {
            self.etree[level - il].space_available()
        };

        if available {
            return Ok(level);
        }

        if level + 1 == levels {
            // no outer level left to spill into; the outermost merger keeps
            // accepting sequences beyond its arity, trading merge fan-in
            // for capacity
            log::warn!(
                "outermost external merger exceeds its configured arity; \
                 the queue was sized too small for this workload"
            );
            return Ok(level);
        }

        let final_level = self.make_space_available(level + 1)?;

        if level + 1 < il {
            // internal -> internal
            let seg_len = self.itree[level].len() as usize;
            let mut seg = vec![T::sentinel(); seg_len + 1];
            self.itree[level].multi_merge(&mut seg[..seg_len]);
            self.itree[level + 1].insert_segment(seg.into_boxed_slice(), seg_len);
        } else if level + 1 == il {
            // internal -> external, crossing the memory boundary
            let seg_len = self.itree[level].len();
            self.etree[0].insert_segment(&mut self.itree[level], seg_len)?;
        } else {
            // external -> external
            let e = level - il;
            let seg_len = self.etree[e].len();
            let (left, right) = self.etree.split_at_mut(e + 1);
            right[0].insert_segment(&mut left[e], seg_len)?;
        }

        log::debug!("promoted level {level} into level {}", level + 1);

        Ok(final_level)
    }

    /// Sorts the full insert heap into a fresh run and feeds it to level 0,
    /// refreshing buffer1 and buffer2\[0\] with the overall smallest
    /// elements on the way.
    fn empty_insert_heap(&mut self) -> crate::Result<()> {
        log::trace!("empty_insert_heap()");

        let n = self.config.run_length;
        let b1 = self.config.buffer1_size;
        let sentinel = T::sentinel();

        debug_assert!(self.insert_heap.is_full());

        // destructively sort the heap into a run
        let mut run = Vec::with_capacity(n + 1);
        while let Some(value) = self.insert_heap.pop_min() {
            run.push(value);
        }
        debug_assert_eq!(n, run.len());
        run.push(sentinel.clone());

        // snapshot the residuals of buffer1 and buffer2[0], right-aligned
        let s1 = self.size1();
        let s2 = self.size2(0);
        let scratch_len = n + b1;
        let mut scratch = vec![sentinel.clone(); scratch_len + 1];
        let start = scratch_len - s1 - s2;
        scratch[start..start + s1]
            .clone_from_slice(&self.buffer1[self.min1..self.min1 + s1]);
        scratch[start + s1..start + s1 + s2]
            .clone_from_slice(&self.buffer2[0][self.min2[0]..self.min2[0] + s2]);

        let mut sc = start;
        let mut rc = 0;

        // refill buffer1, then buffer2[0], with the overall smallest elements
        let min1 = self.min1;
        merge2(
            &scratch,
            &mut sc,
            &run,
            &mut rc,
            &mut self.buffer1[min1..min1 + s1],
        );
        let m2 = self.min2[0];
        merge2(
            &scratch,
            &mut sc,
            &run,
            &mut rc,
            &mut self.buffer2[0][m2..m2 + s2],
        );

        // what is left of scratch and run forms the new segment
        let mut seg = vec![sentinel.clone(); n + 1];
        merge2(&scratch, &mut sc, &run, &mut rc, &mut seg[..n]);
        let mut seg_len = n;

        let free_level = self.make_space_available(0)?;
        debug_assert!(free_level == 0 || self.itree[0].is_empty());

        // level buffers below the freed level could otherwise hide elements
        // that are smaller than segments arriving above them; fold them into
        // the new segment, which keeps the whole drain within the one slot
        // that make_space_available reserved
        if free_level > 0 {
            for level in 1..=free_level {
                let sz = self.size2(level);
                if sz == 0 {
                    continue;
                }

                let mut merged = vec![sentinel.clone(); seg_len + sz + 1];
                let mut a = 0;
                let mut b = self.min2[level];
                merge2(
                    &seg,
                    &mut a,
                    &self.buffer2[level],
                    &mut b,
                    &mut merged[..seg_len + sz],
                );

                seg = merged;
                seg_len += sz;
                self.min2[level] = n;
            }
        }

        self.itree[0].insert_segment(seg.into_boxed_slice(), seg_len);

        self.inner_len += n as u64;

        // special case if the queue was effectively drained before
        if self.min1 == b1 {
            self.refill_buffer1()?;
        }

        Ok(())
    }
}
