// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Disk-backed k-way merger.
//!
//! Each input is an *external sequence*: one resident block plus an ordered
//! tail of block ids still on disk. A small interval heap over the current
//! head elements selects the next sequence to emit from. Crossing a block
//! boundary waits out any pending write of the next block, hints it to the
//! prefetcher, reads the due block synchronously and recycles its id.

#![allow(clippy::indexing_slicing)]

use crate::{
    block::{AllocPolicy, Block, BlockId, BlockManager},
    merge::MergeSource,
    pool::{PrefetchPool, WritePool},
    Storable,
};
use interval_heap::IntervalHeap;
use std::collections::VecDeque;
use std::sync::Arc;

struct HeadEntry<T> {
    value: T,
    slot: usize,
}

impl<T: Ord> PartialEq for HeadEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Ord> Eq for HeadEntry<T> {}

impl<T: Ord> PartialOrd for HeadEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for HeadEntry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

struct Sequence<T> {
    /// Cursor into the resident block
    cur: usize,

    /// Resident block; the first block of a sequence never touches disk
    block: Block<T>,

    /// Blocks still to be read, in stream order
    tail: VecDeque<BlockId>,
}

/// External merger over up to `arity` block-backed sequences.
pub struct ExtMerger<T: Storable> {
    arity: usize,
    block_len: usize,
    alloc: AllocPolicy,

    seqs: Vec<Option<Sequence<T>>>,
    free: Vec<usize>,
    heads: IntervalHeap<HeadEntry<T>>,

    nseqs: usize,
    len: u64,

    manager: Arc<BlockManager>,
    p_pool: Arc<PrefetchPool<T>>,
    w_pool: Arc<WritePool<T>>,
}

impl<T: Storable> ExtMerger<T> {
    /// Creates an empty merger.
    #[must_use]
    pub fn new(
        arity: usize,
        block_len: usize,
        alloc: AllocPolicy,
        manager: Arc<BlockManager>,
        p_pool: Arc<PrefetchPool<T>>,
        w_pool: Arc<WritePool<T>>,
    ) -> Self {
        debug_assert_eq!(block_len, p_pool.block_len());
        debug_assert_eq!(block_len, w_pool.block_len());

        Self {
            arity,
            block_len,
            alloc,
            seqs: Vec::new(),
            free: Vec::new(),
            heads: IntervalHeap::with_capacity(arity),
            nseqs: 0,
            len: 0,
            manager,
            p_pool,
            w_pool,
        }
    }

    /// Number of live (undrained) elements.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of sequences currently registered.
    #[must_use]
    pub fn sequence_count(&self) -> usize {
        self.nseqs
    }

    /// Whether another sequence can be inserted within the configured arity.
    #[must_use]
    pub fn space_available(&self) -> bool {
        self.nseqs < self.arity
    }

    /// Rough estimation: resident raw block bytes.
    #[must_use]
    pub fn mem_cons(&self) -> usize {
        self.nseqs * Block::<T>::raw_size(self.block_len)
    }

    /// Emits the `out.len()` smallest elements in ascending order.
    ///
    /// # Errors
    ///
    /// Surfaces block I/O errors unchanged; no retry is attempted.
    pub fn multi_merge(&mut self, out: &mut [T]) -> crate::Result<()> {
        debug_assert!(out.len() as u64 <= self.len);

        for slot_out in out.iter_mut() {
            let Some(head) = self.heads.pop_min() else {
                debug_assert!(false, "merge asked for more elements than are live");
                break;
            };

            *slot_out = head.value;
            self.len -= 1;

            self.advance(head.slot)?;
        }

        Ok(())
    }

    /// Advances sequence `index` past its emitted head, handling the block
    /// boundary, then re-registers its new head in the heap.
    fn advance(&mut self, index: usize) -> crate::Result<()> {
        let Some(seq) = self.seqs[index].as_mut() else {
            debug_assert!(false, "advanced a dead sequence");
            return Ok(());
        };

        seq.cur += 1;

        if seq.cur == self.block_len {
            log::trace!("ext_merger: sequence {index} crossing block boundary");

            if seq.tail.is_empty() {
                // last block: the sequence is done
                self.seqs[index] = None;
                self.free.push(index);
                self.nseqs -= 1;
                return Ok(());
            }

            let Some(bid) = seq.tail.pop_front() else {
                return Ok(());
            };

            if let Some(&next) = seq.tail.front() {
                // give the prefetcher a head start on the follow-up block,
                // but only after any pending write of it has settled
                if let Some(req) = self.w_pool.get_request(next) {
                    req.wait()?;
                }
                self.p_pool.hint(next);
            }

            if let Some(req) = self.w_pool.get_request(bid) {
                req.wait()?;
            }
            let block = self.p_pool.read(bid)?;
            self.manager.delete_block(bid);

            seq.block = block;
            seq.cur = 0;
        }

        let value = seq.block[seq.cur].clone();
        self.heads.push(HeadEntry { value, slot: index });

        Ok(())
    }

    /// Drains exactly `segment_len` elements out of `source` into a freshly
    /// built external sequence.
    ///
    /// The first (smallest) elements land right-aligned in a memory-resident
    /// first block; every further block is filled and handed to the write
    /// pool while the drain continues.
    ///
    /// # Errors
    ///
    /// Surfaces I/O errors from the source drain or the block writes.
    pub fn insert_segment<S: MergeSource<T>>(
        &mut self,
        source: &mut S,
        segment_len: u64,
    ) -> crate::Result<()> {
        if segment_len == 0 {
            log::warn!("ext_merger: discarding empty segment");
            return Ok(());
        }

        let mut nblocks = (segment_len / self.block_len as u64) as usize;
        let mut first_len = (segment_len % self.block_len as u64) as usize;
        if first_len == 0 {
            first_len = self.block_len;
            nblocks -= 1;
        }

        if nblocks == 0 {
            log::warn!(
                "ext_merger: segment of {segment_len} elements fits into a single block; \
                 this is inefficient, consider larger queue parameters"
            );
        }

        log::debug!("ext_merger: inserting segment of {segment_len} elements, {nblocks} tail blocks");

        let tail: VecDeque<BlockId> = self.manager.new_blocks(self.alloc, nblocks).into();

        let mut first = Block::new(self.block_len);
        let start = self.block_len - first_len;
        source.multi_merge(&mut first.items_mut()[start..])?;

        for &bid in &tail {
            let mut block = self.w_pool.get_buffer();
            source.multi_merge(block.items_mut())?;
            self.w_pool.write(block, bid)?;
        }

        self.attach(
            Sequence {
                cur: start,
                block: first,
                tail,
            },
            segment_len,
        );

        Ok(())
    }

    fn attach(&mut self, seq: Sequence<T>, len: u64) {
        let value = seq.block[seq.cur].clone();

        let index = match self.free.pop() {
            Some(index) => {
                self.seqs[index] = Some(seq);
                index
            }
            None => {
                self.seqs.push(Some(seq));
                self.seqs.len() - 1
            }
        };

        self.heads.push(HeadEntry { value, slot: index });
        self.nseqs += 1;
        self.len += len;

        if self.nseqs > self.arity {
            log::warn!(
                "ext_merger: holding {} sequences, beyond its arity of {}",
                self.nseqs,
                self.arity
            );
        }
    }
}

impl<T: Storable> Drop for ExtMerger<T> {
    fn drop(&mut self) {
        for seq in self.seqs.iter().flatten() {
            for &bid in &seq.tail {
                // wait out in-flight writes so recycled slots cannot be
                // clobbered after reuse, then drop any stale hint
                if let Some(req) = self.w_pool.get_request(bid) {
                    let _ = req.wait();
                }
                self.p_pool.forget(bid);
            }

            self.manager.delete_blocks(seq.tail.iter().copied());
        }
    }
}

impl<T: Storable> MergeSource<T> for ExtMerger<T> {
    fn multi_merge(&mut self, out: &mut [T]) -> crate::Result<()> {
        Self::multi_merge(self, out)
    }
}
