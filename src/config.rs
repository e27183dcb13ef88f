// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{block::AllocPolicy, CompressionType};

/// Queue configuration builder
///
/// All sizes are in elements, not bytes. The defaults match a queue over
/// 8-byte elements with a couple hundred MiB of internal memory; for real
/// spilling workloads prefer [`derive_config`](crate::derive_config).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Shared delete buffer size (B1)
    pub buffer1_size: usize,

    /// Insert heap capacity and per-level buffer size (N)
    pub run_length: usize,

    /// Maximum arity of the internal mergers, a power of two
    pub int_arity: usize,

    /// Number of internal merger levels
    pub int_levels: usize,

    /// Elements per disk block
    pub block_len: usize,

    /// Maximum arity of the external mergers
    pub ext_arity: usize,

    /// Number of external merger levels
    pub ext_levels: usize,

    /// In-flight read capacity of a pool built by
    /// [`PriorityQueue::open_temp`](crate::PriorityQueue::open_temp)
    pub prefetch_slots: usize,

    /// Buffer count of a write pool built by
    /// [`PriorityQueue::open_temp`](crate::PriorityQueue::open_temp)
    pub write_buffers: usize,

    /// Compression applied to disk blocks
    pub compression: CompressionType,

    /// Placement policy for freshly allocated blocks
    pub alloc: AllocPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer1_size: 32,
            run_length: 512,
            int_arity: 64,
            int_levels: 4,
            // ~2 MiB blocks for 8-byte elements
            block_len: 256 * 1_024,
            ext_arity: 64,
            ext_levels: 2,
            prefetch_slots: 2,
            write_buffers: 8,
            compression: CompressionType::None,
            alloc: AllocPolicy::Recycle,
        }
    }

    /// Sets the shared delete buffer size (B1).
    #[must_use]
    pub const fn buffer1_size(mut self, elements: usize) -> Self {
        self.buffer1_size = elements;
        self
    }

    /// Sets the insert heap capacity and per-level buffer size (N).
    #[must_use]
    pub const fn run_length(mut self, elements: usize) -> Self {
        self.run_length = elements;
        self
    }

    /// Sets the maximum internal merger arity (a power of two).
    #[must_use]
    pub const fn int_arity(mut self, arity: usize) -> Self {
        self.int_arity = arity;
        self
    }

    /// Sets the number of internal merger levels.
    #[must_use]
    pub const fn int_levels(mut self, levels: usize) -> Self {
        self.int_levels = levels;
        self
    }

    /// Sets the block size in elements.
    #[must_use]
    pub const fn block_len(mut self, elements: usize) -> Self {
        self.block_len = elements;
        self
    }

    /// Sets the maximum external merger arity.
    #[must_use]
    pub const fn ext_arity(mut self, arity: usize) -> Self {
        self.ext_arity = arity;
        self
    }

    /// Sets the number of external merger levels.
    #[must_use]
    pub const fn ext_levels(mut self, levels: usize) -> Self {
        self.ext_levels = levels;
        self
    }

    /// Sets the prefetch pool capacity used by `open_temp`.
    #[must_use]
    pub const fn prefetch_slots(mut self, slots: usize) -> Self {
        self.prefetch_slots = slots;
        self
    }

    /// Sets the write pool buffer count used by `open_temp`.
    #[must_use]
    pub const fn write_buffers(mut self, buffers: usize) -> Self {
        self.write_buffers = buffers;
        self
    }

    /// Sets the block compression.
    #[must_use]
    pub const fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the block placement policy.
    #[must_use]
    pub const fn alloc(mut self, policy: AllocPolicy) -> Self {
        self.alloc = policy;
        self
    }

    /// Total level count.
    #[must_use]
    pub(crate) const fn levels(&self) -> usize {
        self.int_levels + self.ext_levels
    }

    /// Rejects configurations the cascade cannot run on.
    ///
    /// # Panics
    ///
    /// Panics on an invalid combination; configurations are programming
    /// input, not runtime data.
    pub(crate) fn validate(&self) {
        assert!(self.buffer1_size >= 1, "buffer1_size must be at least 1");
        assert!(
            self.run_length >= self.buffer1_size,
            "run_length must be at least buffer1_size, or a refill could \
             starve while a merger still holds smaller elements"
        );
        assert!(
            self.int_arity >= 2 && self.int_arity.is_power_of_two(),
            "int_arity must be a power of two"
        );
        assert!(self.ext_arity >= 2, "ext_arity must be at least 2");
        assert!(self.int_levels >= 1, "need at least one internal level");
        assert!(self.ext_levels >= 1, "need at least one external level");
        assert!(self.block_len >= 2, "blocks must hold at least two elements");
    }
}

/// Searches for feasible queue parameters, like [`derive_config`], but
/// returns `None` instead of panicking when the internal memory budget is
/// too small.
#[must_use]
pub const fn try_derive_config(
    element_size: usize,
    internal_memory: usize,
    max_len: u64,
) -> Option<Config> {
    if element_size == 0 || internal_memory == 0 {
        return None;
    }

    let e = element_size as u64;
    let int_m = internal_memory as u64;

    // walk B from 8 MiB downward by halving, m upward from 1
    let mut b: u64 = 8 * 1_024 * 1_024;
    while b > 2_048 {
        let k = int_m / b;

        let mut m: u64 = 1;
        while m < k {
            let c = k - m;
            let capacity = (k - m) * m * (m * b / (e * 4_096));

            if c > 10 && capacity >= max_len {
                return Some(derive_from(e, b, k, m));
            }

            m += 1;
        }

        b /= 2;
    }

    None
}

/// Derives (B1, N, arities, levels, block size) from the element size, the
/// internal memory budget in bytes and the maximum queue length, mirroring
/// the search the queue's sizing model prescribes.
///
/// Being `const`, an infeasible budget fails at compile time when the result
/// is bound to a `const`:
///
/// ```
/// use sequence_heap::derive_config;
///
/// const CONFIG: sequence_heap::Config = derive_config(8, 64 * 1_024 * 1_024, 100_000_000);
/// ```
///
/// # Panics
///
/// Panics if no feasible parameters exist for the given budget.
#[must_use]
pub const fn derive_config(element_size: usize, internal_memory: usize, max_len: u64) -> Config {
    match try_derive_config(element_size, internal_memory, max_len) {
        Some(config) => config,
        None => panic!(
            "no feasible priority queue parameters found; increase the internal memory budget"
        ),
    }
}

const fn derive_from(e: u64, b: u64, k: u64, m: u64) -> Config {
    // tuning knob: internal arity 2^6, squared for the run length divisor
    const TUNE: u32 = 6;

    let int_arity: u64 = 1 << TUNE;
    let x = b * (k - m) / e;

    let mut run_length = x / (int_arity * int_arity);
    if run_length < 64 {
        run_length = 64;
    }

    let mut ext_arity = m / 2;
    if ext_arity < 2 {
        ext_arity = 2;
    }

    let mut block_len = b / e;
    if block_len < 2 {
        block_len = 2;
    }

    Config {
        buffer1_size: 32,
        run_length: run_length as usize,
        int_arity: int_arity as usize,
        int_levels: 2,
        block_len: block_len as usize,
        ext_arity: ext_arity as usize,
        ext_levels: 2,
        prefetch_slots: 2,
        write_buffers: 8,
        compression: CompressionType::None,
        alloc: AllocPolicy::Recycle,
    }
}
