// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Policy governing how the block manager places new blocks
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AllocPolicy {
    /// Reuse freed slots before growing the backing file.
    ///
    /// Keeps the file as small as possible; a segment's blocks may end up
    /// scattered.
    #[default]
    Recycle,

    /// Always allocate fresh slots at the end of the backing file.
    ///
    /// A segment's blocks stay contiguous, favoring sequential reads at the
    /// cost of file growth.
    Fresh,
}
