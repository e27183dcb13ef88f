// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An I/O-efficient external-memory priority queue (a *sequence heap*).
//!
//! ##### About
//!
//! This crate exports a [`PriorityQueue`] whose working set may vastly exceed
//! main memory. Instead of a single binary heap — whose random access pattern
//! is hopeless once data spills to disk — the queue keeps a small in-memory
//! insert heap, batches it into sorted runs, and pushes those runs through a
//! cascade of k-way mergers: loser trees while the data fits in memory,
//! block-streaming mergers once it does not. A two-level deletion buffer fuses
//! the outputs of all levels into a single ascending stream, so `pop` is a
//! pointer bump most of the time.
//!
//! Elements are popped in ascending [`Ord`] order. Every element type reserves
//! one *sentinel* value (see [`Value`]) that terminates sorted runs internally
//! and must never be pushed.
//!
//! # Example usage
//!
//! ```
//! use sequence_heap::{Config, PriorityQueue};
//!
//! // A queue over u64 keys, backed by a temporary file
//! let mut queue = PriorityQueue::<u64>::open_temp(Config::new())?;
//!
//! queue.push(3)?;
//! queue.push(1)?;
//! queue.push(2)?;
//!
//! assert_eq!(Some(&1), queue.top());
//! assert_eq!(Some(1), queue.pop()?);
//! assert_eq!(Some(2), queue.pop()?);
//! assert_eq!(Some(3), queue.pop()?);
//! assert!(queue.is_empty());
//! #
//! # Ok::<(), sequence_heap::Error>(())
//! ```
//!
//! For queues that are actually expected to spill, derive the configuration
//! from the machine's memory budget instead of using the defaults:
//!
//! ```
//! use sequence_heap::derive_config;
//!
//! // 8-byte elements, 256 MiB of internal memory, up to one billion elements
//! const CONFIG: sequence_heap::Config = derive_config(8, 256 * 1_024 * 1_024, 1_000_000_000);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

pub mod block;

mod checksum;

pub mod coding;

mod compression;
mod config;
mod error;

#[doc(hidden)]
pub mod ext_merger;

#[doc(hidden)]
pub mod insert_heap;

#[doc(hidden)]
pub mod loser_tree;

#[doc(hidden)]
pub mod merge;

pub mod pool;

mod queue;
mod value;

#[doc(hidden)]
pub use merge::MergeSource;

pub use {
    block::{AllocPolicy, Block, BlockId, BlockManager},
    checksum::Checksum,
    coding::{Decode, DecodeError, Encode, EncodeError},
    compression::CompressionType,
    config::{derive_config, try_derive_config, Config},
    error::{Error, Result},
    pool::{PrefetchPool, WritePool, WriteRequest},
    queue::PriorityQueue,
    value::{Storable, Value},
};
