// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{AllocPolicy, BlockId};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

struct AllocState {
    next_slot: u64,
    free: Vec<BlockId>,
    live: u64,
}

/// Issues and reclaims block ids, and performs the positional slot I/O.
///
/// All blocks live in one backing file divided into fixed-size slots; a
/// [`BlockId`] is a slot index. The manager is shared (behind an `Arc`)
/// between the queue and both I/O pools.
pub struct BlockManager {
    file: File,
    slot_bytes: usize,
    state: Mutex<AllocState>,
}

impl BlockManager {
    /// Creates a manager over an anonymous temporary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn temporary(slot_bytes: usize) -> crate::Result<Self> {
        assert!(slot_bytes > 0, "slot size must be positive");

        Ok(Self {
            file: tempfile::tempfile()?,
            slot_bytes,
            state: Mutex::new(AllocState {
                next_slot: 0,
                free: Vec::new(),
                live: 0,
            }),
        })
    }

    /// Creates a manager over a scratch file at `path`.
    ///
    /// The file is truncated; block contents do not survive the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_in<P: AsRef<Path>>(path: P, slot_bytes: usize) -> crate::Result<Self> {
        assert!(slot_bytes > 0, "slot size must be positive");

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            slot_bytes,
            state: Mutex::new(AllocState {
                next_slot: 0,
                free: Vec::new(),
                live: 0,
            }),
        })
    }

    /// Raw slot size in bytes.
    #[must_use]
    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    /// Number of block ids currently lent out.
    #[must_use]
    pub fn live_blocks(&self) -> u64 {
        self.lock_state().live
    }

    /// Allocates `count` fresh block ids.
    #[must_use]
    pub fn new_blocks(&self, policy: AllocPolicy, count: usize) -> Vec<BlockId> {
        let mut state = self.lock_state();
        let mut ids = Vec::with_capacity(count);

        for _ in 0..count {
            let id = match policy {
                AllocPolicy::Recycle => match state.free.pop() {
                    Some(id) => id,
                    None => {
                        let id = state.next_slot;
                        state.next_slot += 1;
                        id
                    }
                },
                AllocPolicy::Fresh => {
                    let id = state.next_slot;
                    state.next_slot += 1;
                    id
                }
            };
            state.live += 1;
            ids.push(id);
        }

        ids
    }

    /// Returns one block id for reuse.
    pub fn delete_block(&self, id: BlockId) {
        let mut state = self.lock_state();
        state.free.push(id);
        state.live -= 1;
    }

    /// Returns a batch of block ids for reuse.
    pub fn delete_blocks<I: IntoIterator<Item = BlockId>>(&self, ids: I) {
        let mut state = self.lock_state();
        for id in ids {
            state.free.push(id);
            state.live -= 1;
        }
    }

    /// Writes one slot; `bytes` must be exactly slot-sized.
    pub(crate) fn write_slot(&self, id: BlockId, bytes: &[u8]) -> crate::Result<()> {
        debug_assert_eq!(bytes.len(), self.slot_bytes);
        write_all_at(&self.file, bytes, id * self.slot_bytes as u64)?;
        Ok(())
    }

    /// Reads one slot back.
    pub(crate) fn read_slot(&self, id: BlockId) -> crate::Result<Vec<u8>> {
        let mut buf = vec![0; self.slot_bytes];
        read_exact_at(&self.file, &mut buf, id * self.slot_bytes as u64)?;
        Ok(buf)
    }

    #[allow(clippy::expect_used)]
    fn lock_state(&self) -> std::sync::MutexGuard<'_, AllocState> {
        self.state.lock().expect("lock is poisoned")
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole slot",
                ))
            }
            Ok(n) => {
                buf = buf.get(n..).unwrap_or_default();
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill slot buffer",
                ))
            }
            Ok(n) => {
                let rest = std::mem::take(&mut buf);
                buf = rest.get_mut(n..).unwrap_or_default();
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn manager_slot_roundtrip() {
        let manager = BlockManager::temporary(64).unwrap();

        let ids = manager.new_blocks(AllocPolicy::Recycle, 2);
        assert_eq!(2, ids.len());
        assert_eq!(2, manager.live_blocks());

        let a = vec![0xAB; 64];
        let b = vec![0xCD; 64];
        manager.write_slot(ids[0], &a).unwrap();
        manager.write_slot(ids[1], &b).unwrap();

        assert_eq!(a, manager.read_slot(ids[0]).unwrap());
        assert_eq!(b, manager.read_slot(ids[1]).unwrap());
    }

    #[test]
    fn manager_recycles_freed_ids() {
        let manager = BlockManager::temporary(16).unwrap();

        let ids = manager.new_blocks(AllocPolicy::Recycle, 3);
        manager.delete_block(ids[1]);
        assert_eq!(2, manager.live_blocks());

        let reused = manager.new_blocks(AllocPolicy::Recycle, 1);
        assert_eq!(ids[1], reused[0]);

        manager.delete_blocks(vec![ids[0], ids[2], reused[0]]);
        assert_eq!(0, manager.live_blocks());
    }

    #[test]
    fn manager_fresh_policy_grows() {
        let manager = BlockManager::temporary(16).unwrap();

        let ids = manager.new_blocks(AllocPolicy::Fresh, 2);
        manager.delete_block(ids[0]);

        let fresh = manager.new_blocks(AllocPolicy::Fresh, 1);
        assert_eq!(2, fresh[0]);
    }
}
