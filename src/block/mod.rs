// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Blocks are the unit of I/O.
//!
//! A [`Block`] is a fixed-capacity array of elements. On disk it occupies one
//! fixed-size *slot* addressed by its [`BlockId`]; the slot starts with a
//! small header (checksum, compression tag, payload length) followed by the
//! possibly-compressed element payload.

mod alloc;
mod manager;

pub use alloc::AllocPolicy;
pub use manager::BlockManager;

use crate::{
    coding::DecodeError, Checksum, CompressionType, Error, Storable, Value,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;

/// Identifier of an on-disk block slot, issued by the [`BlockManager`]
pub type BlockId = u64;

/// Slot header: 128-bit checksum + compression tag + payload length
const SLOT_HEADER_SIZE: usize = 16 + 1 + 4;

const TAG_UNCOMPRESSED: u8 = 0;

#[cfg(feature = "lz4")]
const TAG_LZ4: u8 = 1;

/// A fixed-capacity, randomly accessible array of elements
pub struct Block<T> {
    items: Vec<T>,
}

impl<T: Value> Block<T> {
    /// Creates a block of `len` sentinel elements.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            items: vec![T::sentinel(); len],
        }
    }

    /// Number of element slots in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the block holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn items_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T> std::ops::Index<usize> for Block<T> {
    type Output = T;

    #[allow(clippy::indexing_slicing)]
    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T: Storable> Block<T> {
    /// Raw size in bytes of the on-disk slot for a block of `len` elements.
    #[must_use]
    pub fn raw_size(len: usize) -> usize {
        SLOT_HEADER_SIZE + len * T::STORED_SIZE
    }

    /// Encodes the block into one slot-sized byte buffer.
    ///
    /// Compression falls back to the uncompressed representation whenever it
    /// does not actually shrink the payload, so the slot size is always
    /// sufficient.
    pub(crate) fn encode_slot(&self, compression: CompressionType) -> crate::Result<Vec<u8>> {
        let slot_size = Self::raw_size(self.items.len());

        let mut payload = Vec::with_capacity(self.items.len() * T::STORED_SIZE);
        for item in &self.items {
            item.encode_into(&mut payload)?;
        }

        let (tag, payload) = match compression {
            CompressionType::None => (TAG_UNCOMPRESSED, payload),

            #[cfg(feature = "lz4")]
            CompressionType::Lz4 => {
                let compressed = lz4_flex::compress_prepend_size(&payload);
                if compressed.len() < payload.len() {
                    (TAG_LZ4, compressed)
                } else {
                    (TAG_UNCOMPRESSED, payload)
                }
            }
        };

        let checksum = Checksum::of(&payload);

        let mut slot = Vec::with_capacity(slot_size);
        slot.write_u128::<BigEndian>(checksum.into_u128())
            .map_err(Error::Io)?;
        slot.write_u8(tag).map_err(Error::Io)?;

        #[allow(clippy::cast_possible_truncation)]
        slot.write_u32::<BigEndian>(payload.len() as u32)
            .map_err(Error::Io)?;

        slot.extend_from_slice(&payload);
        debug_assert!(slot.len() <= slot_size);
        slot.resize(slot_size, 0);

        Ok(slot)
    }

    /// Decodes a block of `len` elements from one slot-sized byte buffer.
    pub(crate) fn decode_slot(bytes: &[u8], len: usize) -> crate::Result<Self> {
        let mut reader = bytes;

        let expected = Checksum::from_raw(reader.read_u128::<BigEndian>().map_err(Error::Io)?);
        let tag = reader.read_u8().map_err(Error::Io)?;
        let payload_len = reader.read_u32::<BigEndian>().map_err(Error::Io)? as usize;

        let payload = reader
            .get(..payload_len)
            .ok_or(Error::Decode(DecodeError::InvalidHeader(
                "block payload length exceeds slot",
            )))?;

        let got = Checksum::of(payload);
        if got != expected {
            return Err(Error::ChecksumMismatch { expected, got });
        }

        let raw: Cow<'_, [u8]> = match tag {
            TAG_UNCOMPRESSED => Cow::Borrowed(payload),

            #[cfg(feature = "lz4")]
            TAG_LZ4 => Cow::Owned(
                lz4_flex::decompress_size_prepended(payload).map_err(|_| Error::Decompress)?,
            ),

            tag => {
                return Err(Error::Decode(DecodeError::InvalidTag((
                    "CompressionType",
                    tag,
                ))))
            }
        };

        if raw.len() != len * T::STORED_SIZE {
            return Err(Error::Decode(DecodeError::InvalidHeader(
                "block payload has wrong element count",
            )));
        }

        let mut reader: &[u8] = &raw;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::decode_from(&mut reader)?);
        }

        Ok(Self { items })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn block_slot_roundtrip() {
        let mut block = Block::<u64>::new(16);
        for (i, item) in block.items_mut().iter_mut().enumerate() {
            *item = i as u64 * 3;
        }

        let slot = block.encode_slot(CompressionType::None).unwrap();
        assert_eq!(Block::<u64>::raw_size(16), slot.len());

        let decoded = Block::<u64>::decode_slot(&slot, 16).unwrap();
        for i in 0..16 {
            assert_eq!(i as u64 * 3, decoded[i]);
        }
    }

    #[test]
    fn block_detects_corruption() {
        let mut block = Block::<u32>::new(8);
        for (i, item) in block.items_mut().iter_mut().enumerate() {
            *item = i as u32;
        }

        let mut slot = block.encode_slot(CompressionType::None).unwrap();
        let last = slot.len() - 1;
        slot[last] ^= 0xFF;

        assert!(matches!(
            Block::<u32>::decode_slot(&slot, 8),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn block_slot_roundtrip_lz4() {
        let block = Block::<u64>::new(64);

        let slot = block.encode_slot(CompressionType::Lz4).unwrap();
        assert_eq!(Block::<u64>::raw_size(64), slot.len());

        let decoded = Block::<u64>::decode_slot(&slot, 64).unwrap();
        assert_eq!(u64::sentinel(), decoded[63]);
    }
}
