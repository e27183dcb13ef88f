// Copyright (c) 2025-present, sequence-heap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// An element that can live in the queue.
///
/// Elements are popped in ascending [`Ord`] order. Every implementation
/// reserves one *sentinel* value that orders at-or-after every reachable
/// element. The sentinel terminates every sorted run inside the queue so the
/// hot merge loops never check for end-of-input; it is never returned to the
/// caller and must never be pushed.
///
/// For the integer impls below the sentinel is `MAX`. A custom pop order is
/// obtained the usual way: a wrapper type with its own `Ord`, plus a matching
/// sentinel.
pub trait Value: Ord + Clone {
    /// Returns the run-terminating marker.
    ///
    /// Must compare greater than or equal to every value that is ever pushed.
    fn sentinel() -> Self;
}

/// An element that can additionally be spilled to disk blocks.
///
/// Every value must encode to exactly [`Storable::STORED_SIZE`] bytes, so
/// block capacities stay element-exact.
pub trait Storable: Value + Encode + Decode + Send + Sync + 'static {
    /// Encoded size of one value in bytes.
    const STORED_SIZE: usize;
}

macro_rules! impl_int {
    ($t:ty, $write:ident, $read:ident) => {
        impl Value for $t {
            fn sentinel() -> Self {
                <$t>::MAX
            }
        }

        impl Encode for $t {
            fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
                writer.$write::<BigEndian>(*self)?;
                Ok(())
            }
        }

        impl Decode for $t {
            fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
                Ok(reader.$read::<BigEndian>()?)
            }
        }

        impl Storable for $t {
            const STORED_SIZE: usize = std::mem::size_of::<$t>();
        }
    };
}

impl_int!(u16, write_u16, read_u16);
impl_int!(u32, write_u32, read_u32);
impl_int!(u64, write_u64, read_u64);
impl_int!(u128, write_u128, read_u128);
impl_int!(i16, write_i16, read_i16);
impl_int!(i32, write_i32, read_i32);
impl_int!(i64, write_i64, read_i64);

impl Value for u8 {
    fn sentinel() -> Self {
        Self::MAX
    }
}

impl Encode for u8 {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(*self)?;
        Ok(())
    }
}

impl Decode for u8 {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(reader.read_u8()?)
    }
}

impl Storable for u8 {
    const STORED_SIZE: usize = 1;
}

// Pairs order lexicographically, so (key, payload) elements come for free.
impl<A: Value, B: Value> Value for (A, B) {
    fn sentinel() -> Self {
        (A::sentinel(), B::sentinel())
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.0.encode_into(writer)?;
        self.1.encode_into(writer)?;
        Ok(())
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let a = A::decode_from(reader)?;
        let b = B::decode_from(reader)?;
        Ok((a, b))
    }
}

impl<A: Storable, B: Storable> Storable for (A, B) {
    const STORED_SIZE: usize = A::STORED_SIZE + B::STORED_SIZE;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn value_roundtrip_u64() {
        let v: u64 = 0xDEAD_BEEF_CAFE;
        let bytes = v.encode_into_vec();
        assert_eq!(u64::STORED_SIZE, bytes.len());

        let mut reader = &bytes[..];
        assert_eq!(v, u64::decode_from(&mut reader).unwrap());
    }

    #[test]
    fn value_roundtrip_pair() {
        let v: (u32, u64) = (17, 4711);
        let bytes = v.encode_into_vec();
        assert_eq!(<(u32, u64)>::STORED_SIZE, bytes.len());

        let mut reader = &bytes[..];
        assert_eq!(v, <(u32, u64)>::decode_from(&mut reader).unwrap());
    }

    #[test]
    fn sentinel_orders_last() {
        assert!(5u32 < u32::sentinel());
        assert!((5u32, 0u64) < <(u32, u64)>::sentinel());
    }
}
