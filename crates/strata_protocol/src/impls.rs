//! Implementations of [`Encode`](crate::Encode) and [`Decode`](crate::Decode)
//! on foreign types.

use std::io::Write;
use std::mem;

use anyhow::ensure;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{Decode, Encode, VarInt};

/// Prevents preallocating too much memory in case we get a malicious or invalid
/// sequence length.
fn cautious_capacity<Element>(size_hint: usize) -> usize {
    const MAX_PREALLOC_BYTES: usize = 1024 * 1024;

    if mem::size_of::<Element>() == 0 {
        0
    } else {
        size_hint.min(MAX_PREALLOC_BYTES / mem::size_of::<Element>())
    }
}

impl Encode for bool {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u8(u8::from(*self))?)
    }
}

impl Decode<'_> for bool {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        let n = r.read_u8()?;
        ensure!(n <= 1, "decoded boolean is not 0 or 1 (got {n})");
        Ok(n == 1)
    }
}

impl Encode for u8 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u8(*self)?)
    }
}

impl Decode<'_> for u8 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_u8()?)
    }
}

impl Encode for i8 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_i8(*self)?)
    }
}

impl Decode<'_> for i8 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_i8()?)
    }
}

macro_rules! impl_big_endian {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Encode for $ty {
                fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
                    Ok(w.$write::<BigEndian>(*self)?)
                }
            }

            impl Decode<'_> for $ty {
                fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
                    Ok(r.$read::<BigEndian>()?)
                }
            }
        )*
    }
}

impl_big_endian! {
    i16 => write_i16, read_i16;
    u16 => write_u16, read_u16;
    i32 => write_i32, read_i32;
    u32 => write_u32, read_u32;
    i64 => write_i64, read_i64;
    u64 => write_u64, read_u64;
}

/// Slices are prefixed with their length as a [`VarInt`].
impl<T: Encode> Encode for [T] {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        let len = self.len();
        ensure!(
            i32::try_from(len).is_ok(),
            "length of {} slice exceeds i32::MAX (got {len})",
            std::any::type_name::<T>()
        );

        VarInt(len as i32).encode(&mut w)?;

        for value in self {
            value.encode(&mut w)?;
        }
        Ok(())
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.as_slice().encode(w)
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Vec<T> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        let len = VarInt::decode(r)?.0;
        ensure!(len >= 0, "attempt to decode Vec with negative length");
        let len = len as usize;

        let mut vec = Vec::with_capacity(cautious_capacity::<T>(len));

        for _ in 0..len {
            vec.push(T::decode(r)?);
        }

        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_is_length_prefixed() {
        let mut buf = vec![];
        vec![1_u64, u64::MAX].encode(&mut buf).unwrap();

        assert_eq!(buf.len(), 1 + 16);
        assert_eq!(buf[0], 2);

        let mut r = buf.as_slice();
        assert_eq!(Vec::<u64>::decode(&mut r).unwrap(), [1, u64::MAX]);
        assert!(r.is_empty());
    }

    #[test]
    fn negative_vec_length_is_rejected() {
        let mut buf = vec![];
        VarInt(-3).encode(&mut buf).unwrap();

        assert!(Vec::<u8>::decode(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn bad_bool() {
        assert!(bool::decode(&mut [2_u8].as_slice()).is_err());
    }
}
