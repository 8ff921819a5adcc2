//! Variable length `i32`s, used for palette ids and the lengths in front of
//! palettes and storage words.
//!
//! Each byte carries seven bits of the value, lowest group first. Every byte
//! except the last has its high bit set. Negative values are written as their
//! `u32` bit pattern and always take [`VarInt::MAX_SIZE`] bytes.

use std::io::Write;

use thiserror::Error;

use crate::{Decode, Encode};

const GROUP: u32 = 0x7f;
const MORE: u8 = 0x80;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct VarInt(pub i32);

#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum VarIntError {
    #[error("input ended after {0} bytes of a varint")]
    Truncated(usize),
    #[error("varint continues past {} bytes", VarInt::MAX_SIZE)]
    Overlong,
}

impl VarInt {
    pub const MAX_SIZE: usize = 5;

    /// The number of bytes [`Encode::encode`] writes for this value.
    pub const fn written_size(self) -> usize {
        match u32::BITS - (self.0 as u32).leading_zeros() {
            0 => 1,
            bits => (bits as usize + 6) / 7,
        }
    }

    /// The encoded bytes. Only the first [`VarInt::written_size`] are used.
    pub fn to_bytes(self) -> [u8; Self::MAX_SIZE] {
        let mut bytes = [0; Self::MAX_SIZE];
        let mut rest = self.0 as u32;

        for byte in &mut bytes {
            *byte = (rest & GROUP) as u8;
            rest >>= 7;
            if rest == 0 {
                break;
            }
            *byte |= MORE;
        }

        bytes
    }
}

impl Encode for VarInt {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        let bytes = self.to_bytes();
        w.write_all(&bytes[..self.written_size()])?;
        Ok(())
    }
}

impl Decode<'_> for VarInt {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        let input: &[u8] = *r;
        let mut value = 0_u32;

        for (i, &byte) in input.iter().take(Self::MAX_SIZE).enumerate() {
            value |= (u32::from(byte) & GROUP) << (7 * i);
            if byte & MORE == 0 {
                *r = &input[i + 1..];
                return Ok(Self(value as i32));
            }
        }

        if input.len() < Self::MAX_SIZE {
            Err(VarIntError::Truncated(input.len()).into())
        } else {
            Err(VarIntError::Overlong.into())
        }
    }
}
