//! Packed arrays of fixed width unsigned integers.
//!
//! Values never straddle a word boundary: each `u64` holds
//! `64 / bits` values starting from the least significant bit, and any left
//! over high bits are zero.

use num_integer::div_ceil;
use thiserror::Error;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BitStorage {
    data: Box<[u64]>,
    bits: u8,
    size: usize,
    values_per_word: usize,
    mask: u64,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum BitStorageError {
    #[error("invalid length given for storage, got {got} words but expected {expected}")]
    Length { got: usize, expected: usize },
    #[error("{0} bits per entry is out of range")]
    Bits(u8),
}

impl BitStorage {
    pub const MAX_BITS: u8 = 32;

    /// Creates a zeroed storage of `size` values, `bits` wide each.
    ///
    /// # Panics
    ///
    /// Panics if `bits` exceeds [`Self::MAX_BITS`].
    #[track_caller]
    pub fn new(bits: u8, size: usize) -> Self {
        assert!(
            bits <= Self::MAX_BITS,
            "{bits} bits per entry is out of range"
        );

        let words = Self::word_count(bits, size);

        Self {
            data: vec![0; words].into_boxed_slice(),
            bits,
            size,
            values_per_word: if bits == 0 { 0 } else { 64 / bits as usize },
            mask: if bits == 0 { 0 } else { u64::MAX >> (64 - bits) },
        }
    }

    /// Wraps an existing word array. Fails if the number of words does not
    /// match what `bits` and `size` imply.
    pub fn from_raw(bits: u8, size: usize, data: Vec<u64>) -> Result<Self, BitStorageError> {
        if bits > Self::MAX_BITS {
            return Err(BitStorageError::Bits(bits));
        }

        let expected = Self::word_count(bits, size);
        if data.len() != expected {
            return Err(BitStorageError::Length {
                got: data.len(),
                expected,
            });
        }

        let mut storage = Self::new(bits, 0);
        storage.data = data.into_boxed_slice();
        storage.size = size;
        Ok(storage)
    }

    /// Packs `values` into a new storage.
    #[track_caller]
    pub fn from_values(bits: u8, values: &[u32]) -> Self {
        let mut storage = Self::new(bits, values.len());
        for (i, &v) in values.iter().enumerate() {
            storage.set(i, v);
        }
        storage
    }

    /// Number of `u64` words needed to hold `size` values of `bits` bits.
    pub fn word_count(bits: u8, size: usize) -> usize {
        if bits == 0 {
            0
        } else {
            div_ceil(size, 64 / bits as usize)
        }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn raw(&self) -> &[u64] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u64> {
        self.data.into_vec()
    }

    #[inline]
    fn locate(&self, index: usize) -> (usize, u32) {
        let word = index / self.values_per_word;
        let shift = (index - word * self.values_per_word) * self.bits as usize;
        (word, shift as u32)
    }

    #[track_caller]
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        debug_assert!(
            index < self.size,
            "index {index} out of bounds for storage of size {}",
            self.size
        );

        if self.bits == 0 {
            return 0;
        }

        let (word, shift) = self.locate(index);
        ((self.data[word] >> shift) & self.mask) as u32
    }

    #[track_caller]
    #[inline]
    pub fn set(&mut self, index: usize, value: u32) {
        self.get_and_set(index, value);
    }

    /// Stores `value` at `index` and returns the value that was there.
    #[track_caller]
    #[inline]
    pub fn get_and_set(&mut self, index: usize, value: u32) -> u32 {
        debug_assert!(
            index < self.size,
            "index {index} out of bounds for storage of size {}",
            self.size
        );
        debug_assert!(
            u64::from(value) <= self.mask,
            "value {value} does not fit in {} bits",
            self.bits
        );

        if self.bits == 0 {
            return 0;
        }

        let (word, shift) = self.locate(index);
        let w = &mut self.data[word];
        let prev = (*w >> shift) & self.mask;
        *w = (*w & !(self.mask << shift)) | ((u64::from(value) & self.mask) << shift);
        prev as u32
    }

    /// Iterates over every stored value in index order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.size).map(|i| self.get(i))
    }

    /// Writes every value into `out`, which must be at least `size` long.
    pub fn unpack(&self, out: &mut [u32]) {
        if self.bits == 0 {
            out[..self.size].fill(0);
            return;
        }

        let mut i = 0;
        'words: for &word in self.data.iter() {
            for n in 0..self.values_per_word {
                if i >= self.size {
                    break 'words;
                }
                out[i] = ((word >> (n * self.bits as usize)) & self.mask) as u32;
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};

    use super::*;

    #[test]
    fn values_do_not_straddle_words() {
        // 5 bits per value leaves 4 padding bits in every word.
        let mut storage = BitStorage::new(5, 4096);
        assert_eq!(storage.raw().len(), div_ceil(4096, 12));

        storage.set(11, 31);
        storage.set(12, 1);

        assert_eq!(storage.raw()[0], 31 << 55);
        assert_eq!(storage.raw()[1], 1);
        assert_eq!(storage.get(11), 31);
        assert_eq!(storage.get(12), 1);
    }

    #[test]
    fn random_writes_read_back() {
        let mut rng = thread_rng();

        for bits in 1..=BitStorage::MAX_BITS {
            let max = (u64::MAX >> (64 - bits)) as u32;
            let mut storage = BitStorage::new(bits, 300);
            let mut expected = vec![0_u32; 300];

            for _ in 0..1000 {
                let i = rng.gen_range(0..300);
                let v = rng.gen_range(0..=max);
                assert_eq!(storage.get_and_set(i, v), expected[i]);
                expected[i] = v;
            }

            let mut unpacked = vec![0; 300];
            storage.unpack(&mut unpacked);
            assert_eq!(unpacked, expected);
            assert!(storage.iter().eq(expected.iter().copied()));
        }
    }

    #[test]
    fn zero_width_storage() {
        let mut storage = BitStorage::new(0, 4096);

        assert!(storage.raw().is_empty());
        assert_eq!(storage.get(4095), 0);
        assert_eq!(storage.get_and_set(7, 0), 0);
        assert!(storage.iter().all(|v| v == 0));
    }

    #[test]
    fn raw_length_mismatch() {
        assert_eq!(
            BitStorage::from_raw(4, 4096, vec![0; 255]),
            Err(BitStorageError::Length {
                got: 255,
                expected: 256
            })
        );
        assert_eq!(
            BitStorage::from_raw(0, 4096, vec![0]),
            Err(BitStorageError::Length {
                got: 1,
                expected: 0
            })
        );
        assert!(BitStorage::from_raw(4, 4096, vec![0; 256]).is_ok());
    }
}
