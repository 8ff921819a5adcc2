//! Adaptive palette compressed arrays of registry values.
//!
//! A container starts with a single value palette and zero bits per cell.
//! Whenever a value that the current palette cannot represent is written, the
//! container picks the configuration for one more bit, re-registers every
//! existing cell *by value* under the new palette, and swaps the new palette
//! and storage in as a unit. The progression is single value, linear, hash
//! map, then the global palette where the stored ids are registry indices.

use std::io::Write;

use anyhow::{ensure, Context};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strata_protocol::{Decode, Encode, VarInt};
use strata_registry::{IdMap, RegistryIdx};
use thiserror::Error;
use tracing::trace;

use crate::bit_storage::{BitStorage, BitStorageError};
use crate::palette::{Palette, PaletteKind};
use crate::threading::ThreadingDetector;

/// How a container of a given shape maps bit widths to palette strategies.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Strategy {
    /// 16x16x16 block states.
    SectionStates,
    /// 4x4x4 biomes.
    SectionBiomes,
}

/// A palette strategy together with the storage width it uses.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Configuration {
    pub kind: PaletteKind,
    pub bits: u8,
}

/// Smallest `b` such that `1 << b >= n`.
pub(crate) fn ceil_log2(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u8
    }
}

impl Strategy {
    /// Bits per axis of the local coordinates.
    pub const fn size_bits(self) -> u32 {
        match self {
            Strategy::SectionStates => 4,
            Strategy::SectionBiomes => 2,
        }
    }

    /// Cells along one edge.
    pub const fn edge(self) -> u32 {
        1 << self.size_bits()
    }

    /// Total number of cells.
    pub const fn size(self) -> usize {
        1 << (self.size_bits() * 3)
    }

    /// Flat index of local coordinates: `y` is the most significant.
    #[inline]
    pub const fn index(self, x: u32, y: u32, z: u32) -> usize {
        let s = self.size_bits();
        (((y << s) | z) << s | x) as usize
    }

    /// The configuration used for a storage of `bits` bits per cell.
    pub fn configuration(self, bits: u8, registry_len: usize) -> Configuration {
        let global = Configuration {
            kind: PaletteKind::Global,
            bits: ceil_log2(registry_len),
        };

        match self {
            Strategy::SectionStates => match bits {
                0 => Configuration {
                    kind: PaletteKind::SingleValue,
                    bits: 0,
                },
                1..=4 => Configuration {
                    kind: PaletteKind::Linear,
                    bits: 4,
                },
                5..=8 => Configuration {
                    kind: PaletteKind::HashMap,
                    bits,
                },
                _ => global,
            },
            Strategy::SectionBiomes => match bits {
                0 => Configuration {
                    kind: PaletteKind::SingleValue,
                    bits: 0,
                },
                1..=3 => Configuration {
                    kind: PaletteKind::Linear,
                    bits,
                },
                _ => global,
            },
        }
    }
}

#[derive(Clone, Debug)]
struct Data<T> {
    config: Configuration,
    palette: Palette<T>,
    storage: BitStorage,
}

impl<T: RegistryIdx> Data<T> {
    fn new(config: Configuration, size: usize, registry_len: usize, first: T) -> Self {
        Self {
            config,
            palette: Palette::new(config.kind, config.bits, registry_len, first),
            storage: BitStorage::new(config.bits, size),
        }
    }

    #[inline]
    fn get(&self, index: usize) -> T {
        self.palette.value_for(self.storage.get(index))
    }
}

/// A fixed size array of `T` stored through a palette.
#[derive(Clone, Debug)]
pub struct PalettedContainer<T> {
    strategy: Strategy,
    registry_len: usize,
    data: Data<T>,
    detector: ThreadingDetector,
}

/// The storage form: the distinct values actually present, plus one index per
/// cell packed with the minimum width for the palette length.
///
/// `data` is absent when there is exactly one entry.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PalettedData<V> {
    pub palette: Vec<V>,
    pub data: Option<Vec<u64>>,
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum PalettedDecodeError {
    #[error("palette is empty")]
    EmptyPalette,
    #[error("palette entry {0} is not in the registry")]
    UnknownEntry(usize),
    #[error("missing cell data for a palette of {0} entries")]
    MissingData(usize),
    #[error("unexpected cell data for a single entry palette")]
    UnexpectedData,
    #[error("cell {cell} refers to palette index {index} but the palette has {len} entries")]
    BadPaletteIndex { cell: usize, index: u32, len: usize },
    #[error(transparent)]
    Storage(#[from] BitStorageError),
}

impl<T: RegistryIdx> PalettedContainer<T> {
    /// Creates a container with every cell set to `value`.
    pub fn new(strategy: Strategy, registry: &impl IdMap<T>, value: T) -> Self {
        Self::with_registry_len(strategy, registry.id_count(), value)
    }

    pub(crate) fn with_registry_len(strategy: Strategy, registry_len: usize, value: T) -> Self {
        let config = strategy.configuration(0, registry_len);
        Self {
            strategy,
            registry_len,
            data: Data::new(config, strategy.size(), registry_len, value),
            detector: ThreadingDetector::new("PalettedContainer"),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn palette_kind(&self) -> PaletteKind {
        self.data.config.kind
    }

    /// Bits per cell of the in-memory storage.
    pub fn bits(&self) -> u8 {
        self.data.config.bits
    }

    pub fn palette(&self) -> &Palette<T> {
        &self.data.palette
    }

    pub fn size(&self) -> usize {
        self.strategy.size()
    }

    /// Marks the start of a multi step mutation by the calling thread.
    #[track_caller]
    pub fn acquire(&self) {
        self.detector.check_and_lock();
    }

    #[track_caller]
    pub fn release(&self) {
        self.detector.check_and_unlock();
    }

    #[track_caller]
    #[inline]
    fn check_oob(&self, x: u32, y: u32, z: u32) {
        let edge = self.strategy.edge();
        debug_assert!(
            x < edge && y < edge && z < edge,
            "local offsets of ({x}, {y}, {z}) are out of bounds"
        );
    }

    #[track_caller]
    pub fn get(&self, x: u32, y: u32, z: u32) -> T {
        self.check_oob(x, y, z);
        self.data.get(self.strategy.index(x, y, z))
    }

    #[track_caller]
    pub fn get_index(&self, index: usize) -> T {
        self.data.get(index)
    }

    #[track_caller]
    pub fn set(&mut self, x: u32, y: u32, z: u32, value: T) {
        self.swap(x, y, z, value);
    }

    /// Writes `value` and returns what was there before.
    #[track_caller]
    pub fn swap(&mut self, x: u32, y: u32, z: u32, value: T) -> T {
        self.acquire();
        let prev = self.swap_unchecked(x, y, z, value);
        self.release();
        prev
    }

    /// Like [`swap`](Self::swap) without touching the threading detector.
    /// The caller must already hold the container.
    #[track_caller]
    pub fn swap_unchecked(&mut self, x: u32, y: u32, z: u32, value: T) -> T {
        self.check_oob(x, y, z);
        self.swap_index(self.strategy.index(x, y, z), value)
    }

    fn swap_index(&mut self, index: usize, value: T) -> T {
        let id = self.id_for(value);
        let prev = self.data.storage.get_and_set(index, id);
        self.data.palette.value_for(prev)
    }

    /// Fills every cell with `value`, dropping the current palette.
    pub fn fill(&mut self, value: T) {
        self.acquire();
        let config = self.strategy.configuration(0, self.registry_len);
        self.data = Data::new(config, self.size(), self.registry_len, value);
        self.release();
    }

    fn id_for(&mut self, value: T) -> u32 {
        loop {
            if let Some(id) = self.data.palette.id_for(value) {
                return id;
            }
            self.resize(self.data.config.bits + 1);
        }
    }

    /// Moves to the configuration for `bits`, re-registering every cell's
    /// value in the new palette.
    fn resize(&mut self, bits: u8) {
        let config = self.strategy.configuration(bits, self.registry_len);
        let first = self.data.get(0);
        let mut new = Data::new(config, self.size(), self.registry_len, first);

        for i in 0..self.size() {
            let value = self.data.get(i);
            let id = new
                .palette
                .id_for(value)
                .unwrap_or_else(|| unreachable!("resized palette is smaller than the old one"));
            new.storage.set(i, id);
        }

        if config.kind == PaletteKind::Global {
            trace!(
                strategy = ?self.strategy,
                bits = config.bits,
                "paletted container upgraded to the global palette"
            );
        }

        self.data = new;
    }

    /// Conservative check for whether any cell may satisfy `pred`.
    pub fn maybe_has(&self, pred: impl FnMut(T) -> bool) -> bool {
        self.data.palette.maybe_has(pred)
    }

    /// Calls `f` once per distinct value with the number of cells holding it.
    pub fn count(&self, mut f: impl FnMut(T, usize)) {
        match &self.data.palette {
            Palette::SingleValue(v) => f(*v, self.size()),
            Palette::Global { .. } => {
                let mut counts = FxHashMap::<u32, usize>::default();
                for id in self.data.storage.iter() {
                    *counts.entry(id).or_default() += 1;
                }
                for (id, n) in counts {
                    f(T::from_index(id as usize), n);
                }
            }
            palette => {
                let mut counts = vec![0_usize; palette.len()];
                for id in self.data.storage.iter() {
                    counts[id as usize] += 1;
                }
                for (id, n) in counts.into_iter().enumerate() {
                    if n > 0 {
                        f(palette.value_for(id as u32), n);
                    }
                }
            }
        }
    }

    /// Calls `f` once for every value present in at least one cell. Palette
    /// entries no longer referenced by any cell are skipped.
    pub fn for_each_distinct(&self, mut f: impl FnMut(T)) {
        self.count(|value, _| f(value));
    }

    /// Number of bytes written by [`Encode::encode`].
    pub fn written_size(&self) -> usize {
        let words = self.data.storage.raw().len();
        1 + self.data.palette.written_size()
            + VarInt(words as i32).written_size()
            + words * 8
    }

    /// Reads the wire form written by [`Encode::encode`].
    pub fn decode(
        r: &mut &[u8],
        strategy: Strategy,
        registry: &impl IdMap<T>,
        default: T,
    ) -> anyhow::Result<Self> {
        let registry_len = registry.id_count();
        let bits = u8::decode(r).context("failed to read bits per entry")?;
        let config = strategy.configuration(bits, registry_len);

        let mut data = Data::new(config, strategy.size(), registry_len, default);
        data.palette.decode_into(r, registry_len)?;

        let words = Vec::<u64>::decode(r).context("failed to read cell data")?;
        data.storage = BitStorage::from_raw(config.bits, strategy.size(), words)?;

        let limit = match &data.palette {
            Palette::Global { len } => *len,
            p => p.len(),
        };
        for (cell, id) in data.storage.iter().enumerate() {
            ensure!(
                (id as usize) < limit,
                "cell {cell} refers to index {id} but only {limit} are valid"
            );
        }

        Ok(Self {
            strategy,
            registry_len,
            data,
            detector: ThreadingDetector::new("PalettedContainer"),
        })
    }

    /// Converts to the storage form with a freshly built, minimal palette.
    pub fn to_data(&self) -> PalettedData<T> {
        if let Palette::SingleValue(v) = self.data.palette {
            return PalettedData {
                palette: vec![v],
                data: None,
            };
        }

        let mut palette = vec![];
        let mut ids = FxHashMap::<T, u32>::default();
        let mut indices = Vec::with_capacity(self.size());

        for i in 0..self.size() {
            let value = self.data.get(i);
            let id = *ids.entry(value).or_insert_with(|| {
                palette.push(value);
                palette.len() as u32 - 1
            });
            indices.push(id);
        }

        let bits = ceil_log2(palette.len());
        let data = (bits > 0).then(|| BitStorage::from_values(bits, &indices).into_raw());

        PalettedData { palette, data }
    }

    /// Rebuilds a container from its storage form, choosing the in-memory
    /// strategy for the number of entries.
    pub fn from_data(
        data: PalettedData<T>,
        strategy: Strategy,
        registry: &impl IdMap<T>,
    ) -> Result<Self, PalettedDecodeError> {
        let registry_len = registry.id_count();
        let entries = data.palette;

        let Some(&first) = entries.first() else {
            return Err(PalettedDecodeError::EmptyPalette);
        };

        if let Some(i) = entries.iter().position(|v| !registry.contains(*v)) {
            return Err(PalettedDecodeError::UnknownEntry(i));
        }

        let size = strategy.size();
        let bits = ceil_log2(entries.len());

        let disk = match (data.data, bits) {
            (None, 0) => None,
            (Some(_), 0) => return Err(PalettedDecodeError::UnexpectedData),
            (None, _) => return Err(PalettedDecodeError::MissingData(entries.len())),
            (Some(words), _) => Some(BitStorage::from_raw(bits, size, words)?),
        };

        let config = strategy.configuration(bits, registry_len);
        let mut new = Data::new(config, size, registry_len, first);

        // Entry lists may contain duplicates, so map each disk index to
        // whatever id the fresh palette assigns.
        let mut remap = Vec::with_capacity(entries.len());
        for &v in &entries {
            let id = new
                .palette
                .id_for(v)
                .unwrap_or_else(|| unreachable!("configuration is too small for the palette"));
            remap.push(id);
        }

        if let Some(disk) = disk {
            for (cell, index) in disk.iter().enumerate() {
                let Some(&id) = remap.get(index as usize) else {
                    return Err(PalettedDecodeError::BadPaletteIndex {
                        cell,
                        index,
                        len: entries.len(),
                    });
                };
                new.storage.set(cell, id);
            }
        }

        Ok(Self {
            strategy,
            registry_len,
            data: new,
            detector: ThreadingDetector::new("PalettedContainer"),
        })
    }
}

/// `[u8 bits per entry][palette][VarInt word count][u64 words]`
impl<T: RegistryIdx> Encode for PalettedContainer<T> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.data.config.bits.encode(&mut w)?;
        self.data.palette.encode(&mut w)?;
        self.data.storage.raw().encode(w)
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};
    use strata_registry::{BiomeId, BlockState, Registry};

    use super::*;

    fn registry(len: usize) -> Registry<BlockState, ()> {
        let mut reg = Registry::new();
        for i in 0..len {
            reg.insert(format!("state_{i}"), ()).unwrap();
        }
        reg
    }

    fn positions(strategy: Strategy) -> impl Iterator<Item = (u32, u32, u32)> {
        let e = strategy.edge();
        (0..e).flat_map(move |y| (0..e).flat_map(move |z| (0..e).map(move |x| (x, y, z))))
    }

    fn assert_same(a: &PalettedContainer<BlockState>, b: &PalettedContainer<BlockState>) {
        for (x, y, z) in positions(a.strategy()) {
            assert_eq!(a.get(x, y, z), b.get(x, y, z), "mismatch at ({x}, {y}, {z})");
        }
    }

    #[test]
    fn index_interleaving() {
        assert_eq!(Strategy::SectionStates.index(1, 0, 0), 1);
        assert_eq!(Strategy::SectionStates.index(0, 0, 1), 16);
        assert_eq!(Strategy::SectionStates.index(0, 1, 0), 256);
        assert_eq!(Strategy::SectionBiomes.index(3, 3, 3), 63);
        assert_eq!(Strategy::SectionBiomes.index(0, 1, 2), 24);
    }

    #[test]
    fn configuration_table() {
        use PaletteKind::*;

        let c = |s: Strategy, bits| {
            let c = s.configuration(bits, 1000);
            (c.kind, c.bits)
        };

        assert_eq!(c(Strategy::SectionStates, 0), (SingleValue, 0));
        assert_eq!(c(Strategy::SectionStates, 1), (Linear, 4));
        assert_eq!(c(Strategy::SectionStates, 4), (Linear, 4));
        assert_eq!(c(Strategy::SectionStates, 5), (HashMap, 5));
        assert_eq!(c(Strategy::SectionStates, 8), (HashMap, 8));
        assert_eq!(c(Strategy::SectionStates, 9), (Global, 10));
        assert_eq!(c(Strategy::SectionBiomes, 2), (Linear, 2));
        assert_eq!(c(Strategy::SectionBiomes, 4), (Global, 10));
    }

    #[test]
    fn ceil_log2_values() {
        assert_eq!(ceil_log2(0), 0);
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(256), 8);
        assert_eq!(ceil_log2(257), 9);
    }

    #[test]
    fn upgrades_preserve_values() {
        let reg = registry(1000);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));
        assert_eq!(c.palette_kind(), PaletteKind::SingleValue);

        let mut expected = vec![BlockState(0); 4096];
        let mut seen_kinds = vec![c.palette_kind()];

        for n in 1..=400_u16 {
            let i = (n as usize * 7) % 4096;
            let (x, y, z) = ((i & 15) as u32, (i >> 8) as u32, ((i >> 4) & 15) as u32);

            assert_eq!(c.swap(x, y, z, BlockState(n)), expected[i]);
            expected[i] = BlockState(n);

            if *seen_kinds.last().unwrap() != c.palette_kind() {
                seen_kinds.push(c.palette_kind());
            }

            // Spot check untouched cells after every write.
            for j in [0, 1, 2048, 4095] {
                assert_eq!(c.get_index(j), expected[j]);
            }
        }

        assert_eq!(
            seen_kinds,
            [
                PaletteKind::SingleValue,
                PaletteKind::Linear,
                PaletteKind::HashMap,
                PaletteKind::Global
            ]
        );

        for (i, v) in expected.iter().enumerate() {
            assert_eq!(c.get_index(i), *v);
        }
    }

    #[test]
    fn seventeenth_value_moves_to_hash_map() {
        let reg = registry(100);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(1));

        for n in 2..=16 {
            c.set(n % 16, 0, n / 16, BlockState(n as u16));
        }
        assert_eq!(c.palette_kind(), PaletteKind::Linear);
        assert_eq!(c.palette().len(), 16);

        c.set(0, 1, 0, BlockState(17));
        assert_eq!(c.palette_kind(), PaletteKind::HashMap);
        assert_eq!(c.bits(), 5);

        assert_eq!(c.get(0, 0, 0), BlockState(1));
        for n in 2..=16 {
            assert_eq!(c.get(n % 16, 0, n / 16), BlockState(n as u16));
        }
        assert_eq!(c.get(0, 1, 0), BlockState(17));
    }

    #[test]
    fn wire_round_trip() {
        let reg = registry(600);
        let mut rng = thread_rng();

        for distinct in [1, 3, 40, 500] {
            let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));
            for (x, y, z) in positions(Strategy::SectionStates) {
                c.set(x, y, z, BlockState(rng.gen_range(0..distinct)));
            }

            let mut buf = vec![];
            c.encode(&mut buf).unwrap();
            assert_eq!(buf.len(), c.written_size());

            let mut r = buf.as_slice();
            let decoded =
                PalettedContainer::decode(&mut r, Strategy::SectionStates, &reg, BlockState(0))
                    .unwrap();

            assert!(r.is_empty());
            assert_eq!(decoded.palette_kind(), c.palette_kind());
            assert_same(&c, &decoded);
        }
    }

    #[test]
    fn wire_rejects_bad_word_count() {
        let reg = registry(10);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));
        c.set(0, 0, 0, BlockState(3));

        let mut buf = vec![];
        c.encode(&mut buf).unwrap();
        // Drop the last word.
        buf.truncate(buf.len() - 8);
        let len_pos = buf.len() - 255 * 8 - 2;
        buf[len_pos..len_pos + 2].copy_from_slice(&[0xff, 0x01]);

        let err = PalettedContainer::decode(
            &mut buf.as_slice(),
            Strategy::SectionStates,
            &reg,
            BlockState(0),
        )
        .unwrap_err();

        assert!(err.downcast_ref::<BitStorageError>().is_some(), "{err:#}");
    }

    #[test]
    fn storage_form_uses_minimal_width() {
        let reg = registry(100);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(5));
        c.set(1, 2, 3, BlockState(6));
        c.set(4, 5, 6, BlockState(7));
        assert_eq!(c.bits(), 4);

        let data = c.to_data();
        assert_eq!(data.palette, [BlockState(5), BlockState(6), BlockState(7)]);
        // 3 entries need 2 bits: 32 per word.
        assert_eq!(data.data.as_ref().unwrap().len(), 4096 / 32);

        let decoded = PalettedContainer::from_data(data, Strategy::SectionStates, &reg).unwrap();
        assert_eq!(decoded.palette_kind(), PaletteKind::Linear);
        assert_same(&c, &decoded);
    }

    #[test]
    fn storage_form_round_trip_global() {
        let reg = registry(1000);
        let mut rng = thread_rng();
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));

        for (x, y, z) in positions(Strategy::SectionStates) {
            c.set(x, y, z, BlockState(rng.gen_range(0..1000)));
        }
        assert_eq!(c.palette_kind(), PaletteKind::Global);

        let decoded =
            PalettedContainer::from_data(c.to_data(), Strategy::SectionStates, &reg).unwrap();
        assert_eq!(decoded.palette_kind(), PaletteKind::Global);
        assert_same(&c, &decoded);
    }

    #[test]
    fn single_value_storage_form() {
        let reg = registry(4);
        let c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(2));

        let data = c.to_data();
        assert_eq!(data, PalettedData {
            palette: vec![BlockState(2)],
            data: None,
        });

        let decoded = PalettedContainer::from_data(data, Strategy::SectionStates, &reg).unwrap();
        assert_eq!(decoded.palette_kind(), PaletteKind::SingleValue);
        assert_same(&c, &decoded);
    }

    #[test]
    fn storage_form_errors() {
        let reg = registry(4);
        let decode = |palette: Vec<u16>, data| {
            PalettedContainer::from_data(
                PalettedData {
                    palette: palette.into_iter().map(BlockState).collect(),
                    data,
                },
                Strategy::SectionStates,
                &reg,
            )
            .map(|_| ())
        };

        assert_eq!(decode(vec![], None), Err(PalettedDecodeError::EmptyPalette));
        assert_eq!(
            decode(vec![0, 9], Some(vec![0; 64])),
            Err(PalettedDecodeError::UnknownEntry(1))
        );
        assert_eq!(
            decode(vec![0, 1], None),
            Err(PalettedDecodeError::MissingData(2))
        );
        assert_eq!(
            decode(vec![0], Some(vec![])),
            Err(PalettedDecodeError::UnexpectedData)
        );
        assert_eq!(
            decode(vec![0, 1], Some(vec![0; 63])),
            Err(PalettedDecodeError::Storage(BitStorageError::Length {
                got: 63,
                expected: 64
            }))
        );

        // 3 entries at 2 bits; index 3 is out of range.
        let mut words = vec![0_u64; 128];
        words[0] = 0b11;
        assert_eq!(
            decode(vec![0, 1, 2], Some(words)),
            Err(PalettedDecodeError::BadPaletteIndex {
                cell: 0,
                index: 3,
                len: 3
            })
        );
    }

    #[test]
    fn count_matches_cells() {
        let reg = registry(50);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));
        for x in 0..16 {
            c.set(x, 0, 0, BlockState(1 + (x % 3) as u16));
        }

        let mut counts = FxHashMap::default();
        c.count(|v, n| {
            counts.insert(v, n);
        });

        assert_eq!(counts[&BlockState(0)], 4096 - 16);
        assert_eq!(counts[&BlockState(1)], 6);
        assert_eq!(counts[&BlockState(2)], 5);
        assert_eq!(counts[&BlockState(3)], 5);
        assert!(c.maybe_has(|v| v == BlockState(3)));
        assert!(!c.maybe_has(|v| v == BlockState(4)));
    }

    #[test]
    fn distinct_values_skip_stale_entries() {
        let reg = registry(10);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));
        c.set(1, 0, 0, BlockState(4));
        c.set(2, 0, 0, BlockState(7));
        c.set(1, 0, 0, BlockState(0));
        assert_eq!(c.palette().len(), 3);

        let mut seen = vec![];
        c.for_each_distinct(|v| seen.push(v));
        seen.sort_by_key(|v| v.0);
        assert_eq!(seen, [BlockState(0), BlockState(7)]);

        let copy = c.clone();
        c.set(2, 0, 0, BlockState(9));
        assert_eq!(copy.get(2, 0, 0), BlockState(7));
    }

    #[test]
    fn biome_container() {
        let mut reg = Registry::<BiomeId, ()>::new();
        for i in 0..20 {
            reg.insert(format!("biome_{i}"), ()).unwrap();
        }

        let mut c = PalettedContainer::new(Strategy::SectionBiomes, &reg, BiomeId(0));
        assert_eq!(c.size(), 64);

        c.set(3, 3, 3, BiomeId(1));
        assert_eq!(c.palette_kind(), PaletteKind::Linear);
        assert_eq!(c.bits(), 1);

        for i in 2..10 {
            c.set(i % 4, 0, i / 4, BiomeId(i));
        }
        assert_eq!(c.palette_kind(), PaletteKind::Global);
        assert_eq!(c.bits(), 5);
        assert_eq!(c.get(3, 3, 3), BiomeId(1));
        assert_eq!(c.get(1, 0, 2), BiomeId(9));
    }

    #[test]
    fn biome_wire_round_trip() {
        let mut reg = Registry::<BiomeId, ()>::new();
        for i in 0..40 {
            reg.insert(format!("biome_{i}"), ()).unwrap();
        }

        for (distinct, kind, bits) in [
            (1, PaletteKind::SingleValue, 0),
            (2, PaletteKind::Linear, 1),
            (4, PaletteKind::Linear, 2),
            (12, PaletteKind::Global, 6),
        ] {
            let mut c = PalettedContainer::new(Strategy::SectionBiomes, &reg, BiomeId(0));
            for (i, (x, y, z)) in positions(Strategy::SectionBiomes).enumerate() {
                c.set(x, y, z, BiomeId(i as u32 % distinct));
            }
            assert_eq!((c.palette_kind(), c.bits()), (kind, bits), "{distinct} biomes");

            let mut buf = vec![];
            c.encode(&mut buf).unwrap();
            assert_eq!(buf.len(), c.written_size());

            let mut r = buf.as_slice();
            let decoded =
                PalettedContainer::decode(&mut r, Strategy::SectionBiomes, &reg, BiomeId(0))
                    .unwrap();
            assert!(r.is_empty());
            assert_eq!((decoded.palette_kind(), decoded.bits()), (kind, bits));

            for (i, (x, y, z)) in positions(Strategy::SectionBiomes).enumerate() {
                assert_eq!(decoded.get(x, y, z), BiomeId(i as u32 % distinct));
            }
        }
    }

    #[test]
    fn global_keeps_every_distinct_value() {
        let reg = registry(600);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));
        for (i, (x, y, z)) in positions(Strategy::SectionStates).enumerate() {
            c.set(x, y, z, BlockState((i % 300) as u16));
        }
        assert_eq!(c.palette_kind(), PaletteKind::Global);
        assert_eq!(c.bits(), 10);

        for (i, (x, y, z)) in positions(Strategy::SectionStates).enumerate() {
            assert_eq!(c.get(x, y, z), BlockState((i % 300) as u16));
        }

        let data = c.to_data();
        assert_eq!(data.palette.len(), 300);
        // 300 entries need 9 bits: 7 per word.
        assert_eq!(data.data.as_ref().unwrap().len(), 4096_usize.div_ceil(7));

        let decoded = PalettedContainer::from_data(data, Strategy::SectionStates, &reg).unwrap();
        assert_eq!(decoded.palette_kind(), PaletteKind::Global);
        assert_same(&c, &decoded);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_access() {
        let reg = registry(2);
        PalettedContainer::new(Strategy::SectionBiomes, &reg, BlockState(0)).get(4, 0, 0);
    }

    #[test]
    #[should_panic(expected = "outside the registry")]
    fn global_value_outside_registry() {
        let reg = registry(300);
        let mut c = PalettedContainer::new(Strategy::SectionStates, &reg, BlockState(0));
        for i in 0..300 {
            c.set(i % 16, i / 256, (i / 16) % 16, BlockState(i as u16));
        }
        assert_eq!(c.palette_kind(), PaletteKind::Global);

        c.set(0, 0, 0, BlockState(300));
    }
}
