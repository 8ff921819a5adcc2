use std::io::Write;

use anyhow::{ensure, Context};
use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use strata_protocol::{Decode, Encode, VarInt};
use strata_registry::RegistryIdx;

/// Which palette strategy a container is currently using.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PaletteKind {
    SingleValue,
    Linear,
    HashMap,
    Global,
}

/// Maps small storage ids to values.
///
/// `Linear` and `HashMap` hold at most `1 << bits` entries. When asked for the
/// id of a value they cannot fit, [`Palette::id_for`] returns `None` and the
/// owning container must resize.
#[derive(Clone, Debug)]
pub enum Palette<T> {
    SingleValue(T),
    Linear {
        bits: u8,
        values: ArrayVec<T, 16>,
    },
    HashMap {
        bits: u8,
        values: Vec<T>,
        ids: FxHashMap<T, u32>,
    },
    /// Ids are registry indices. `len` is the registry size.
    Global {
        len: usize,
    },
}

impl<T: RegistryIdx> Palette<T> {
    /// An empty palette of `kind` with room for `1 << bits` values.
    ///
    /// A single value palette needs its value up front, which is `first`.
    pub(crate) fn new(kind: PaletteKind, bits: u8, registry_len: usize, first: T) -> Self {
        match kind {
            PaletteKind::SingleValue => Palette::SingleValue(first),
            PaletteKind::Linear => {
                debug_assert!(bits <= 4);
                Palette::Linear {
                    bits,
                    values: ArrayVec::new(),
                }
            }
            PaletteKind::HashMap => Palette::HashMap {
                bits,
                values: Vec::with_capacity(1 << bits),
                ids: FxHashMap::default(),
            },
            PaletteKind::Global => Palette::Global { len: registry_len },
        }
    }

    pub fn kind(&self) -> PaletteKind {
        match self {
            Palette::SingleValue(_) => PaletteKind::SingleValue,
            Palette::Linear { .. } => PaletteKind::Linear,
            Palette::HashMap { .. } => PaletteKind::HashMap,
            Palette::Global { .. } => PaletteKind::Global,
        }
    }

    /// Number of entries. For the global palette this is the registry size.
    pub fn len(&self) -> usize {
        match self {
            Palette::SingleValue(_) => 1,
            Palette::Linear { values, .. } => values.len(),
            Palette::HashMap { values, .. } => values.len(),
            Palette::Global { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the id of `value`, registering it if there is room.
    ///
    /// A freshly created single value palette has already been given its
    /// value, so asking it for any other value reports that a resize is
    /// needed.
    pub(crate) fn id_for(&mut self, value: T) -> Option<u32> {
        match self {
            Palette::SingleValue(v) => (*v == value).then_some(0),
            Palette::Linear { bits, values } => {
                if let Some(i) = values.iter().position(|v| *v == value) {
                    return Some(i as u32);
                }
                if values.len() < 1 << *bits {
                    values.push(value);
                    Some(values.len() as u32 - 1)
                } else {
                    None
                }
            }
            Palette::HashMap { bits, values, ids } => {
                if let Some(&id) = ids.get(&value) {
                    return Some(id);
                }
                if values.len() < 1 << *bits {
                    let id = values.len() as u32;
                    values.push(value);
                    ids.insert(value, id);
                    Some(id)
                } else {
                    None
                }
            }
            Palette::Global { len } => {
                assert!(
                    value.to_index() < *len,
                    "value with registry index {} is outside the registry (size {len})",
                    value.to_index()
                );
                Some(value.to_index() as u32)
            }
        }
    }

    /// Looks up the value for a storage id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a registered entry.
    #[track_caller]
    pub fn value_for(&self, id: u32) -> T {
        match self {
            Palette::SingleValue(v) => *v,
            Palette::Linear { values, .. } => match values.get(id as usize) {
                Some(v) => *v,
                None => panic!("missing palette entry for index {id}"),
            },
            Palette::HashMap { values, .. } => match values.get(id as usize) {
                Some(v) => *v,
                None => panic!("missing palette entry for index {id}"),
            },
            Palette::Global { len } => {
                assert!(
                    (id as usize) < *len,
                    "registry index {id} is outside the registry (size {len})"
                );
                T::from_index(id as usize)
            }
        }
    }

    /// Conservative membership test: `false` only if no entry matches.
    pub fn maybe_has(&self, mut pred: impl FnMut(T) -> bool) -> bool {
        match self {
            Palette::SingleValue(v) => pred(*v),
            Palette::Linear { values, .. } => values.iter().any(|v| pred(*v)),
            Palette::HashMap { values, .. } => values.iter().any(|v| pred(*v)),
            Palette::Global { .. } => true,
        }
    }

    /// The entries of an indirect palette in id order. Empty for the global
    /// palette.
    pub fn entries(&self) -> &[T] {
        match self {
            Palette::SingleValue(v) => std::slice::from_ref(v),
            Palette::Linear { values, .. } => values,
            Palette::HashMap { values, .. } => values,
            Palette::Global { .. } => &[],
        }
    }

    pub(crate) fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        match self {
            Palette::SingleValue(v) => VarInt(v.to_index() as i32).encode(w),
            Palette::Linear { .. } | Palette::HashMap { .. } => {
                let entries = self.entries();
                VarInt(entries.len() as i32).encode(&mut w)?;
                for v in entries {
                    VarInt(v.to_index() as i32).encode(&mut w)?;
                }
                Ok(())
            }
            Palette::Global { .. } => Ok(()),
        }
    }

    pub(crate) fn written_size(&self) -> usize {
        match self {
            Palette::SingleValue(v) => VarInt(v.to_index() as i32).written_size(),
            Palette::Linear { .. } | Palette::HashMap { .. } => {
                let entries = self.entries();
                VarInt(entries.len() as i32).written_size()
                    + entries
                        .iter()
                        .map(|v| VarInt(v.to_index() as i32).written_size())
                        .sum::<usize>()
            }
            Palette::Global { .. } => 0,
        }
    }

    /// Reads entries into an empty palette of the same strategy, rejecting
    /// ids outside `0..registry_len`.
    pub(crate) fn decode_into(&mut self, r: &mut &[u8], registry_len: usize) -> anyhow::Result<()> {
        let read_entry = |r: &mut &[u8]| -> anyhow::Result<T> {
            let id = VarInt::decode(r).context("failed to read palette entry")?.0;
            ensure!(
                id >= 0 && (id as usize) < registry_len,
                "palette entry {id} is outside the registry (size {registry_len})"
            );
            Ok(T::from_index(id as usize))
        };

        match self {
            Palette::SingleValue(v) => *v = read_entry(r)?,
            Palette::Linear { bits, values } => {
                let len = VarInt::decode(r)?.0;
                ensure!(
                    len >= 0 && len as usize <= 1 << *bits,
                    "linear palette of {len} entries exceeds {bits} bits"
                );
                values.clear();
                for _ in 0..len {
                    values.push(read_entry(r)?);
                }
            }
            Palette::HashMap { bits, values, ids } => {
                let len = VarInt::decode(r)?.0;
                ensure!(
                    len >= 0 && len as usize <= 1 << *bits,
                    "hash map palette of {len} entries exceeds {bits} bits"
                );
                values.clear();
                ids.clear();
                for i in 0..len {
                    let v = read_entry(r)?;
                    values.push(v);
                    ids.entry(v).or_insert(i as u32);
                }
            }
            Palette::Global { .. } => {}
        }

        Ok(())
    }
}
