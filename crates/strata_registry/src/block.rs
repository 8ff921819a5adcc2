//! Block states and the block registry.
//!
//! Every block state id maps to a [`BlockStateInfo`] describing the handful of
//! properties chunk storage cares about. Behavior (shapes, ticking logic,
//! drops) lives elsewhere; only the flags needed for section counters,
//! heightmaps and block entity bookkeeping are kept here.

use anyhow::Context;
use bitfield_struct::bitfield;
use serde::{Deserialize, Serialize};

use crate::{IdMap, Registry, RegistryError, RegistryIdx};

macro_rules! registry_idx {
    ($(#[$attr:meta])* $name:ident($inner:ty)) => {
        $(#[$attr])*
        #[derive(
            Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl RegistryIdx for $name {
            const MAX: usize = <$inner>::MAX as usize;

            #[inline]
            fn to_index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            fn from_index(idx: usize) -> Self {
                Self(idx as $inner)
            }
        }
    };
}

registry_idx! {
    /// The id of a single block state (a block together with its properties).
    BlockState(u16)
}

registry_idx! {
    /// The id of a block type. Several states may share one block kind.
    BlockKind(u16)
}

registry_idx! {
    /// The id of a fluid. [`FluidKind::EMPTY`] is the absence of fluid.
    FluidKind(u8)
}

registry_idx! {
    /// The id of a block entity type.
    BlockEntityKind(u16)
}

impl FluidKind {
    pub const EMPTY: Self = Self(0);

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[bitfield(u16)]
#[derive(PartialEq, Eq, Hash)]
pub struct StateFlags {
    pub air: bool,
    pub blocks_motion: bool,
    pub leaves: bool,
    pub random_ticks: bool,
    #[bits(4)]
    pub light_emission: u8,
    #[bits(8)]
    __: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BlockStateInfo {
    pub block: BlockKind,
    pub flags: StateFlags,
    pub fluid: FluidKind,
    pub block_entity: Option<BlockEntityKind>,
}

#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct Fluid {
    pub random_ticks: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct BlockEntityType {
    /// Block entities of this type are bound to the ticker once their chunk
    /// is live.
    pub ticks: bool,
    /// Block entities of this type receive game events dispatched in their
    /// section.
    pub listens: bool,
}

/// Serializable description of a block catalog, usually loaded from JSON.
///
/// ```
/// use strata_registry::BlockRegistry;
///
/// let blocks = BlockRegistry::from_json(
///     r#"{
///         "states": [
///             { "block": "air", "air": true },
///             { "block": "void_air", "air": true },
///             { "block": "stone", "blocks_motion": true }
///         ]
///     }"#,
/// )
/// .unwrap();
///
/// let stone = blocks.state("stone").unwrap();
/// assert!(blocks.info(stone).flags.blocks_motion());
/// ```
#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub struct BlockCatalog {
    #[serde(default)]
    pub fluids: Vec<FluidEntry>,
    #[serde(default)]
    pub block_entities: Vec<BlockEntityEntry>,
    pub states: Vec<StateEntry>,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub struct FluidEntry {
    pub name: String,
    #[serde(default)]
    pub random_ticks: bool,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub struct BlockEntityEntry {
    pub name: String,
    #[serde(default)]
    pub ticks: bool,
    #[serde(default)]
    pub listens: bool,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug)]
#[serde(default)]
pub struct StateEntry {
    pub block: String,
    /// Property suffix such as `axis=y`. Empty for blocks without properties.
    pub properties: String,
    pub air: bool,
    pub blocks_motion: bool,
    pub leaves: bool,
    pub random_ticks: bool,
    pub light: u8,
    pub fluid: Option<String>,
    pub block_entity: Option<String>,
}

impl StateEntry {
    fn state_name(&self) -> String {
        if self.properties.is_empty() {
            self.block.clone()
        } else {
            format!("{}[{}]", self.block, self.properties)
        }
    }
}

#[derive(Clone, Debug)]
pub struct BlockRegistry {
    states: Registry<BlockState, BlockStateInfo>,
    blocks: Registry<BlockKind, ()>,
    fluids: Registry<FluidKind, Fluid>,
    block_entities: Registry<BlockEntityKind, BlockEntityType>,
    air: BlockState,
    void_air: BlockState,
}

impl BlockRegistry {
    pub const EMPTY_FLUID: &'static str = "empty";

    /// Builds a registry from a catalog. The catalog must contain an `air`
    /// and a `void_air` state. `air` is moved to id 0.
    pub fn from_catalog(catalog: &BlockCatalog) -> Result<Self, RegistryError> {
        let mut fluids = Registry::new();
        fluids.insert(Self::EMPTY_FLUID, Fluid::default())?;
        for f in &catalog.fluids {
            if f.name != Self::EMPTY_FLUID {
                fluids.insert(f.name.as_str(), Fluid {
                    random_ticks: f.random_ticks,
                })?;
            }
        }

        let mut block_entities = Registry::new();
        for be in &catalog.block_entities {
            block_entities.insert(be.name.as_str(), BlockEntityType {
                ticks: be.ticks,
                listens: be.listens,
            })?;
        }

        let mut entries: Vec<&StateEntry> = catalog.states.iter().collect();
        // Air first so that the default state of a fresh container is air.
        if let Some(i) = entries.iter().position(|e| e.block == "air") {
            let air = entries.remove(i);
            entries.insert(0, air);
        }

        let mut blocks = Registry::new();
        let mut states = Registry::new();

        for entry in entries {
            let name = entry.state_name();

            let block = match blocks.index_of(&entry.block) {
                Some(kind) => kind,
                None => blocks.insert(entry.block.as_str(), ())?,
            };

            let fluid = match &entry.fluid {
                Some(f) => fluids
                    .index_of(f)
                    .ok_or_else(|| RegistryError::Unknown(f.clone(), name.clone()))?,
                None => FluidKind::EMPTY,
            };

            let block_entity = match &entry.block_entity {
                Some(be) => Some(
                    block_entities
                        .index_of(be)
                        .ok_or_else(|| RegistryError::Unknown(be.clone(), name.clone()))?,
                ),
                None => None,
            };

            let flags = StateFlags::new()
                .with_air(entry.air)
                .with_blocks_motion(entry.blocks_motion)
                .with_leaves(entry.leaves)
                .with_random_ticks(entry.random_ticks)
                .with_light_emission(entry.light.min(15));

            states.insert(name, BlockStateInfo {
                block,
                flags,
                fluid,
                block_entity,
            })?;
        }

        let air = states
            .index_of("air")
            .ok_or_else(|| RegistryError::Missing("air".into()))?;
        let void_air = states
            .index_of("void_air")
            .ok_or_else(|| RegistryError::Missing("void_air".into()))?;

        Ok(Self {
            states,
            blocks,
            fluids,
            block_entities,
            air,
            void_air,
        })
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let catalog: BlockCatalog =
            serde_json::from_str(json).context("failed to parse block catalog")?;

        Ok(Self::from_catalog(&catalog)?)
    }

    /// The plain air state. Always id 0.
    pub fn air(&self) -> BlockState {
        self.air
    }

    /// The state reported for positions outside a chunk's build height.
    pub fn void_air(&self) -> BlockState {
        self.void_air
    }

    pub fn state(&self, name: &str) -> Option<BlockState> {
        self.states.index_of(name)
    }

    pub fn state_name(&self, state: BlockState) -> Option<&str> {
        self.states.name(state)
    }

    /// Properties of `state`.
    ///
    /// # Panics
    ///
    /// Panics if `state` is not registered.
    #[track_caller]
    pub fn info(&self, state: BlockState) -> &BlockStateInfo {
        match self.states.get(state) {
            Some(info) => info,
            None => panic!("block state {} is not registered", state.0),
        }
    }

    pub fn is_air(&self, state: BlockState) -> bool {
        self.info(state).flags.air()
    }

    pub fn blocks_motion(&self, state: BlockState) -> bool {
        self.info(state).flags.blocks_motion()
    }

    pub fn is_leaves(&self, state: BlockState) -> bool {
        self.info(state).flags.leaves()
    }

    pub fn is_randomly_ticking(&self, state: BlockState) -> bool {
        self.info(state).flags.random_ticks()
    }

    pub fn light_emission(&self, state: BlockState) -> u8 {
        self.info(state).flags.light_emission()
    }

    pub fn fluid(&self, state: BlockState) -> FluidKind {
        self.info(state).fluid
    }

    pub fn is_fluid_randomly_ticking(&self, state: BlockState) -> bool {
        let fluid = self.fluid(state);
        !fluid.is_empty() && self.fluids.get(fluid).is_some_and(|f| f.random_ticks)
    }

    pub fn block_entity(&self, state: BlockState) -> Option<BlockEntityKind> {
        self.info(state).block_entity
    }

    pub fn block_kind(&self, state: BlockState) -> BlockKind {
        self.info(state).block
    }

    pub fn block_kinds(&self) -> &Registry<BlockKind, ()> {
        &self.blocks
    }

    pub fn fluids(&self) -> &Registry<FluidKind, Fluid> {
        &self.fluids
    }

    pub fn block_entity_types(&self) -> &Registry<BlockEntityKind, BlockEntityType> {
        &self.block_entities
    }

    pub fn block_entity_type(&self, kind: BlockEntityKind) -> Option<&BlockEntityType> {
        self.block_entities.get(kind)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockState, &str, &BlockStateInfo)> + '_ {
        self.states.iter()
    }
}

impl IdMap<BlockState> for BlockRegistry {
    fn id_count(&self) -> usize {
        self.states.len()
    }

    fn name_of(&self, id: BlockState) -> Option<&str> {
        self.states.name(id)
    }

    fn id_of(&self, name: &str) -> Option<BlockState> {
        self.states.index_of(name)
    }
}

impl BlockCatalog {
    /// A small catalog covering the block categories chunk storage
    /// distinguishes.
    pub fn builtin() -> Self {
        fn solid(block: &str) -> StateEntry {
            StateEntry {
                block: block.into(),
                blocks_motion: true,
                ..Default::default()
            }
        }

        fn air(block: &str) -> StateEntry {
            StateEntry {
                block: block.into(),
                air: true,
                ..Default::default()
            }
        }

        let mut states = vec![air("air"), air("void_air"), air("cave_air")];
        states.extend(
            ["stone", "dirt", "bedrock", "sand", "gravel", "cobblestone"]
                .into_iter()
                .map(solid),
        );
        states.push(StateEntry {
            random_ticks: true,
            ..solid("grass_block")
        });
        for axis in ["x", "y", "z"] {
            states.push(StateEntry {
                properties: format!("axis={axis}"),
                ..solid("oak_log")
            });
        }
        states.push(StateEntry {
            leaves: true,
            random_ticks: true,
            ..solid("oak_leaves")
        });
        states.push(StateEntry {
            fluid: Some("water".into()),
            ..StateEntry::default()
        });
        states.push(StateEntry {
            light: 15,
            fluid: Some("lava".into()),
            ..StateEntry::default()
        });
        states.push(StateEntry {
            light: 15,
            ..solid("glowstone")
        });
        states.push(StateEntry {
            block: "torch".into(),
            light: 14,
            ..StateEntry::default()
        });
        states.push(StateEntry {
            block_entity: Some("chest".into()),
            ..solid("chest")
        });
        states.push(StateEntry {
            block_entity: Some("furnace".into()),
            ..solid("furnace")
        });
        states.push(StateEntry {
            block_entity: Some("sculk_sensor".into()),
            light: 1,
            ..solid("sculk_sensor")
        });

        // Fluid states have no block name of their own above. Name them after
        // their fluid.
        for s in &mut states {
            if s.block.is_empty() {
                if let Some(f) = &s.fluid {
                    s.block.clone_from(f);
                }
            }
        }

        Self {
            fluids: vec![
                FluidEntry {
                    name: "water".into(),
                    random_ticks: false,
                },
                FluidEntry {
                    name: "lava".into(),
                    random_ticks: true,
                },
            ],
            block_entities: vec![
                BlockEntityEntry {
                    name: "chest".into(),
                    ticks: false,
                    listens: false,
                },
                BlockEntityEntry {
                    name: "furnace".into(),
                    ticks: true,
                    listens: false,
                },
                BlockEntityEntry {
                    name: "sculk_sensor".into(),
                    ticks: true,
                    listens: true,
                },
            ],
            states,
        }
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::from_catalog(&BlockCatalog::builtin()).expect("built-in block catalog is invalid")
    }
}
