use serde::{Deserialize, Serialize};
use strata_protocol::BlockPos;
use strata_registry::{BlockEntityKind, BlockRegistry, BlockState};

/// A block entity in storage form. The payload is owned by the block entity
/// behavior layer and is opaque here.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BlockEntityTag {
    /// Registry name of the block entity type.
    pub id: String,
    pub pos: BlockPos,
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockEntity {
    pub kind: BlockEntityKind,
    pub pos: BlockPos,
    pub state: BlockState,
    pub data: Vec<u8>,
}

impl BlockEntity {
    pub fn new(kind: BlockEntityKind, pos: BlockPos, state: BlockState) -> Self {
        Self {
            kind,
            pos,
            state,
            data: vec![],
        }
    }

    pub fn to_tag(&self, blocks: &BlockRegistry) -> BlockEntityTag {
        BlockEntityTag {
            id: blocks
                .block_entity_types()
                .name(self.kind)
                .unwrap_or_default()
                .to_owned(),
            pos: self.pos,
            data: self.data.clone(),
        }
    }
}

/// Creates and tears down block entities when a live chunk's blocks change.
pub trait BlockEntityFactory: Send + Sync {
    /// Instantiates the block entity required by `state`.
    fn create(&self, kind: BlockEntityKind, pos: BlockPos, state: BlockState)
        -> Option<BlockEntity>;

    /// Instantiates a block entity from storage. The default keeps the
    /// payload as is.
    fn load(&self, kind: BlockEntityKind, state: BlockState, tag: BlockEntityTag) -> Option<BlockEntity> {
        Some(BlockEntity {
            kind,
            pos: tag.pos,
            state,
            data: tag.data,
        })
    }

    /// Called after a block entity was removed because its block changed.
    /// `moved` is set when the block is being relocated rather than
    /// destroyed.
    fn removed(&self, entity: &BlockEntity, moved: bool) {
        let _ = (entity, moved);
    }
}

/// Creates block entities with an empty payload.
#[derive(Copy, Clone, Default, Debug)]
pub struct EmptyBlockEntityFactory;

impl BlockEntityFactory for EmptyBlockEntityFactory {
    fn create(
        &self,
        kind: BlockEntityKind,
        pos: BlockPos,
        state: BlockState,
    ) -> Option<BlockEntity> {
        Some(BlockEntity::new(kind, pos, state))
    }
}
