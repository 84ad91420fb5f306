//! In-memory block storage.

use std::sync::Arc;

use rebar_utils::{BlockPos, ChunkPos, locks::SyncRwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{BlockAccess, FluidBlock};

/// A [`BlockAccess`] that keeps fluid blocks in memory and tracks which chunks
/// are loaded.
///
/// Blocks in unloaded chunks stay stored but are invisible to the network, the
/// same way a real world behaves between a chunk unload and reload.
#[derive(Default)]
pub struct FluidWorld {
    blocks: SyncRwLock<FxHashMap<BlockPos, Arc<dyn FluidBlock>>>,
    loaded_chunks: SyncRwLock<FxHashSet<ChunkPos>>,
}

impl FluidWorld {
    /// Creates an empty world with no loaded chunks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a block, loading its chunk. Returns the block it replaced.
    pub fn place(&self, pos: BlockPos, block: Arc<dyn FluidBlock>) -> Option<Arc<dyn FluidBlock>> {
        self.loaded_chunks.write().insert(pos.chunk());
        self.blocks.write().insert(pos, block)
    }

    /// Removes the block at `pos`.
    pub fn remove(&self, pos: BlockPos) -> Option<Arc<dyn FluidBlock>> {
        self.blocks.write().remove(&pos)
    }

    /// Marks a chunk as loaded.
    pub fn load_chunk(&self, chunk: ChunkPos) {
        self.loaded_chunks.write().insert(chunk);
    }

    /// Marks a chunk as unloaded. Its blocks are kept.
    pub fn unload_chunk(&self, chunk: ChunkPos) {
        self.loaded_chunks.write().remove(&chunk);
    }
}

impl BlockAccess for FluidWorld {
    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        self.loaded_chunks.read().contains(&chunk)
    }

    fn fluid_block(&self, pos: BlockPos) -> Option<Arc<dyn FluidBlock>> {
        self.blocks.read().get(&pos).cloned()
    }
}
