//! # Chunk Module
//!
//! This module provides the `Chunk` struct: a fixed 16x16x16 store of block
//! data plus the packed light field the pipeline computes, and the lifecycle
//! state a chunk moves through on its way to `Ready`.
//!
//! ## Memory Optimization
//!
//! Chunks use a two-tier storage strategy:
//! - `store`: the dense block-id array, which the deflate stage collapses to a
//!   single id when every voxel holds the same block (the common case for
//!   all-air and all-stone chunks)
//! - `opaque_bits`: a bit vector (1 bit per voxel) answering the only question
//!   the flood fill asks in its inner loop — does light pass here — without
//!   decoding block ids
//!
//! The light field stays dense: one byte per voxel, sunlight in the high
//! nibble and block light in the low nibble.

use bitvec::vec::BitVec;
use cgmath::Point3;

use super::block::block_type::BlockType;
use super::block::BlockTypeSize;

mod chunk_creation;

pub use chunk_creation::ChunkBuilder;

/// The dimension (width, height, depth) of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single 2D plane of a chunk (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a chunk (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;
/// The maximum light level of either channel.
pub const MAX_LIGHT: u8 = 15;

/// The lifecycle state of a chunk as it moves through the pipeline.
///
/// States are ordered: a later state means the chunk has completed more
/// processing. The light merger uses this ordering to decide whether a
/// neighbor is far enough along to merge against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChunkState {
    /// Raw block data exists; no lighting has been computed.
    Generated,
    /// Accepted by the pipeline; the internal lighting pass has not finished.
    InternalLightPending,
    /// Single-chunk lighting is complete.
    InternalLightDone,
    /// Storage has been compacted; the chunk is eligible as a merge input.
    Deflated,
    /// A cross-chunk light merge has started for this chunk.
    MergePending,
    /// All stages complete; safe for external consumption.
    Ready,
    /// Evicted or superseded; storage has been released.
    Disposed,
}

/// Block storage for one chunk: dense ids, or a single id when uniform.
enum BlockStore {
    /// One `BlockTypeSize` per voxel, indexed by `Chunk::index`.
    Dense(Vec<BlockTypeSize>),
    /// Every voxel holds the same block type.
    Uniform(BlockTypeSize),
}

/// A 16x16x16 collection of voxel blocks plus their light values.
///
/// A chunk is created by a generator (or decoded from the network), mutated in
/// place by each pipeline stage, and disposed when evicted from the provider's
/// cache or superseded by a reload. While in the pipeline it is shared through
/// an `MtResource`, but the pipeline schedules at most one task per position
/// so each chunk has a single writer at any time.
pub struct Chunk {
    /// The position of this chunk in chunk coordinates (not block coordinates).
    pub position: Point3<i32>,

    /// Block storage, possibly collapsed by the deflate stage.
    store: BlockStore,

    /// One bit per voxel: set when the voxel blocks light.
    ///
    /// Empty while the store is uniform; the uniform id answers instead.
    opaque_bits: BitVec,

    /// Packed light values, one byte per voxel: sunlight in the high nibble,
    /// block light in the low nibble. Cleared on disposal.
    light: Vec<u8>,

    /// Lifecycle state; advanced by the pipeline stages and the provider.
    state: ChunkState,
}

impl Chunk {
    /// Computes the dense-array index of a local voxel coordinate.
    ///
    /// # Panics
    /// Debug builds panic when the coordinate is out of bounds.
    #[inline]
    fn index(local: Point3<i32>) -> usize {
        debug_assert!(Self::in_bounds(local), "voxel out of bounds: {:?}", local);
        (local.x + CHUNK_DIMENSION * local.y + CHUNK_PLANE_SIZE * local.z) as usize
    }

    /// Returns whether a local voxel coordinate lies inside the chunk.
    #[inline]
    pub fn in_bounds(local: Point3<i32>) -> bool {
        local.x >= 0
            && local.x < CHUNK_DIMENSION
            && local.y >= 0
            && local.y < CHUNK_DIMENSION
            && local.z >= 0
            && local.z < CHUNK_DIMENSION
    }

    /// Gets the block type at the given local voxel coordinate.
    pub fn block_at(&self, local: Point3<i32>) -> BlockType {
        let id = match &self.store {
            BlockStore::Dense(ids) => ids[Self::index(local)],
            BlockStore::Uniform(id) => *id,
        };
        BlockType::get_block_type_from_int(id)
    }

    /// Returns whether light passes through the voxel at the given coordinate.
    ///
    /// This is the flood fill's inner-loop query, answered from the bit vector
    /// without decoding the block id.
    #[inline]
    pub fn is_translucent_at(&self, local: Point3<i32>) -> bool {
        match &self.store {
            BlockStore::Dense(_) => !self.opaque_bits[Self::index(local)],
            BlockStore::Uniform(id) => BlockType::get_block_type_from_int(*id).is_translucent(),
        }
    }

    /// Returns the light level emitted by the block at the given coordinate.
    pub fn luminance_at(&self, local: Point3<i32>) -> u8 {
        self.block_at(local).luminance()
    }

    /// Replaces the block at the given coordinate.
    ///
    /// A uniform chunk is re-inflated to dense storage first. Light values are
    /// not recomputed; callers re-run the lighting passes as needed.
    pub fn set_block_at(&mut self, local: Point3<i32>, block_type: BlockType) {
        if let BlockStore::Uniform(id) = self.store {
            if id == block_type as BlockTypeSize {
                return;
            }
            let translucent = BlockType::get_block_type_from_int(id).is_translucent();
            self.store = BlockStore::Dense(vec![id; CHUNK_SIZE as usize]);
            self.opaque_bits = BitVec::repeat(!translucent, CHUNK_SIZE as usize);
        }
        let idx = Self::index(local);
        if let BlockStore::Dense(ids) = &mut self.store {
            ids[idx] = block_type as BlockTypeSize;
        }
        self.opaque_bits.set(idx, !block_type.is_translucent());
    }

    /// Gets the sunlight level (0..=15) at the given coordinate.
    ///
    /// Disposed chunks read as dark.
    #[inline]
    pub fn sunlight_at(&self, local: Point3<i32>) -> u8 {
        if self.light.is_empty() {
            return 0;
        }
        self.light[Self::index(local)] >> 4
    }

    /// Sets the sunlight level at the given coordinate. No-op once disposed.
    #[inline]
    pub fn set_sunlight_at(&mut self, local: Point3<i32>, level: u8) {
        debug_assert!(level <= MAX_LIGHT);
        if self.light.is_empty() {
            return;
        }
        let idx = Self::index(local);
        self.light[idx] = (self.light[idx] & 0x0F) | (level << 4);
    }

    /// Gets the block-light level (0..=15) at the given coordinate.
    ///
    /// Disposed chunks read as dark.
    #[inline]
    pub fn block_light_at(&self, local: Point3<i32>) -> u8 {
        if self.light.is_empty() {
            return 0;
        }
        self.light[Self::index(local)] & 0x0F
    }

    /// Sets the block-light level at the given coordinate. No-op once disposed.
    #[inline]
    pub fn set_block_light_at(&mut self, local: Point3<i32>, level: u8) {
        debug_assert!(level <= MAX_LIGHT);
        if self.light.is_empty() {
            return;
        }
        let idx = Self::index(local);
        self.light[idx] = (self.light[idx] & 0xF0) | level;
    }

    /// Returns the chunk's lifecycle state.
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Advances the chunk's lifecycle state.
    pub fn set_state(&mut self, state: ChunkState) {
        self.state = state;
    }

    /// Returns whether the chunk has completed all pipeline stages and been
    /// published by the provider.
    pub fn is_ready(&self) -> bool {
        self.state == ChunkState::Ready
    }

    /// Returns whether the chunk's storage has been released.
    pub fn is_disposed(&self) -> bool {
        self.state == ChunkState::Disposed
    }

    /// Marks the chunk ready. Called by the provider when it drains the ready
    /// queue into the cache.
    pub fn mark_ready(&mut self) {
        self.state = ChunkState::Ready;
    }

    /// Compacts the chunk's storage once its content is finalized for a stage.
    ///
    /// A chunk whose voxels all hold the same block collapses to a single id
    /// and drops its opacity bits. Light data is kept; the merge stage still
    /// has to write into it.
    pub fn deflate(&mut self) {
        if let BlockStore::Dense(ids) = &self.store {
            let first = ids[0];
            if ids.iter().all(|&id| id == first) {
                self.store = BlockStore::Uniform(first);
                self.opaque_bits = BitVec::new();
            }
        }
        self.state = ChunkState::Deflated;
    }

    /// Releases the chunk's storage and marks it disposed.
    ///
    /// Light and block reads return dark/air afterwards; writes are ignored.
    pub fn dispose(&mut self) {
        self.store = BlockStore::Uniform(BlockType::AIR as BlockTypeSize);
        self.opaque_bits = BitVec::new();
        self.light = Vec::new();
        self.state = ChunkState::Disposed;
    }

    pub(crate) fn from_parts(
        position: Point3<i32>,
        ids: Vec<BlockTypeSize>,
        opaque_bits: BitVec,
    ) -> Self {
        debug_assert_eq!(ids.len(), CHUNK_SIZE as usize);
        Chunk {
            position,
            store: BlockStore::Dense(ids),
            opaque_bits,
            light: vec![0; CHUNK_SIZE as usize],
            state: ChunkState::Generated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32, z: i32) -> Point3<i32> {
        Point3::new(x, y, z)
    }

    #[test]
    fn light_nibbles_are_independent() {
        let mut chunk = Chunk::empty(&p(0, 0, 0));
        chunk.set_sunlight_at(p(3, 4, 5), 15);
        chunk.set_block_light_at(p(3, 4, 5), 7);
        assert_eq!(chunk.sunlight_at(p(3, 4, 5)), 15);
        assert_eq!(chunk.block_light_at(p(3, 4, 5)), 7);

        chunk.set_sunlight_at(p(3, 4, 5), 2);
        assert_eq!(chunk.block_light_at(p(3, 4, 5)), 7);
    }

    #[test]
    fn deflate_collapses_uniform_chunks() {
        let mut chunk = Chunk::solid(&p(0, 0, 0), BlockType::STONE);
        chunk.deflate();
        assert_eq!(chunk.state(), ChunkState::Deflated);
        assert_eq!(chunk.block_at(p(8, 8, 8)), BlockType::STONE);
        assert!(!chunk.is_translucent_at(p(8, 8, 8)));
    }

    #[test]
    fn deflate_keeps_mixed_chunks_dense() {
        let mut chunk = Chunk::empty(&p(0, 0, 0));
        chunk.set_block_at(p(0, 0, 0), BlockType::STONE);
        chunk.deflate();
        assert_eq!(chunk.block_at(p(0, 0, 0)), BlockType::STONE);
        assert_eq!(chunk.block_at(p(1, 0, 0)), BlockType::AIR);
    }

    #[test]
    fn set_block_reinflates_uniform_storage() {
        let mut chunk = Chunk::solid(&p(0, 0, 0), BlockType::STONE);
        chunk.deflate();
        chunk.set_block_at(p(2, 3, 4), BlockType::AIR);
        assert_eq!(chunk.block_at(p(2, 3, 4)), BlockType::AIR);
        assert!(chunk.is_translucent_at(p(2, 3, 4)));
        assert_eq!(chunk.block_at(p(2, 3, 5)), BlockType::STONE);
    }

    #[test]
    fn dispose_releases_storage() {
        let mut chunk = Chunk::random(&p(0, 0, 0));
        chunk.set_sunlight_at(p(1, 1, 1), 9);
        chunk.dispose();
        assert!(chunk.is_disposed());
        assert_eq!(chunk.sunlight_at(p(1, 1, 1)), 0);
        chunk.set_sunlight_at(p(1, 1, 1), 5);
        assert_eq!(chunk.sunlight_at(p(1, 1, 1)), 0);
    }
}
