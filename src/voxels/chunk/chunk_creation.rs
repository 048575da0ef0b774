//! # Chunk Creation Module
//!
//! This module provides a builder for creating and populating chunks while
//! keeping the block-id array and the opacity bit vector consistent, plus the
//! generators used by the demo binary and the tests.
//!
//! The builder pushes blocks in index order: X fastest, then Y, then Z —
//! matching `Chunk::index`.

use bitvec::vec::BitVec;
use cgmath::Point3;
use noise::{NoiseFn, Perlin};

use crate::voxels::block::block_type::BlockType;
use crate::voxels::block::BlockTypeSize;

use super::{Chunk, CHUNK_DIMENSION, CHUNK_SIZE};

/// Threshold above which Perlin noise is considered solid for terrain generation.
pub const PERLIN_POSITIVE_THRESHOLD: f64 = 0.2;
/// Threshold below which Perlin noise is considered empty for terrain generation.
pub const PERLIN_NEGATIVE_THRESHOLD: f64 = -0.2;
/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;

/// A builder for populating a chunk one block at a time.
///
/// Maintains the relationship between the dense block-id array and the
/// per-voxel opacity bits as blocks are added.
pub struct ChunkBuilder {
    /// The chunk-space position of the chunk being created.
    position: Point3<i32>,
    /// Dense block ids, in `Chunk::index` order.
    ids: Vec<BlockTypeSize>,
    /// One bit per voxel: set when the voxel blocks light.
    opaque_bits: BitVec,
}

impl ChunkBuilder {
    /// Creates a new `ChunkBuilder` for a chunk at the given position.
    ///
    /// # Arguments
    /// * `position` - The chunk-space position of the chunk to create
    pub fn new(position: Point3<i32>) -> Self {
        ChunkBuilder {
            position,
            ids: Vec::with_capacity(CHUNK_SIZE as usize),
            opaque_bits: BitVec::with_capacity(CHUNK_SIZE as usize),
        }
    }

    /// Adds a block at the next position in index order.
    ///
    /// # Arguments
    /// * `block_type` - The type of block to add
    pub fn push_block_type(&mut self, block_type: BlockType) {
        self.ids.push(block_type as BlockTypeSize);
        self.opaque_bits.push(!block_type.is_translucent());
    }

    /// Finalizes the chunk. The light field starts dark; the pipeline's
    /// lighting stages fill it in.
    ///
    /// # Panics
    /// Panics if fewer or more than `CHUNK_SIZE` blocks were pushed.
    pub fn return_chunk(self) -> Chunk {
        assert_eq!(
            self.ids.len(),
            CHUNK_SIZE as usize,
            "chunk builder finished with wrong block count"
        );
        Chunk::from_parts(self.position, self.ids, self.opaque_bits)
    }
}

impl Chunk {
    /// Creates a new, completely empty chunk (all blocks are air).
    ///
    /// # Arguments
    /// * `position` - The chunk coordinates of the new chunk
    pub fn empty(position: &Point3<i32>) -> Self {
        Self::solid(position, BlockType::AIR)
    }

    /// Creates a new chunk filled with a single block type.
    ///
    /// # Arguments
    /// * `position` - The chunk coordinates of the new chunk
    /// * `block_type` - The block type to fill with
    pub fn solid(position: &Point3<i32>, block_type: BlockType) -> Self {
        let mut builder = ChunkBuilder::new(*position);
        for _ in 0..CHUNK_SIZE {
            builder.push_block_type(block_type);
        }
        builder.return_chunk()
    }

    /// Creates a new chunk with random blocks (for testing purposes).
    ///
    /// # Arguments
    /// * `position` - The chunk coordinates of the new chunk
    pub fn random(position: &Point3<i32>) -> Self {
        let mut builder = ChunkBuilder::new(*position);
        let sparseness = 0.9;
        for _ in 0..CHUNK_SIZE {
            if fastrand::f64() < sparseness {
                builder.push_block_type(BlockType::AIR);
            } else {
                builder.push_block_type(BlockType::get_random_type());
            }
        }
        builder.return_chunk()
    }

    /// Generates a chunk using Perlin noise for natural-looking terrain.
    ///
    /// The terrain is generated by sampling 3D Perlin noise and applying
    /// thresholds to determine which blocks are solid, producing terrain
    /// with caves and overhangs.
    ///
    /// # Arguments
    /// * `position` - The chunk coordinates where the chunk will be placed
    pub fn perlin(position: &Point3<i32>) -> Self {
        let perlin = Perlin::new(0);
        let mut builder = ChunkBuilder::new(*position);

        for k in 0..CHUNK_DIMENSION {
            for j in 0..CHUNK_DIMENSION {
                for i in 0..CHUNK_DIMENSION {
                    let block_position = Point3::<i32>::new(
                        i + CHUNK_DIMENSION * position.x,
                        j + CHUNK_DIMENSION * position.y,
                        k + CHUNK_DIMENSION * position.z,
                    );
                    let sample = perlin.get(to_perlin_pos(block_position, PERLIN_SCALE_FACTOR));
                    if !(PERLIN_NEGATIVE_THRESHOLD..=PERLIN_POSITIVE_THRESHOLD).contains(&sample) {
                        builder.push_block_type(BlockType::STONE);
                    } else {
                        builder.push_block_type(BlockType::AIR);
                    }
                }
            }
        }

        builder.return_chunk()
    }
}

/// Converts block coordinates to scaled world-space coordinates for Perlin
/// noise sampling.
fn to_perlin_pos(pos: Point3<i32>, scale_factor: f64) -> [f64; 3] {
    [
        pos.x as f64 * scale_factor,
        pos.y as f64 * scale_factor,
        pos.z as f64 * scale_factor,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_in_index_order() {
        let mut builder = ChunkBuilder::new(Point3::new(0, 0, 0));
        for i in 0..CHUNK_SIZE {
            if i == 0 {
                builder.push_block_type(BlockType::STONE);
            } else {
                builder.push_block_type(BlockType::AIR);
            }
        }
        let chunk = builder.return_chunk();
        assert_eq!(chunk.block_at(Point3::new(0, 0, 0)), BlockType::STONE);
        assert_eq!(chunk.block_at(Point3::new(1, 0, 0)), BlockType::AIR);
        assert!(!chunk.is_translucent_at(Point3::new(0, 0, 0)));
    }

    #[test]
    #[should_panic]
    fn builder_rejects_short_chunks() {
        let mut builder = ChunkBuilder::new(Point3::new(0, 0, 0));
        builder.push_block_type(BlockType::AIR);
        let _ = builder.return_chunk();
    }
}
