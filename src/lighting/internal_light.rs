//! # Internal Lighting Module
//!
//! The first pipeline stage: computes sunlight and point-light values for one
//! chunk using only data inside that chunk. Light crossing chunk borders is
//! the light merger's job, which runs later once neighbors exist.
//!
//! ## Algorithm
//!
//! 1. **Sky scan** — every vertical column is scanned downward from the top;
//!    translucent voxels receive maximum sunlight until the scan hits an
//!    opaque voxel, whose height is recorded as the column's "top".
//! 2. **Lateral entry** — a sunlit voxel sitting next to a taller obstructed
//!    column (above its own top, at or below a horizontal neighbor's top) is
//!    a horizontal opening: it seeds a propagation so sunlight bends into the
//!    shadowed column. This is a deliberate height-comparison heuristic, not
//!    a line-of-sight computation.
//! 3. **Point lights** — every voxel whose block has non-zero luminance is
//!    set to that luminance and seeds a propagation.
//! 4. **Flood fill** — both channels spread through translucent face
//!    neighbors at level − 1 until the fixed point.

use std::collections::VecDeque;

use cgmath::Point3;

use crate::voxels::block::block_side::BlockSide;
use crate::voxels::chunk::{Chunk, ChunkState, CHUNK_DIMENSION, MAX_LIGHT};

use super::{flood, LightChannel};

/// Computes sunlight and point-light values for a single chunk in place.
///
/// No neighbor access occurs; the chunk's borders behave as fully opaque.
/// On completion the chunk's state advances to `InternalLightDone`.
pub fn generate_internal_lighting(chunk: &mut Chunk) {
    chunk.set_state(ChunkState::InternalLightPending);

    let tops = populate_sunlight_columns(chunk);
    let mut sun_seeds = collect_lateral_seeds(&tops);
    flood(chunk, &mut sun_seeds, LightChannel::Sun);

    let mut light_seeds = collect_luminous_seeds(chunk);
    flood(chunk, &mut light_seeds, LightChannel::Block);

    chunk.set_state(ChunkState::InternalLightDone);
}

/// Scans every column downward from the sky, setting maximum sunlight through
/// translucent voxels.
///
/// Returns the per-column stop height: the Y of the first opaque voxel from
/// the top, or -1 for a fully open column.
fn populate_sunlight_columns(chunk: &mut Chunk) -> [[i32; CHUNK_DIMENSION as usize]; CHUNK_DIMENSION as usize] {
    let mut tops = [[-1i32; CHUNK_DIMENSION as usize]; CHUNK_DIMENSION as usize];
    for x in 0..CHUNK_DIMENSION {
        for z in 0..CHUNK_DIMENSION {
            for y in (0..CHUNK_DIMENSION).rev() {
                let voxel = Point3::new(x, y, z);
                if chunk.is_translucent_at(voxel) {
                    chunk.set_sunlight_at(voxel, MAX_LIGHT);
                } else {
                    tops[x as usize][z as usize] = y;
                    break;
                }
            }
        }
    }
    tops
}

/// Collects the lateral-entry seeds: sunlit voxels above their own column's
/// top but at or below an adjacent column's top.
///
/// Propagating from these is what lets sunlight slip sideways under overhangs
/// and into walled columns the sky scan could not reach.
fn collect_lateral_seeds(
    tops: &[[i32; CHUNK_DIMENSION as usize]; CHUNK_DIMENSION as usize],
) -> VecDeque<Point3<i32>> {
    let mut seeds = VecDeque::new();
    for x in 0..CHUNK_DIMENSION {
        for z in 0..CHUNK_DIMENSION {
            let own_top = tops[x as usize][z as usize];

            // The tallest horizontal neighbor decides how far up this
            // column's lit voxels can act as side entries.
            let mut highest_adjacent_top = -1;
            for side in BlockSide::horizontal() {
                let offset = side.offset();
                let nx = x + offset.x;
                let nz = z + offset.z;
                if nx < 0 || nx >= CHUNK_DIMENSION || nz < 0 || nz >= CHUNK_DIMENSION {
                    continue;
                }
                highest_adjacent_top = highest_adjacent_top.max(tops[nx as usize][nz as usize]);
            }

            for y in (own_top + 1)..=highest_adjacent_top.min(CHUNK_DIMENSION - 1) {
                seeds.push_back(Point3::new(x, y, z));
            }
        }
    }
    seeds
}

/// Sets every luminous voxel to its emission level and collects it as a seed.
fn collect_luminous_seeds(chunk: &mut Chunk) -> VecDeque<Point3<i32>> {
    let mut seeds = VecDeque::new();
    for z in 0..CHUNK_DIMENSION {
        for y in 0..CHUNK_DIMENSION {
            for x in 0..CHUNK_DIMENSION {
                let voxel = Point3::new(x, y, z);
                let luminance = chunk.luminance_at(voxel);
                if luminance > chunk.block_light_at(voxel) {
                    chunk.set_block_light_at(voxel, luminance);
                    seeds.push_back(voxel);
                }
            }
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::block::block_type::BlockType;

    fn p(x: i32, y: i32, z: i32) -> Point3<i32> {
        Point3::new(x, y, z)
    }

    #[test]
    fn fully_opaque_chunk_stays_dark() {
        let mut chunk = Chunk::solid(&p(0, 0, 0), BlockType::STONE);
        generate_internal_lighting(&mut chunk);
        for x in 0..CHUNK_DIMENSION {
            for y in 0..CHUNK_DIMENSION {
                for z in 0..CHUNK_DIMENSION {
                    assert_eq!(chunk.sunlight_at(p(x, y, z)), 0);
                    assert_eq!(chunk.block_light_at(p(x, y, z)), 0);
                }
            }
        }
        assert_eq!(chunk.state(), ChunkState::InternalLightDone);
    }

    #[test]
    fn open_columns_receive_full_sunlight() {
        let mut chunk = Chunk::empty(&p(0, 0, 0));
        generate_internal_lighting(&mut chunk);
        for x in 0..CHUNK_DIMENSION {
            for y in 0..CHUNK_DIMENSION {
                for z in 0..CHUNK_DIMENSION {
                    assert_eq!(chunk.sunlight_at(p(x, y, z)), MAX_LIGHT);
                }
            }
        }
    }

    #[test]
    fn luminous_block_above_a_floor() {
        // All air except an opaque floor at y=0 and one glowstone at (8,5,8).
        let mut chunk = Chunk::empty(&p(0, 0, 0));
        for x in 0..CHUNK_DIMENSION {
            for z in 0..CHUNK_DIMENSION {
                chunk.set_block_at(p(x, 0, z), BlockType::STONE);
            }
        }
        chunk.set_block_at(p(8, 5, 8), BlockType::GLOWSTONE);
        generate_internal_lighting(&mut chunk);

        assert_eq!(chunk.block_light_at(p(8, 5, 8)), 10);
        assert_eq!(chunk.block_light_at(p(8, 4, 8)), 9);
        assert_eq!(chunk.block_light_at(p(8, 6, 8)), 9);
        assert_eq!(chunk.block_light_at(p(10, 5, 8)), 8);
        for x in 0..CHUNK_DIMENSION {
            for z in 0..CHUNK_DIMENSION {
                assert_eq!(chunk.sunlight_at(p(x, 15, z)), MAX_LIGHT);
            }
        }
    }

    #[test]
    fn sunlight_bends_under_an_overhang() {
        // A single roof tile: the column below it is invisible to the sky
        // scan, but its open neighbors seed lateral entry.
        let mut chunk = Chunk::empty(&p(0, 0, 0));
        chunk.set_block_at(p(8, 15, 8), BlockType::STONE);
        generate_internal_lighting(&mut chunk);

        assert_eq!(chunk.sunlight_at(p(8, 15, 8)), 0);
        assert_eq!(chunk.sunlight_at(p(8, 14, 8)), MAX_LIGHT - 1);
        assert_eq!(chunk.sunlight_at(p(7, 14, 8)), MAX_LIGHT);
    }

    #[test]
    fn light_levels_decay_by_at_most_one_per_hop() {
        let mut chunk = Chunk::random(&p(0, 0, 0));
        chunk.set_block_at(p(4, 4, 4), BlockType::GLOWSTONE);
        generate_internal_lighting(&mut chunk);

        for x in 0..CHUNK_DIMENSION {
            for y in 0..CHUNK_DIMENSION {
                for z in 0..CHUNK_DIMENSION {
                    let voxel = p(x, y, z);
                    if !chunk.is_translucent_at(voxel) {
                        continue;
                    }
                    for side in BlockSide::all() {
                        let adjacent = voxel + side.offset();
                        if !Chunk::in_bounds(adjacent) || !chunk.is_translucent_at(adjacent) {
                            continue;
                        }
                        assert!(
                            chunk.sunlight_at(voxel) + 1 >= chunk.sunlight_at(adjacent),
                            "sunlight jump at {:?}",
                            voxel
                        );
                        assert!(
                            chunk.block_light_at(voxel) + 1 >= chunk.block_light_at(adjacent),
                            "block light jump at {:?}",
                            voxel
                        );
                    }
                }
            }
        }
    }
}
