//! # Light Merger Module
//!
//! The fan-in pipeline stage: once a chunk and its face-adjacent neighbors
//! have all finished internal lighting, light is allowed to cross the chunk's
//! borders. The merger snapshots each neighbor's facing boundary plane, seeds
//! the center chunk's boundary at the decayed level, and re-runs the flood
//! fill inside the center chunk.
//!
//! Only the center chunk is written. Each position runs its own merge, so
//! border light lands on both sides once both merges have run.
//!
//! Neighbor planes are copied out one chunk at a time before the center's
//! write lock is taken; holding a write lock while waiting on a neighbor
//! would let two adjacent merges deadlock each other.

use std::collections::VecDeque;

use cgmath::Point3;
use serde::{Deserialize, Serialize};

use crate::core::MtResource;
use crate::voxels::block::block_side::BlockSide;
use crate::voxels::chunk::{Chunk, ChunkState, CHUNK_DIMENSION};

use super::{flood, LightChannel};

/// The result of a merge attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Boundary light was merged into the center chunk.
    Merged,
    /// A required chunk is not yet past internal lighting (or was disposed);
    /// nothing was written. The caller should retry once neighbors catch up —
    /// this is a scheduling deferral, not an error.
    NotReady,
}

/// The loaded world's bounds in chunk coordinates, inclusive.
///
/// Positions outside the extent are never required as merge neighbors: the
/// world edge behaves as fully opaque, so light neither enters from nor
/// escapes into unmaterialized space. Vertical bounds are hard stops for
/// downward propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldExtent {
    /// Minimum chunk coordinate on each axis, inclusive.
    pub min: [i32; 3],
    /// Maximum chunk coordinate on each axis, inclusive.
    pub max: [i32; 3],
}

impl WorldExtent {
    /// Returns whether a chunk position lies inside the extent.
    pub fn contains(&self, position: Point3<i32>) -> bool {
        position.x >= self.min[0]
            && position.x <= self.max[0]
            && position.y >= self.min[1]
            && position.y <= self.max[1]
            && position.z >= self.min[2]
            && position.z <= self.max[2]
    }
}

impl Default for WorldExtent {
    fn default() -> Self {
        // Effectively unbounded horizontally; an 8-chunk-tall world vertically.
        WorldExtent {
            min: [-1_000_000, 0, -1_000_000],
            max: [1_000_000, 7, 1_000_000],
        }
    }
}

/// Returns the chunk positions a merge at `position` needs: the position
/// itself followed by its face-adjacent neighbors, reduced at world edges.
pub fn required_neighbors(position: Point3<i32>, extent: &WorldExtent) -> Vec<Point3<i32>> {
    let mut required = Vec::with_capacity(7);
    required.push(position);
    for side in BlockSide::all() {
        let neighbor = position + side.offset();
        if extent.contains(neighbor) {
            required.push(neighbor);
        }
    }
    required
}

/// A boundary seed copied out of a neighbor: the center-local voxel it feeds
/// and the neighbor's light levels at the touching voxel.
struct BoundarySeed {
    voxel: Point3<i32>,
    sunlight: u8,
    block_light: u8,
}

/// Merges boundary light from the neighbors into the center chunk.
///
/// `inputs` is the set returned by `required_neighbors`, paired with chunk
/// handles: the center first, then its available neighbors. Returns
/// `NotReady` without writing anything if any input is not yet past
/// `InternalLightDone` or has been disposed.
///
/// Running the merge twice against the same neighbor snapshot is a no-op the
/// second time: seeds only apply when they raise a value, and the flood fill
/// stops at the same fixed point.
pub fn merge_light(inputs: &[(Point3<i32>, MtResource<Chunk>)]) -> MergeOutcome {
    let (center_position, center_handle) = &inputs[0];

    let mut seeds: Vec<BoundarySeed> = Vec::new();
    for (position, handle) in &inputs[1..] {
        let neighbor = handle.get();
        if !past_internal_lighting(neighbor.state()) {
            return MergeOutcome::NotReady;
        }
        let offset = position - center_position;
        collect_boundary_seeds(&neighbor, offset, &mut seeds);
    }

    let mut center = center_handle.get_mut();
    if !past_internal_lighting(center.state()) {
        return MergeOutcome::NotReady;
    }
    center.set_state(ChunkState::MergePending);

    let mut sun_queue = VecDeque::new();
    let mut block_queue = VecDeque::new();
    for seed in seeds {
        if !center.is_translucent_at(seed.voxel) {
            continue;
        }
        if seed.sunlight > 1 && seed.sunlight - 1 > center.sunlight_at(seed.voxel) {
            center.set_sunlight_at(seed.voxel, seed.sunlight - 1);
            sun_queue.push_back(seed.voxel);
        }
        if seed.block_light > 1 && seed.block_light - 1 > center.block_light_at(seed.voxel) {
            center.set_block_light_at(seed.voxel, seed.block_light - 1);
            block_queue.push_back(seed.voxel);
        }
    }
    flood(&mut center, &mut sun_queue, LightChannel::Sun);
    flood(&mut center, &mut block_queue, LightChannel::Block);

    MergeOutcome::Merged
}

fn past_internal_lighting(state: ChunkState) -> bool {
    state >= ChunkState::InternalLightDone && state != ChunkState::Disposed
}

/// Copies the neighbor's boundary plane facing the center into seed records.
///
/// `offset` is the neighbor's position minus the center's: a unit axis vector
/// selecting which pair of planes touch.
fn collect_boundary_seeds(
    neighbor: &Chunk,
    offset: cgmath::Vector3<i32>,
    seeds: &mut Vec<BoundarySeed>,
) {
    let far = CHUNK_DIMENSION - 1;
    for a in 0..CHUNK_DIMENSION {
        for b in 0..CHUNK_DIMENSION {
            // The center voxel on the touching face and the neighbor voxel
            // directly across the border from it.
            let (center_voxel, neighbor_voxel) = match (offset.x, offset.y, offset.z) {
                (1, 0, 0) => (Point3::new(far, a, b), Point3::new(0, a, b)),
                (-1, 0, 0) => (Point3::new(0, a, b), Point3::new(far, a, b)),
                (0, 1, 0) => (Point3::new(a, far, b), Point3::new(a, 0, b)),
                (0, -1, 0) => (Point3::new(a, 0, b), Point3::new(a, far, b)),
                (0, 0, 1) => (Point3::new(a, b, far), Point3::new(a, b, 0)),
                (0, 0, -1) => (Point3::new(a, b, 0), Point3::new(a, b, far)),
                _ => unreachable!("merge neighbor is not face-adjacent"),
            };
            seeds.push(BoundarySeed {
                voxel: center_voxel,
                sunlight: neighbor.sunlight_at(neighbor_voxel),
                block_light: neighbor.block_light_at(neighbor_voxel),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::internal_light::generate_internal_lighting;
    use crate::voxels::block::block_type::BlockType;
    use crate::voxels::chunk::MAX_LIGHT;

    fn p(x: i32, y: i32, z: i32) -> Point3<i32> {
        Point3::new(x, y, z)
    }

    /// An open-sky chunk next to a roofed chunk: before the merge the roofed
    /// chunk is dark inside, afterwards sunlight enters through the shared
    /// border at one level below maximum.
    fn lit_pair() -> (MtResource<Chunk>, MtResource<Chunk>) {
        let mut left = Chunk::empty(&p(0, 0, 0));
        generate_internal_lighting(&mut left);

        let mut right = Chunk::empty(&p(1, 0, 0));
        for x in 0..CHUNK_DIMENSION {
            for z in 0..CHUNK_DIMENSION {
                right.set_block_at(p(x, 15, z), BlockType::STONE);
            }
        }
        generate_internal_lighting(&mut right);

        (MtResource::new(left), MtResource::new(right))
    }

    #[test]
    fn sunlight_crosses_the_border() {
        let (left, right) = lit_pair();
        assert_eq!(right.get().sunlight_at(p(0, 10, 8)), 0);

        let outcome = merge_light(&[(p(1, 0, 0), right.clone()), (p(0, 0, 0), left)]);
        assert_eq!(outcome, MergeOutcome::Merged);

        let merged = right.get();
        assert_eq!(merged.sunlight_at(p(0, 10, 8)), MAX_LIGHT - 1);
        assert_eq!(merged.sunlight_at(p(1, 10, 8)), MAX_LIGHT - 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let (left, right) = lit_pair();
        let inputs = [(p(1, 0, 0), right.clone()), (p(0, 0, 0), left)];

        assert_eq!(merge_light(&inputs), MergeOutcome::Merged);
        let first: Vec<u8> = snapshot(&right.get());

        assert_eq!(merge_light(&inputs), MergeOutcome::Merged);
        let second: Vec<u8> = snapshot(&right.get());

        assert_eq!(first, second);
    }

    #[test]
    fn unlit_neighbor_defers_the_merge() {
        let (left, right) = lit_pair();
        let raw = MtResource::new(Chunk::empty(&p(2, 0, 0)));

        let outcome = merge_light(&[
            (p(1, 0, 0), right.clone()),
            (p(0, 0, 0), left),
            (p(2, 0, 0), raw),
        ]);
        assert_eq!(outcome, MergeOutcome::NotReady);
        assert_eq!(right.get().sunlight_at(p(0, 10, 8)), 0);
    }

    #[test]
    fn required_neighbors_respects_world_edges() {
        let extent = WorldExtent {
            min: [0, 0, 0],
            max: [3, 3, 3],
        };
        let corner = required_neighbors(p(0, 0, 0), &extent);
        assert_eq!(corner.len(), 4); // itself + three in-extent faces
        assert_eq!(corner[0], p(0, 0, 0));

        let interior = required_neighbors(p(1, 1, 1), &extent);
        assert_eq!(interior.len(), 7);
    }

    fn snapshot(chunk: &Chunk) -> Vec<u8> {
        let mut values = Vec::new();
        for z in 0..CHUNK_DIMENSION {
            for y in 0..CHUNK_DIMENSION {
                for x in 0..CHUNK_DIMENSION {
                    values.push(chunk.sunlight_at(p(x, y, z)));
                    values.push(chunk.block_light_at(p(x, y, z)));
                }
            }
        }
        values
    }
}
