//! # Lighting Module
//!
//! The two lighting passes of the chunk pipeline:
//! - `internal_light`: sunlight and point-light computation using only data
//!   inside a single chunk
//! - `light_merger`: the fan-in pass that lets light cross chunk borders once
//!   a chunk's face-adjacent neighbors are lit
//!
//! Both passes share one explicit work-list flood fill: light spreads to
//! face-adjacent translucent voxels at level − 1, and a write only happens
//! when the propagated level exceeds the value already held — the fixed point
//! that terminates the fill and makes the merge idempotent.

use std::collections::VecDeque;

use cgmath::Point3;

use crate::voxels::block::block_side::BlockSide;
use crate::voxels::chunk::Chunk;

pub mod internal_light;
pub mod light_merger;

/// Which of the two packed light channels a flood fill writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LightChannel {
    /// Sunlight: the high nibble.
    Sun,
    /// Block (point) light: the low nibble.
    Block,
}

impl LightChannel {
    #[inline]
    fn get(&self, chunk: &Chunk, local: Point3<i32>) -> u8 {
        match self {
            LightChannel::Sun => chunk.sunlight_at(local),
            LightChannel::Block => chunk.block_light_at(local),
        }
    }

    #[inline]
    fn set(&self, chunk: &mut Chunk, local: Point3<i32>, level: u8) {
        match self {
            LightChannel::Sun => chunk.set_sunlight_at(local, level),
            LightChannel::Block => chunk.set_block_light_at(local, level),
        }
    }
}

/// Runs the flood fill for one channel from the queued seed voxels.
///
/// Every voxel in the queue must already hold its light value. Spreading
/// stops at chunk bounds and opaque voxels, and when the decremented level
/// would not exceed the neighbor's current value.
pub(crate) fn flood(chunk: &mut Chunk, queue: &mut VecDeque<Point3<i32>>, channel: LightChannel) {
    while let Some(voxel) = queue.pop_front() {
        let level = channel.get(chunk, voxel);
        if level <= 1 {
            continue;
        }
        let spread = level - 1;
        for side in BlockSide::all() {
            let adjacent = voxel + side.offset();
            if !Chunk::in_bounds(adjacent) {
                continue;
            }
            if !chunk.is_translucent_at(adjacent) {
                continue;
            }
            if spread > channel.get(chunk, adjacent) {
                channel.set(chunk, adjacent, spread);
                queue.push_back(adjacent);
            }
        }
    }
}
