//! # Block Type Module
//!
//! This module defines the different types of blocks in the voxel world.
//! It provides functionality for block type identification, conversion, and
//! the per-type properties the lighting passes depend on.

use num_derive::FromPrimitive;

use super::BlockTypeSize;

/// Enumerates all possible block types in the voxel world.
///
/// Each variant represents a distinct type of block. The `FromPrimitive`
/// derive allows conversion from the integers stored in a chunk's dense
/// block array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BlockType {
    /// An air block, which is non-solid and fully translucent.
    AIR,

    /// A basic stone block, opaque.
    STONE,

    /// A dirt block, opaque.
    DIRT,

    /// A grass block, opaque.
    GRASS,

    /// A water block, translucent to light.
    WATER,

    /// A light-emitting block.
    GLOWSTONE,
}

/// The light level emitted by a `GLOWSTONE` block.
pub const GLOWSTONE_LUMINANCE: u8 = 10;

impl BlockType {
    /// Converts a `BlockTypeSize` to a `BlockType`.
    ///
    /// This is used when reading a chunk's compact block array back into the
    /// rich enum type.
    ///
    /// # Arguments
    /// * `btype` - The block type as a `BlockTypeSize`
    ///
    /// # Returns
    /// The corresponding `BlockType`
    ///
    /// # Panics
    /// Panics if the input value doesn't correspond to a valid `BlockType`.
    pub fn get_block_type_from_int(btype: BlockTypeSize) -> Self {
        let btype_option = num::FromPrimitive::from_u8(btype);
        btype_option.unwrap()
    }

    /// Generates a random block type (excluding AIR).
    ///
    /// This is primarily used for testing and procedural generation.
    ///
    /// # Returns
    /// A random `BlockType` that is not `BlockType::AIR`
    pub fn get_random_type() -> Self {
        num::FromPrimitive::from_u8(fastrand::u8(1..6)).unwrap()
    }

    /// Returns whether light passes through this block type.
    ///
    /// Translucent blocks take part in the flood fill; opaque blocks are hard
    /// stops for propagation in every direction.
    pub fn is_translucent(&self) -> bool {
        matches!(self, BlockType::AIR | BlockType::WATER)
    }

    /// Returns the light level this block type emits on its own.
    ///
    /// Non-zero luminance seeds a point-light propagation during the internal
    /// lighting pass.
    pub fn luminance(&self) -> u8 {
        match self {
            BlockType::GLOWSTONE => GLOWSTONE_LUMINANCE,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_compact_representation() {
        for ty in [
            BlockType::AIR,
            BlockType::STONE,
            BlockType::DIRT,
            BlockType::GRASS,
            BlockType::WATER,
            BlockType::GLOWSTONE,
        ] {
            assert_eq!(BlockType::get_block_type_from_int(ty as BlockTypeSize), ty);
        }
    }

    #[test]
    fn light_properties() {
        assert!(BlockType::AIR.is_translucent());
        assert!(BlockType::WATER.is_translucent());
        assert!(!BlockType::STONE.is_translucent());
        assert_eq!(BlockType::GLOWSTONE.luminance(), GLOWSTONE_LUMINANCE);
        assert_eq!(BlockType::AIR.luminance(), 0);
    }
}
