use std::collections::HashMap;

use slime_util::{nbt::NBT, NibbleArray};

pub const SECTIONS_PER_CHUNK: usize = 16;
pub const BLOCKS_PER_SECTION: usize = 4096;
/// Legacy biomes, one byte per column.
pub const LEGACY_BIOMES: usize = 256;

const AIR_BLOCKS: [&str; 3] = ["minecraft:air", "minecraft:cave_air", "minecraft:void_air"];

/// Chunk coordinates folded into one ordered key, `z * i32::MAX + x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey(pub i64);

impl ChunkKey {
    pub fn new(x: i32, z: i32) -> Self {
        Self(z as i64 * i32::MAX as i64 + x as i64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBlocks {
    /// One byte block id per block plus 4 bits of block data.
    Legacy {
        blocks: Box<[u8]>,
        data: NibbleArray,
    },
    /// Indices into `palette`, packed into longs.
    Modern {
        palette: Vec<NBT>,
        block_states: Box<[i64]>,
    },
}

impl SectionBlocks {
    pub fn empty_legacy() -> Self {
        SectionBlocks::Legacy {
            blocks: vec![0; BLOCKS_PER_SECTION].into_boxed_slice(),
            data: NibbleArray::new(BLOCKS_PER_SECTION),
        }
    }

    /// Blocks that carry no information: every legacy id is zero, or every
    /// palette index is zero and the first palette entry is air.
    pub fn is_degenerate(&self) -> bool {
        match self {
            SectionBlocks::Legacy { blocks, .. } => blocks.iter().all(|b| *b == 0),
            SectionBlocks::Modern {
                palette,
                block_states,
            } => {
                block_states.iter().all(|s| *s == 0)
                    && palette.first().is_none_or(|entry| {
                        entry
                            .get_str("Name")
                            .is_some_and(|name| AIR_BLOCKS.contains(&name))
                    })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlimeSection {
    pub blocks: SectionBlocks,
    pub block_light: Option<NibbleArray>,
    pub sky_light: Option<NibbleArray>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Biomes {
    /// Raw per-column bytes, kept verbatim.
    Legacy(Box<[u8]>),
    Modern(Box<[i32]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlimeChunk {
    pub x: i32,
    pub z: i32,
    pub world_name: String,
    pub biomes: Biomes,
    pub sections: [Option<SlimeSection>; SECTIONS_PER_CHUNK],
    pub tile_entities: Vec<NBT>,
    pub entities: Vec<NBT>,
    pub height_maps: NBT,
}

impl SlimeChunk {
    /// A chunk without sections, entities or height maps.
    pub fn new(world_name: &str, x: i32, z: i32, biomes: Biomes) -> Self {
        Self {
            x,
            z,
            world_name: world_name.to_owned(),
            biomes,
            sections: Default::default(),
            tile_entities: Vec::new(),
            entities: Vec::new(),
            height_maps: NBT::Compound(HashMap::new()),
        }
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.x, self.z)
    }

    /// No section present, omitted when the world is encoded.
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(Option::is_none)
    }

    pub fn present_sections(&self) -> impl Iterator<Item = (usize, &SlimeSection)> {
        self.sections
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    /// Every entity and tile entity of this chunk as one mutable iterator.
    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut NBT> {
        self.entities.iter_mut().chain(self.tile_entities.iter_mut())
    }
}

#[cfg(test)]
mod test {
    use slime_util::nbt_compound;

    use super::{ChunkKey, SectionBlocks};

    #[test]
    fn chunk_key_orders_by_z_then_x() {
        assert!(ChunkKey::new(5, 0) < ChunkKey::new(-5, 1));
        assert!(ChunkKey::new(-1, 3) < ChunkKey::new(0, 3));
        assert_ne!(ChunkKey::new(0, 1), ChunkKey::new(1, 0));
        assert_eq!(ChunkKey::new(2, -1).0, -(i32::MAX as i64) + 2);
    }

    #[test]
    fn degenerate_sections() {
        assert!(SectionBlocks::empty_legacy().is_degenerate());

        let air = SectionBlocks::Modern {
            palette: vec![nbt_compound!["Name" => "minecraft:air"]],
            block_states: vec![0; 256].into_boxed_slice(),
        };
        assert!(air.is_degenerate());

        let stone = SectionBlocks::Modern {
            palette: vec![nbt_compound!["Name" => "minecraft:stone"]],
            block_states: vec![0; 256].into_boxed_slice(),
        };
        assert!(!stone.is_degenerate());

        let mixed = SectionBlocks::Modern {
            palette: vec![
                nbt_compound!["Name" => "minecraft:air"],
                nbt_compound!["Name" => "minecraft:stone"],
            ],
            block_states: vec![0, 1].into_boxed_slice(),
        };
        assert!(!mixed.is_degenerate());

        let empty = SectionBlocks::Modern {
            palette: Vec::new(),
            block_states: Box::new([]),
        };
        assert!(empty.is_degenerate());
    }
}
