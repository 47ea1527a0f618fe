use std::{collections::HashMap, io::Read};

use slime_util::{
    nbt::NBT, BitSet, FixedBitSet, NibbleArray, ReadExt as _, WriteExt as _,
};

use super::DecodeContext;
use crate::{
    chunk::{BLOCKS_PER_SECTION, LEGACY_BIOMES},
    Biomes, ChunkKey, SectionBlocks, SlimeChunk, SlimeError, SlimeSection, WorldVersion,
    SECTIONS_PER_CHUNK,
};

/// Columns per chunk, the length of a legacy height map.
const LEGACY_HEIGHT_MAP: usize = 256;
/// Biome count assumed for modern chunks written before biome lengths were stored.
const UNPREFIXED_BIOMES: usize = 256;

/// Compound serialized with an empty root name, empty compounds take no bytes.
pub(super) fn compound_bytes(nbt: &NBT, name: &str) -> Result<Vec<u8>, SlimeError> {
    match nbt {
        NBT::Compound(compound) if compound.is_empty() => Ok(Vec::new()),
        nbt => Ok(nbt.to_bytes(name)?),
    }
}

/// Inverse of [`compound_bytes`], no bytes read back as [`None`].
pub(super) fn read_compound_bytes(data: &[u8]) -> Result<Option<NBT>, SlimeError> {
    if data.is_empty() {
        return Ok(None);
    }
    let (_, nbt) = NBT::read_compound(data)?;
    Ok(Some(nbt))
}

fn mismatch(world: &str, x: i32, z: i32, what: &str, version: WorldVersion) -> SlimeError {
    SlimeError::InvalidWorld {
        world: world.to_owned(),
        reason: format!(
            "chunk ({}, {}) has {} that don't match world version {}",
            x, z, what, version
        ),
    }
}

fn write_section(section: &SlimeSection, out: &mut Vec<u8>) -> Result<(), SlimeError> {
    out.write_bool(section.block_light.is_some())?;
    if let Some(block_light) = &section.block_light {
        out.extend_from_slice(block_light.backing());
    }
    match &section.blocks {
        SectionBlocks::Modern {
            palette,
            block_states,
        } => {
            out.write_i32(palette.len() as i32)?;
            palette.iter().try_for_each(|entry| {
                let bytes = compound_bytes(entry, "")?;
                out.write_i32(bytes.len() as i32)?;
                out.extend_from_slice(&bytes);
                Ok::<_, SlimeError>(())
            })?;
            out.write_i32(block_states.len() as i32)?;
            block_states
                .iter()
                .try_for_each(|state| out.write_i64(*state))?;
        }
        SectionBlocks::Legacy { blocks, data } => {
            out.extend_from_slice(blocks);
            out.extend_from_slice(data.backing());
        }
    }
    out.write_bool(section.sky_light.is_some())?;
    if let Some(sky_light) = &section.sky_light {
        out.extend_from_slice(sky_light.backing());
    }
    Ok(())
}

/// Writes one chunk, degenerate sections are left out of the section mask.
pub(super) fn write_chunk(
    chunk: &SlimeChunk,
    world_name: &str,
    version: WorldVersion,
    out: &mut Vec<u8>,
) -> Result<(), SlimeError> {
    if version.is_modern() {
        let height_maps = compound_bytes(&chunk.height_maps, "")?;
        out.write_i32(height_maps.len() as i32)?;
        out.extend_from_slice(&height_maps);
    } else {
        let heights = match chunk.height_maps.get("heightMap") {
            Some(NBT::IntArray(heights)) => heights.as_ref(),
            _ => &[],
        };
        (0..LEGACY_HEIGHT_MAP)
            .try_for_each(|i| out.write_i32(heights.get(i).copied().unwrap_or(0)))?;
    }

    match &chunk.biomes {
        Biomes::Modern(biomes) if version.is_modern() => {
            out.write_i32(biomes.len() as i32)?;
            biomes.iter().try_for_each(|biome| out.write_i32(*biome))?;
        }
        Biomes::Legacy(biomes) if !version.is_modern() && biomes.len() == LEGACY_BIOMES => {
            out.extend_from_slice(biomes);
        }
        _ => return Err(mismatch(world_name, chunk.x, chunk.z, "biomes", version)),
    }

    let mut mask = FixedBitSet::<SECTIONS_PER_CHUNK>::default();
    let mut sections = Vec::new();
    for (i, section) in chunk.present_sections() {
        let modern = matches!(section.blocks, SectionBlocks::Modern { .. });
        if modern != version.is_modern() {
            return Err(mismatch(world_name, chunk.x, chunk.z, "sections", version));
        }
        if section.blocks.is_degenerate() {
            continue;
        }
        mask.set(i, true);
        write_section(section, &mut sections)?;
    }
    mask.write(&mut *out)?;
    out.extend_from_slice(&sections);
    Ok(())
}

fn read_light(data: &mut impl Read, ctx: &DecodeContext) -> Result<Option<NibbleArray>, SlimeError> {
    if ctx.format.has_light_flags() && !data.read_bool()? {
        return Ok(None);
    }
    Ok(Some(NibbleArray::from_backing(
        data.read_var(NibbleArray::SECTION_BYTES)?,
    )))
}

fn read_section(data: &mut impl Read, ctx: &DecodeContext) -> Result<SlimeSection, SlimeError> {
    let block_light = read_light(data, ctx)?;
    let blocks = if ctx.world.is_modern() {
        let palette_length = data.read_len()?;
        let palette = (0..palette_length)
            .map(|_| {
                let length = data.read_len()?;
                let entry = read_compound_bytes(&data.read_var(length)?)?;
                Ok(entry.unwrap_or_else(NBT::empty))
            })
            .collect::<Result<Vec<_>, SlimeError>>()?;
        let states_length = data.read_len()?;
        let block_states = (0..states_length)
            .map(|_| data.read_i64())
            .collect::<Result<Box<[_]>, _>>()?;
        SectionBlocks::Modern {
            palette,
            block_states,
        }
    } else {
        SectionBlocks::Legacy {
            blocks: data.read_var(BLOCKS_PER_SECTION)?,
            data: NibbleArray::from_backing(data.read_var(NibbleArray::SECTION_BYTES)?),
        }
    };
    let sky_light = read_light(data, ctx)?;
    if ctx.format.has_hypixel_blocks() {
        let length = data.read_i16()?.max(0) as usize;
        data.skip(length)?;
    }
    Ok(SlimeSection {
        blocks,
        block_light,
        sky_light,
    })
}

fn read_chunk(
    data: &mut impl Read,
    ctx: &DecodeContext,
    x: i32,
    z: i32,
) -> Result<SlimeChunk, SlimeError> {
    let height_maps = if ctx.world.is_modern() {
        let length = data.read_len()?;
        read_compound_bytes(&data.read_var(length)?)?.unwrap_or_else(NBT::empty)
    } else {
        let heights = (0..LEGACY_HEIGHT_MAP)
            .map(|_| data.read_i32())
            .collect::<Result<Box<[_]>, _>>()?;
        slime_util::nbt_compound!["heightMap" => NBT::IntArray(heights)]
    };

    if ctx.format.has_legacy_biome_quirk() && !ctx.world.is_modern() {
        data.read_i32()?;
    }
    let biomes = if ctx.world.is_modern() {
        let length = if ctx.format.has_biome_length() {
            data.read_len()?
        } else {
            UNPREFIXED_BIOMES
        };
        Biomes::Modern(
            (0..length)
                .map(|_| data.read_i32())
                .collect::<Result<Box<[_]>, _>>()?,
        )
    } else {
        Biomes::Legacy(data.read_var(LEGACY_BIOMES)?)
    };

    let mut chunk = SlimeChunk::new(ctx.world_name, x, z, biomes);
    chunk.height_maps = height_maps;
    let mask = FixedBitSet::<SECTIONS_PER_CHUNK>::read(&mut *data)?;
    for i in 0..SECTIONS_PER_CHUNK {
        if mask.get(i) != Some(true) {
            continue;
        }
        let section = read_section(data, ctx)?;
        if !section.blocks.is_degenerate() {
            chunk.sections[i] = Some(section);
        }
    }
    Ok(chunk)
}

/// Reads every chunk flagged in `bitmask`, in bitmask order.
pub(super) fn read_chunks(
    mut data: &[u8],
    ctx: &DecodeContext,
    (min_x, min_z): (i32, i32),
    width: usize,
    bitmask: &BitSet,
) -> Result<HashMap<ChunkKey, SlimeChunk>, SlimeError> {
    let mut chunks = HashMap::new();
    for index in bitmask.ones() {
        let x = min_x + (index % width) as i32;
        let z = min_z + (index / width) as i32;
        let chunk = read_chunk(&mut data, ctx, x, z)?;
        chunks.insert(chunk.key(), chunk);
    }
    if !data.is_empty() {
        return Err(SlimeError::corrupted(
            ctx.world_name,
            format!("{} unread bytes after chunk data", data.len()),
        ));
    }
    Ok(chunks)
}

#[cfg(test)]
mod test {
    use slime_util::{nbt::NBT, nbt_compound, NibbleArray};

    use super::{read_chunk, write_chunk};
    use crate::{
        format::{DecodeContext, FormatVersion},
        Biomes, SectionBlocks, SlimeChunk, SlimeError, SlimeSection, WorldVersion,
    };

    fn stone_section() -> SlimeSection {
        SlimeSection {
            blocks: SectionBlocks::Modern {
                palette: vec![nbt_compound!["Name" => "minecraft:stone"]],
                block_states: vec![0; 256].into_boxed_slice(),
            },
            block_light: None,
            sky_light: Some(NibbleArray::new(4096)),
        }
    }

    fn ctx(format: u8, world: WorldVersion) -> DecodeContext<'static> {
        DecodeContext {
            world_name: "test",
            format: FormatVersion(format),
            world,
        }
    }

    #[test]
    fn modern_chunk_layout() -> Result<(), SlimeError> {
        let mut chunk = SlimeChunk::new(
            "test",
            0,
            0,
            Biomes::Modern(vec![1; 4].into_boxed_slice()),
        );
        chunk.sections[0] = Some(stone_section());

        let mut out = Vec::new();
        write_chunk(&chunk, "test", WorldVersion::V1_16, &mut out)?;
        let palette_entry = nbt_compound!["Name" => "minecraft:stone"].to_bytes("")?;
        assert_eq!(
            out.len(),
            4 // empty height maps
                + 4 + 4 * 4 // biomes
                + 2 // section mask
                + 1 // no block light
                + 4 + 4 + palette_entry.len()
                + 4 + 256 * 8
                + 1 + 2048
        );
        assert_eq!(&out[..4], &[0, 0, 0, 0]);
        assert_eq!(&out[24..26], &[0b1, 0]);

        let read = read_chunk(&mut out.as_slice(), &ctx(9, WorldVersion::V1_16), 0, 0)?;
        assert_eq!(read, chunk);
        Ok(())
    }

    #[test]
    fn degenerate_section_is_omitted() -> Result<(), SlimeError> {
        let mut chunk = SlimeChunk::new("test", 0, 0, Biomes::Modern(Box::new([])));
        chunk.sections[3] = Some(SlimeSection {
            blocks: SectionBlocks::Modern {
                palette: vec![nbt_compound!["Name" => "minecraft:air"]],
                block_states: vec![0; 256].into_boxed_slice(),
            },
            block_light: None,
            sky_light: None,
        });
        let mut out = Vec::new();
        write_chunk(&chunk, "test", WorldVersion::V1_16, &mut out)?;
        assert_eq!(out, [0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn legacy_chunk_format_3() -> Result<(), SlimeError> {
        // Format 3: unflagged light arrays, hypixel blocks blob after each section.
        let mut data = Vec::new();
        (0..256).for_each(|i| data.extend_from_slice(&(i as i32).to_be_bytes()));
        data.extend_from_slice(&[7; 256]);
        data.extend_from_slice(&[0b10, 0]);
        data.extend_from_slice(&[0x11; 2048]);
        data.extend_from_slice(&[1; 4096]);
        data.extend_from_slice(&[0; 2048]);
        data.extend_from_slice(&[0xFF; 2048]);
        data.extend_from_slice(&[0, 3, 9, 9, 9]);

        let mut reader = data.as_slice();
        let chunk = read_chunk(&mut reader, &ctx(3, WorldVersion::Unknown), 2, -1)?;
        assert!(reader.is_empty());
        assert_eq!(chunk.biomes, Biomes::Legacy(vec![7; 256].into_boxed_slice()));
        assert!(matches!(
            chunk.height_maps.get("heightMap"),
            Some(NBT::IntArray(heights)) if heights[255] == 255
        ));
        let section = chunk.sections[1].as_ref().expect("section 1");
        assert_eq!(section.block_light.as_ref().map(|l| l.get(1)), Some(1));
        assert_eq!(section.sky_light.as_ref().map(|l| l.get(0)), Some(0xF));
        assert!(matches!(&section.blocks, SectionBlocks::Legacy { blocks, .. } if blocks[0] == 1));
        Ok(())
    }

    #[test]
    fn format_8_legacy_biome_quirk() -> Result<(), SlimeError> {
        let mut data = vec![0u8; 256 * 4];
        data.extend_from_slice(&256i32.to_be_bytes());
        data.extend_from_slice(&[4; 256]);
        data.extend_from_slice(&[0, 0]);
        let mut reader = data.as_slice();
        let chunk = read_chunk(&mut reader, &ctx(8, WorldVersion::V1_8), 0, 0)?;
        assert!(reader.is_empty());
        assert_eq!(chunk.biomes, Biomes::Legacy(vec![4; 256].into_boxed_slice()));
        Ok(())
    }

    #[test]
    fn unprefixed_modern_biomes() -> Result<(), SlimeError> {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0; 256 * 4]);
        data.extend_from_slice(&[0, 0]);
        let chunk = read_chunk(&mut data.as_slice(), &ctx(7, WorldVersion::V1_14), 0, 0)?;
        assert!(matches!(chunk.biomes, Biomes::Modern(biomes) if biomes.len() == 256));
        Ok(())
    }

    #[test]
    fn section_kind_must_match_world_version() {
        let mut chunk = SlimeChunk::new("test", 0, 0, Biomes::Legacy(vec![0; 256].into_boxed_slice()));
        chunk.sections[0] = Some(stone_section());
        assert!(matches!(
            write_chunk(&chunk, "test", WorldVersion::V1_8, &mut Vec::new()),
            Err(SlimeError::InvalidWorld { .. })
        ));
    }
}
