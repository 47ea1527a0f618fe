use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use itertools::Itertools;
use slime_util::{
    nbt::{NBTList, NBTTag, NBT},
    BitSet, ReadExt as _, WriteExt as _,
};

use super::{
    chunk_codec::{compound_bytes, read_chunks, read_compound_bytes, write_chunk},
    DecodeContext, FormatVersion, WorldVersion, SLIME_HEADER, SLIME_VERSION,
};
use crate::{ChunkKey, SectionBlocks, SlimeChunk, SlimeError, SlimePropertyMap, SlimeWorld};

const PROPERTIES_KEY: &str = "properties";

fn to_list(world: &str, items: impl Iterator<Item = NBT>) -> Result<NBTList, SlimeError> {
    let mut list = NBTList::new_with_tag(NBTTag::Compound);
    for item in items {
        list.push(item).map_err(|err| SlimeError::InvalidWorld {
            world: world.to_owned(),
            reason: err.to_string(),
        })?;
    }
    Ok(list)
}

fn write_frame(world: &str, payload: &[u8], out: &mut Vec<u8>) -> Result<(), SlimeError> {
    if payload.is_empty() {
        out.write_i32(0)?;
        out.write_i32(0)?;
        return Ok(());
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(payload)?;
    let compressed = encoder.finish()?;
    let (Ok(compressed_length), Ok(length)) = (
        i32::try_from(compressed.len()),
        i32::try_from(payload.len()),
    ) else {
        return Err(SlimeError::WorldTooBig(world.to_owned()));
    };
    out.write_i32(compressed_length)?;
    out.write_i32(length)?;
    out.extend_from_slice(&compressed);
    Ok(())
}

/// Serializes a world in the newest format.
///
/// Chunks without any non-degenerate section are left out.
pub fn encode_world(world: &SlimeWorld) -> Result<Vec<u8>, SlimeError> {
    let name = world.name();
    let chunks = world
        .snapshot()
        .into_iter()
        .filter(|chunk| {
            chunk
                .present_sections()
                .any(|(_, section)| !section.blocks.is_degenerate())
        })
        .collect::<Vec<_>>();

    let too_big = || SlimeError::WorldTooBig(name.to_owned());
    let (min_x, max_x) = chunks
        .iter()
        .map(|c| c.x)
        .minmax()
        .into_option()
        .unwrap_or((0, 0));
    let (min_z, max_z) = chunks
        .iter()
        .map(|c| c.z)
        .minmax()
        .into_option()
        .unwrap_or((0, 0));
    let width = max_x as i64 - min_x as i64 + 1;
    let depth = max_z as i64 - min_z as i64 + 1;
    let (Ok(min_x16), Ok(min_z16), Ok(width16), Ok(depth16)) = (
        i16::try_from(min_x),
        i16::try_from(min_z),
        i16::try_from(width),
        i16::try_from(depth),
    ) else {
        return Err(too_big());
    };
    let width = width as usize;

    let mut out = Vec::new();
    out.write_all(&SLIME_HEADER)?;
    out.write_all(&[SLIME_VERSION, world.version as u8])?;
    out.write_i16(min_x16)?;
    out.write_i16(min_z16)?;
    out.write_u16(width16 as u16)?;
    out.write_u16(depth16 as u16)?;

    let mut bitmask = BitSet::new(width * depth as usize);
    chunks.iter().for_each(|chunk| {
        let index = (chunk.z - min_z) as usize * width + (chunk.x - min_x) as usize;
        bitmask.set(index, true);
    });
    bitmask.write(&mut out)?;

    let mut chunk_data = Vec::new();
    chunks
        .iter()
        .try_for_each(|chunk| write_chunk(chunk, name, world.version, &mut chunk_data))?;
    write_frame(name, &chunk_data, &mut out)?;

    let tiles = to_list(name, chunks.iter().flat_map(|c| c.tile_entities.iter().cloned()))?;
    let tiles = slime_util::nbt_compound!["tiles" => tiles];
    write_frame(name, &compound_bytes(&tiles, "tiles")?, &mut out)?;

    let entities = to_list(name, chunks.iter().flat_map(|c| c.entities.iter().cloned()))?;
    out.write_bool(!entities.is_empty())?;
    if !entities.is_empty() {
        let entities = slime_util::nbt_compound!["entities" => entities];
        write_frame(name, &compound_bytes(&entities, "entities")?, &mut out)?;
    }

    let mut extra = match &world.extra {
        NBT::Compound(..) => world.extra.clone(),
        _ => NBT::empty(),
    };
    extra.insert(PROPERTIES_KEY, world.properties.to_compound());
    write_frame(name, &compound_bytes(&extra, "")?, &mut out)?;

    let maps = to_list(name, world.maps.iter().cloned())?;
    let maps = slime_util::nbt_compound!["maps" => maps];
    write_frame(name, &compound_bytes(&maps, "")?, &mut out)?;

    Ok(out)
}

struct Frame {
    compressed: Box<[u8]>,
    length: usize,
}

impl Frame {
    fn empty() -> Frame {
        Frame {
            compressed: Box::new([]),
            length: 0,
        }
    }

    fn read(world: &str, data: &mut impl Read) -> Result<Frame, SlimeError> {
        let compressed_length = data.read_i32()?;
        let length = data.read_i32()?;
        let (Ok(compressed_length), Ok(length)) =
            (usize::try_from(compressed_length), usize::try_from(length))
        else {
            return Err(SlimeError::corrupted(world, "negative section length"));
        };
        Ok(Frame {
            compressed: data.read_var(compressed_length)?,
            length,
        })
    }

    fn decompress(&self, world: &str) -> Result<Vec<u8>, SlimeError> {
        if self.compressed.is_empty() {
            if self.length != 0 {
                return Err(SlimeError::corrupted(world, "empty section with a length"));
            }
            return Ok(Vec::new());
        }
        let mut data = Vec::with_capacity(self.length);
        ZlibDecoder::new(self.compressed.as_ref()).read_to_end(&mut data)?;
        if data.len() != self.length {
            return Err(SlimeError::corrupted(
                world,
                format!(
                    "section is {} bytes, header says {}",
                    data.len(),
                    self.length
                ),
            ));
        }
        Ok(data)
    }
}

fn read_list(world: &str, data: &[u8], key: &str) -> Result<Vec<NBT>, SlimeError> {
    let Some(compound) = read_compound_bytes(data)? else {
        return Ok(Vec::new());
    };
    match compound.get(key) {
        Some(NBT::List(list)) => Ok(list.clone().into_iter().collect()),
        _ => Err(SlimeError::corrupted(world, format!("missing \"{}\" list", key))),
    }
}

fn entity_chunk(entity: &NBT) -> Option<ChunkKey> {
    let pos = entity.get("Pos")?.as_list()?;
    let x = pos.get(0)?.as_f64()?.floor() as i32;
    let z = pos.get(2)?.as_f64()?.floor() as i32;
    Some(ChunkKey::new(x >> 4, z >> 4))
}

fn tile_entity_chunk(tile_entity: &NBT) -> Option<ChunkKey> {
    let x = tile_entity.get_int("x")?;
    let z = tile_entity.get_int("z")?;
    Some(ChunkKey::new(x >> 4, z >> 4))
}

fn decode(
    name: &str,
    mut data: &[u8],
    properties: Option<&SlimePropertyMap>,
    read_only: bool,
) -> Result<SlimeWorld, SlimeError> {
    let header: [u8; 2] = data.read_const()?;
    if header != SLIME_HEADER {
        return Err(SlimeError::corrupted(name, "not a slime file"));
    }
    let format = FormatVersion(data.read_u8()?);
    if format > FormatVersion::CURRENT {
        return Err(SlimeError::NewerFormat(format.0));
    }
    let mut version = if format.has_world_version() {
        let byte = data.read_u8()?;
        WorldVersion::from_byte(byte).ok_or_else(|| {
            SlimeError::corrupted(name, format!("unknown world version {}", byte))
        })?
    } else if format.has_world_version_flag() {
        match data.read_bool()? {
            true => WorldVersion::V1_13,
            false => WorldVersion::V1_8,
        }
    } else {
        WorldVersion::Unknown
    };

    let min_x = data.read_i16()? as i32;
    let min_z = data.read_i16()? as i32;
    let width = data.read_i16()?;
    let depth = data.read_i16()?;
    if width <= 0 || depth <= 0 {
        return Err(SlimeError::corrupted(
            name,
            format!("invalid size {}x{}", width, depth),
        ));
    }
    let (width, depth) = (width as usize, depth as usize);
    let bitmask = BitSet::read(width * depth, &mut data)?;

    let chunk_frame = Frame::read(name, &mut data)?;
    let tiles_frame = Frame::read(name, &mut data)?;
    let entities_frame = if format.has_entities() && data.read_bool()? {
        Frame::read(name, &mut data)?
    } else {
        Frame::empty()
    };
    let extra_frame = if format.has_extra_data() {
        Frame::read(name, &mut data)?
    } else {
        Frame::empty()
    };
    let maps_frame = if format.has_maps() {
        Frame::read(name, &mut data)?
    } else {
        Frame::empty()
    };
    if !data.is_empty() {
        return Err(SlimeError::corrupted(
            name,
            format!("{} trailing bytes", data.len()),
        ));
    }

    let ctx = DecodeContext {
        world_name: name,
        format,
        world: version,
    };
    let mut chunks = read_chunks(
        &chunk_frame.decompress(name)?,
        &ctx,
        (min_x, min_z),
        width,
        &bitmask,
    )?;

    for entity in read_list(name, &entities_frame.decompress(name)?, "entities")? {
        let chunk = entity_chunk(&entity)
            .and_then(|key| chunks.get_mut(&key))
            .ok_or_else(|| SlimeError::corrupted(name, "entity outside of stored chunks"))?;
        chunk.entities.push(entity);
    }
    for tile_entity in read_list(name, &tiles_frame.decompress(name)?, "tiles")? {
        let chunk = tile_entity_chunk(&tile_entity)
            .and_then(|key| chunks.get_mut(&key))
            .ok_or_else(|| {
                SlimeError::corrupted(name, "tile entity outside of stored chunks")
            })?;
        chunk.tile_entities.push(tile_entity);
    }

    let extra = read_compound_bytes(&extra_frame.decompress(name)?)?.unwrap_or_else(NBT::empty);
    let maps = read_list(name, &maps_frame.decompress(name)?, "maps")?;

    if version == WorldVersion::Unknown {
        let first_section = chunks
            .values()
            .sorted_by_key(|c| c.key())
            .find_map(|c| c.present_sections().next().map(|(_, s)| s.blocks.clone()));
        version = match first_section {
            Some(SectionBlocks::Modern { .. }) => WorldVersion::V1_13,
            _ => WorldVersion::V1_8,
        };
    }

    let mut world_properties = match extra.get(PROPERTIES_KEY) {
        Some(NBT::Compound(stored)) => SlimePropertyMap::from_compound(stored.clone()),
        _ => SlimePropertyMap::new(),
    };
    if let Some(properties) = properties {
        world_properties.merge(properties);
    }

    let mut world = SlimeWorld::with_chunks(name, version, world_properties, chunks.into_values())?;
    world.extra = extra;
    world.maps = maps;
    world.read_only = read_only;
    world.locked = !read_only;
    Ok(world)
}

/// Parses a stored world of any format up to the newest one.
///
/// `properties` override the properties stored with the world. Structural
/// problems, including truncated input, are reported as
/// [`SlimeError::CorruptedWorld`].
pub fn decode_world(
    name: &str,
    data: &[u8],
    properties: Option<&SlimePropertyMap>,
    read_only: bool,
) -> Result<SlimeWorld, SlimeError> {
    decode(name, data, properties, read_only).map_err(|err| match err {
        SlimeError::IoError(err) => SlimeError::corrupted(name, err.to_string()),
        SlimeError::NBTError(err) => SlimeError::corrupted(name, err.to_string()),
        err => err,
    })
}
