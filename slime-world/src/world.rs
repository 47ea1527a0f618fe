use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use itertools::Itertools;
use slime_util::nbt::NBT;

use crate::{ChunkKey, SlimeChunk, SlimeError, SlimePropertyMap, WorldVersion};

#[derive(Debug)]
pub struct SlimeWorld {
    name: String,
    chunks: RwLock<HashMap<ChunkKey, SlimeChunk>>,
    /// Free form compound, `properties` is reserved for the property map.
    pub extra: NBT,
    pub properties: SlimePropertyMap,
    pub version: WorldVersion,
    pub read_only: bool,
    /// This process holds the world's lease.
    pub locked: bool,
    pub maps: Vec<NBT>,
}

impl SlimeWorld {
    pub fn new(
        name: &str,
        version: WorldVersion,
        properties: SlimePropertyMap,
        read_only: bool,
        locked: bool,
    ) -> Self {
        Self {
            name: name.to_owned(),
            chunks: RwLock::new(HashMap::new()),
            extra: NBT::empty(),
            properties,
            version,
            read_only,
            locked,
            maps: Vec::new(),
        }
    }

    /// Builds a world from already keyed chunks, every chunk must belong to `name`.
    pub fn with_chunks(
        name: &str,
        version: WorldVersion,
        properties: SlimePropertyMap,
        chunks: impl IntoIterator<Item = SlimeChunk>,
    ) -> Result<Self, SlimeError> {
        let world = Self::new(name, version, properties, false, false);
        chunks
            .into_iter()
            .try_for_each(|chunk| world.update_chunk(chunk))?;
        Ok(world)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_chunk(&self, x: i32, z: i32) -> Option<SlimeChunk> {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ChunkKey::new(x, z))
            .cloned()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Inserts or replaces a chunk.
    pub fn update_chunk(&self, chunk: SlimeChunk) -> Result<(), SlimeError> {
        if chunk.world_name != self.name {
            return Err(SlimeError::ChunkWorldMismatch {
                x: chunk.x,
                z: chunk.z,
                chunk_world: chunk.world_name,
                world: self.name.clone(),
            });
        }
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk.key(), chunk);
        Ok(())
    }

    /// Consistent copy of every chunk, sorted by [`ChunkKey`].
    pub fn snapshot(&self) -> Vec<SlimeChunk> {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .sorted_by_key(SlimeChunk::key)
            .collect()
    }

    /// Direct access for in place rewrites such as schema upgrades.
    pub fn chunks_mut(&mut self) -> impl Iterator<Item = &mut SlimeChunk> {
        self.chunks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .values_mut()
    }

    /// Copy of this world under another name, chunks are re-owned by the copy.
    pub fn clone_as(&self, name: &str) -> SlimeWorld {
        let chunks = self
            .snapshot()
            .into_iter()
            .map(|mut chunk| {
                chunk.world_name = name.to_owned();
                (chunk.key(), chunk)
            })
            .collect();
        SlimeWorld {
            name: name.to_owned(),
            chunks: RwLock::new(chunks),
            extra: self.extra.clone(),
            properties: self.properties.clone(),
            version: self.version,
            read_only: self.read_only,
            locked: self.locked,
            maps: self.maps.clone(),
        }
    }
}
