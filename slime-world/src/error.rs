use slime_util::nbt::NBTError;
use thiserror::Error;

use crate::WorldVersion;

#[derive(Error, Debug)]
pub enum SlimeError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    NBTError(#[from] NBTError),
    #[error("World {world} seems to be corrupted: {reason}")]
    CorruptedWorld { world: String, reason: String },
    #[error("World is stored with a newer format version ({0})")]
    NewerFormat(u8),
    #[error("World {0} is too big to be stored")]
    WorldTooBig(String),
    #[error("World {world} is not a valid world: {reason}")]
    InvalidWorld { world: String, reason: String },
    #[error("Chunk ({x}, {z}) belongs to world \"{chunk_world}\", not to \"{world}\"")]
    ChunkWorldMismatch {
        x: i32,
        z: i32,
        chunk_world: String,
        world: String,
    },
    #[error("Invalid value for property \"{property}\": {value}")]
    InvalidPropertyValue { property: String, value: String },
    #[error("Upgrade to {to:?} failed: {reason}")]
    Upgrade { to: WorldVersion, reason: String },
}

impl SlimeError {
    pub(crate) fn corrupted(world: &str, reason: impl Into<String>) -> Self {
        Self::CorruptedWorld {
            world: world.to_owned(),
            reason: reason.into(),
        }
    }
}
