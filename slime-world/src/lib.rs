mod chunk;
mod error;
pub mod format;
mod import;
pub mod property;
pub mod upgrade;
mod world;

pub use chunk::{Biomes, ChunkKey, SectionBlocks, SlimeChunk, SlimeSection, SECTIONS_PER_CHUNK};
pub use error::SlimeError;
pub use format::{FormatVersion, WorldVersion};
pub use import::WorldImporter;
pub use property::{SlimeProperty, SlimePropertyMap};
pub use world::SlimeWorld;
