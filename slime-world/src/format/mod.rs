//! The slime binary container.
//!
//! Layout of a format 9 file:
//! ```text
//! 0xB1 0x0B | format u8 | world version u8
//! min x i16 | min z i16 | width u16 | depth u16 | chunk bitmask
//! chunks | tile entities | has entities bool, entities | extra | maps
//! ```
//! Every trailing section is framed as `compressed len i32, len i32, zlib bytes`.

mod chunk_codec;
mod world_codec;

pub use world_codec::{decode_world, encode_world};

pub const SLIME_HEADER: [u8; 2] = [0xB1, 0x0B];

/// Newest container layout this crate reads and the only one it writes.
pub const SLIME_VERSION: u8 = 9;

/// Container layout version, decides which fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion(pub u8);

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion(SLIME_VERSION);

    pub fn has_extra_data(self) -> bool {
        self.0 >= 2
    }

    pub fn has_entities(self) -> bool {
        self.0 >= 3
    }

    /// World version stored as a single bool (pre/post 1.13 blocks).
    pub fn has_world_version_flag(self) -> bool {
        self.0 >= 4 && self.0 < 6
    }

    pub fn has_world_version(self) -> bool {
        self.0 >= 6
    }

    /// Each section is followed by an i16 length prefixed blob that is skipped.
    pub fn has_hypixel_blocks(self) -> bool {
        self.0 < 4
    }

    pub fn has_light_flags(self) -> bool {
        self.0 >= 5
    }

    pub fn has_maps(self) -> bool {
        self.0 >= 7
    }

    pub fn has_biome_length(self) -> bool {
        self.0 >= 8
    }

    /// Format 8 wrote a stray biome length int for pre 1.13 worlds.
    pub fn has_legacy_biome_quirk(self) -> bool {
        self.0 == 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum WorldVersion {
    /// Not stored, detected from the first section.
    Unknown = 0x00,
    V1_8 = 0x01,
    V1_9 = 0x02,
    V1_11 = 0x03,
    V1_13 = 0x04,
    V1_14 = 0x05,
    V1_16 = 0x06,
    V1_17 = 0x07,
}

impl WorldVersion {
    pub const LATEST: WorldVersion = WorldVersion::V1_17;

    pub const ALL: [WorldVersion; 7] = [
        WorldVersion::V1_8,
        WorldVersion::V1_9,
        WorldVersion::V1_11,
        WorldVersion::V1_13,
        WorldVersion::V1_14,
        WorldVersion::V1_16,
        WorldVersion::V1_17,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(WorldVersion::Unknown),
            byte => WorldVersion::ALL.into_iter().find(|v| *v as u8 == byte),
        }
    }

    /// Palette based sections, length prefixed height maps and biomes.
    pub fn is_modern(self) -> bool {
        self >= WorldVersion::V1_13
    }

    pub fn previous(self) -> Option<Self> {
        let index = WorldVersion::ALL.iter().position(|v| *v == self)?;
        index.checked_sub(1).map(|i| WorldVersion::ALL[i])
    }
}

impl std::fmt::Display for WorldVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorldVersion::Unknown => write!(f, "unknown"),
            WorldVersion::V1_8 => write!(f, "1.8"),
            WorldVersion::V1_9 => write!(f, "1.9"),
            WorldVersion::V1_11 => write!(f, "1.11"),
            WorldVersion::V1_13 => write!(f, "1.13"),
            WorldVersion::V1_14 => write!(f, "1.14"),
            WorldVersion::V1_16 => write!(f, "1.16"),
            WorldVersion::V1_17 => write!(f, "1.17"),
        }
    }
}

/// Both versions that steer decoding, handed to every decode step.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub world_name: &'a str,
    pub format: FormatVersion,
    pub world: WorldVersion,
}
