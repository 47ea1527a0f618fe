use slime_world::SlimeError;
use thiserror::Error;

/// Conditions a host can report to users with a specific message each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownWorld,
    WorldAlreadyExists,
    WorldInUse,
    CorruptedWorld,
    NewerFormat,
    WorldTooBig,
    InvalidWorld,
    /// The storage medium or its configuration failed.
    Storage,
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    World(#[from] SlimeError),
    #[error("Unknown world {0}")]
    UnknownWorld(String),
    #[error("World {0} already exists")]
    WorldAlreadyExists(String),
    #[error("World {0} is being used on another server")]
    WorldInUse(String),
    #[error("World {0} is too big to be stored")]
    WorldTooBig(String),
    #[error("Database is at version {found}, newer than the supported {current}")]
    NewerDatabase { current: i32, found: i32 },
    #[error("Unknown data source {0}")]
    UnknownDataSource(String),
    #[error("Data source {0} is already registered")]
    DataSourceAlreadyRegistered(String),
    #[error("Source and destination world name are both {0}")]
    SameWorldName(String),
    #[error("No config file found")]
    MissingConfig,
}

impl LoaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownWorld(..) => ErrorKind::UnknownWorld,
            Self::WorldAlreadyExists(..) | Self::SameWorldName(..) => {
                ErrorKind::WorldAlreadyExists
            }
            Self::WorldInUse(..) => ErrorKind::WorldInUse,
            Self::WorldTooBig(..) => ErrorKind::WorldTooBig,
            Self::World(err) => match err {
                SlimeError::CorruptedWorld { .. } | SlimeError::NBTError(..) => {
                    ErrorKind::CorruptedWorld
                }
                SlimeError::NewerFormat(..) => ErrorKind::NewerFormat,
                SlimeError::WorldTooBig(..) => ErrorKind::WorldTooBig,
                SlimeError::InvalidWorld { .. }
                | SlimeError::ChunkWorldMismatch { .. }
                | SlimeError::InvalidPropertyValue { .. }
                | SlimeError::Upgrade { .. } => ErrorKind::InvalidWorld,
                SlimeError::IoError(..) => ErrorKind::Storage,
            },
            Self::Io(..)
            | Self::Sql(..)
            | Self::Json(..)
            | Self::Config(..)
            | Self::NewerDatabase { .. }
            | Self::UnknownDataSource(..)
            | Self::DataSourceAlreadyRegistered(..)
            | Self::MissingConfig => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod test {
    use slime_world::SlimeError;

    use super::{ErrorKind, LoaderError};

    #[test]
    fn kinds() {
        assert_eq!(
            LoaderError::WorldInUse("w".to_owned()).kind(),
            ErrorKind::WorldInUse
        );
        assert_eq!(
            LoaderError::from(SlimeError::NewerFormat(12)).kind(),
            ErrorKind::NewerFormat
        );
        assert_eq!(
            LoaderError::from(SlimeError::CorruptedWorld {
                world: "w".to_owned(),
                reason: "truncated".to_owned(),
            })
            .kind(),
            ErrorKind::CorruptedWorld
        );
        assert_eq!(
            LoaderError::SameWorldName("w".to_owned()).kind(),
            ErrorKind::WorldAlreadyExists
        );
    }
}
