mod config;
mod document;
mod error;
mod file;
pub mod lease;
mod manager;
mod registry;
mod sqlite;

pub use config::{ConfigDocumentSource, ConfigFileSource, ConfigSqliteSource, LoaderConfig};
pub use document::{DocumentLoader, WorldDocument};
pub use error::{ErrorKind, LoaderError};
pub use file::FileLoader;
pub use manager::WorldManager;
pub use registry::LoaderRegistry;
pub use sqlite::{SqliteLoader, MAX_WORLD_SIZE};

/// Named store of serialized worlds.
///
/// Loading a world for writing takes its lease, which stays held (and is
/// refreshed in the background) until [`SlimeLoader::unlock_world`] or
/// [`SlimeLoader::delete_world`]. A load that fails with
/// [`LoaderError::WorldInUse`] changes nothing.
pub trait SlimeLoader: Send + Sync {
    fn world_exists(&self, world_name: &str) -> Result<bool, LoaderError>;

    fn list_worlds(&self) -> Result<Vec<String>, LoaderError>;

    fn load_world(&self, world_name: &str, read_only: bool) -> Result<Vec<u8>, LoaderError>;

    /// Stores `data`, taking or refreshing the lease when `lock` is set.
    fn save_world(&self, world_name: &str, data: &[u8], lock: bool) -> Result<(), LoaderError>;

    fn delete_world(&self, world_name: &str) -> Result<(), LoaderError>;

    /// Whether anyone, this process included, holds a fresh lease.
    fn is_world_locked(&self, world_name: &str) -> Result<bool, LoaderError>;

    fn unlock_world(&self, world_name: &str) -> Result<(), LoaderError>;

    /// Worlds this loader currently holds leases on.
    fn held_worlds(&self) -> Vec<String>;
}
