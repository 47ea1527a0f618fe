use std::collections::HashMap;

use itertools::Itertools;
use log::{error, info};

use crate::{DocumentLoader, FileLoader, LoaderConfig, LoaderError, SlimeLoader, SqliteLoader};

/// Named data sources, owned by whoever resolves world locations.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Box<dyn SlimeLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file`, plus `sqlite` and `document-store` when enabled.
    pub fn from_config(config: &LoaderConfig) -> Result<Self, LoaderError> {
        let mut registry = Self::new();
        registry.register("file", FileLoader::new(&config.file.path)?)?;
        if config.sqlite.enabled {
            registry.register("sqlite", SqliteLoader::open(&config.sqlite.path)?)?;
        }
        if config.document.enabled {
            registry.register("document-store", DocumentLoader::new(&config.document.path)?)?;
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        name: &str,
        loader: impl SlimeLoader + 'static,
    ) -> Result<(), LoaderError> {
        if self.loaders.contains_key(name) {
            return Err(LoaderError::DataSourceAlreadyRegistered(name.to_owned()));
        }
        self.loaders.insert(name.to_owned(), Box::new(loader));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&dyn SlimeLoader, LoaderError> {
        self.loaders
            .get(name)
            .map(|loader| loader.as_ref())
            .ok_or_else(|| LoaderError::UnknownDataSource(name.to_owned()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.loaders.keys().map(String::as_str).sorted().collect()
    }

    /// Releases every lease still held through a registered loader. Failures
    /// are logged and the first one returned once every world was attempted.
    pub fn shutdown(&self) -> Result<(), LoaderError> {
        let mut result = Ok(());
        for (source, loader) in self.loaders.iter().sorted_by_key(|(name, _)| *name) {
            for world_name in loader.held_worlds() {
                info!("Unlocking world {} of data source {}", world_name, source);
                if let Err(err) = loader.unlock_world(&world_name) {
                    error!("Failed to unlock world {}: {}", world_name, err);
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        result
    }
}
