use std::time::Instant;

use log::{debug, error, info};
use slime_world::{
    format::{decode_world, encode_world},
    upgrade::UpgradeChain,
    SlimePropertyMap, SlimeWorld, WorldImporter, WorldVersion,
};

use crate::{LoaderError, SlimeLoader};

/// World lifecycle on top of any [`SlimeLoader`]. Loaded worlds are converted
/// to the manager's target version.
pub struct WorldManager {
    upgrades: UpgradeChain,
    target: WorldVersion,
}

impl Default for WorldManager {
    fn default() -> Self {
        Self::new(WorldVersion::LATEST)
    }
}

impl WorldManager {
    pub fn new(target: WorldVersion) -> Self {
        Self::with_upgrades(UpgradeChain::standard(), target)
    }

    pub fn with_upgrades(upgrades: UpgradeChain, target: WorldVersion) -> Self {
        Self { upgrades, target }
    }

    pub fn target(&self) -> WorldVersion {
        self.target
    }

    pub fn create_empty_world(
        &self,
        loader: &dyn SlimeLoader,
        world_name: &str,
        read_only: bool,
        properties: SlimePropertyMap,
    ) -> Result<SlimeWorld, LoaderError> {
        if loader.world_exists(world_name)? {
            return Err(LoaderError::WorldAlreadyExists(world_name.to_owned()));
        }
        let world = SlimeWorld::new(world_name, self.target, properties, read_only, !read_only);
        loader.save_world(world_name, &encode_world(&world)?, !read_only)?;
        info!("Created empty world {}", world_name);
        Ok(world)
    }

    /// Reads, decodes and converts a world. A lease taken by the read is
    /// released again when anything after it fails.
    pub fn load_world(
        &self,
        loader: &dyn SlimeLoader,
        world_name: &str,
        read_only: bool,
        properties: Option<&SlimePropertyMap>,
    ) -> Result<SlimeWorld, LoaderError> {
        let start = Instant::now();
        let data = loader.load_world(world_name, read_only)?;
        let world = self.decode(world_name, &data, read_only, properties);
        if world.is_err() && !read_only {
            if let Err(err) = loader.unlock_world(world_name) {
                error!("Failed to unlock world {} after a failed load: {}", world_name, err);
            }
        }
        let world = world?;
        info!(
            "Loaded world {} in {}ms",
            world_name,
            start.elapsed().as_millis()
        );
        Ok(world)
    }

    fn decode(
        &self,
        world_name: &str,
        data: &[u8],
        read_only: bool,
        properties: Option<&SlimePropertyMap>,
    ) -> Result<SlimeWorld, LoaderError> {
        let mut world = decode_world(world_name, data, properties, read_only)?;
        if world.version != self.target {
            let start = Instant::now();
            let from = world.version;
            self.upgrades.convert(&mut world, self.target)?;
            info!(
                "Converted world {} from {} to {} in {}ms",
                world_name,
                from,
                self.target,
                start.elapsed().as_millis()
            );
        }
        Ok(world)
    }

    /// Encodes and stores a world, keeping its lease if it holds one.
    /// Read-only worlds are never written.
    pub fn save_world(&self, loader: &dyn SlimeLoader, world: &SlimeWorld) -> Result<(), LoaderError> {
        if world.read_only {
            debug!("Not saving read-only world {}", world.name());
            return Ok(());
        }
        loader.save_world(world.name(), &encode_world(world)?, world.locked)
    }

    /// Moves the stored bytes of a world between loaders. A lease this
    /// process holds on the source moves along.
    pub fn migrate_world(
        &self,
        world_name: &str,
        source: &dyn SlimeLoader,
        destination: &dyn SlimeLoader,
    ) -> Result<(), LoaderError> {
        let start = Instant::now();
        if destination.world_exists(world_name)? {
            return Err(LoaderError::WorldAlreadyExists(world_name.to_owned()));
        }
        let leased = source.held_worlds().iter().any(|held| held == world_name);
        if leased {
            source.unlock_world(world_name)?;
        }
        let data = source.load_world(world_name, false)?;
        if let Err(err) = destination.save_world(world_name, &data, leased) {
            if let Err(unlock_err) = source.unlock_world(world_name) {
                error!(
                    "Failed to unlock world {} after a failed migration: {}",
                    world_name, unlock_err
                );
            }
            return Err(err);
        }
        source.delete_world(world_name)?;
        info!(
            "Migrated world {} in {}ms",
            world_name,
            start.elapsed().as_millis()
        );
        Ok(())
    }

    /// Deep copy of `world` named `new_name`, stored right away when a loader
    /// is given.
    pub fn clone_world(
        &self,
        world: &SlimeWorld,
        new_name: &str,
        loader: Option<&dyn SlimeLoader>,
    ) -> Result<SlimeWorld, LoaderError> {
        if world.name() == new_name {
            return Err(LoaderError::SameWorldName(new_name.to_owned()));
        }
        let mut clone = world.clone_as(new_name);
        clone.locked = false;
        if let Some(loader) = loader {
            if loader.world_exists(new_name)? {
                return Err(LoaderError::WorldAlreadyExists(new_name.to_owned()));
            }
            clone.locked = !clone.read_only;
            loader.save_world(new_name, &encode_world(&clone)?, clone.locked)?;
        }
        Ok(clone)
    }

    /// Stores a world produced by `importer` without leasing it.
    pub fn import_world(
        &self,
        importer: &dyn WorldImporter,
        world_name: &str,
        loader: &dyn SlimeLoader,
    ) -> Result<SlimeWorld, LoaderError> {
        if loader.world_exists(world_name)? {
            return Err(LoaderError::WorldAlreadyExists(world_name.to_owned()));
        }
        let start = Instant::now();
        let mut world = importer.import(world_name)?;
        world.locked = false;
        let data = encode_world(&world)?;
        loader.save_world(world_name, &data, false)?;
        info!(
            "Imported world {} ({} chunks, {} bytes) in {}ms",
            world_name,
            world.chunk_count(),
            data.len(),
            start.elapsed().as_millis()
        );
        Ok(world)
    }
}

#[cfg(test)]
mod test {
    use slime_util::{nbt::NBT, nbt_compound};
    use slime_world::{
        format::encode_world, property, Biomes, SectionBlocks, SlimeChunk, SlimeError,
        SlimePropertyMap, SlimeSection, SlimeWorld, WorldImporter, WorldVersion,
    };

    use super::WorldManager;
    use crate::{error::ErrorKind, DocumentLoader, FileLoader, LoaderError, SlimeLoader};

    fn stone_chunk(world_name: &str, x: i32, z: i32) -> SlimeChunk {
        let mut chunk = SlimeChunk::new(world_name, x, z, Biomes::Modern(vec![1; 1024].into_boxed_slice()));
        chunk.sections[3] = Some(SlimeSection {
            blocks: SectionBlocks::Modern {
                palette: vec![
                    nbt_compound!["Name" => "minecraft:stone"],
                    nbt_compound!["Name" => "minecraft:dirt"],
                ],
                block_states: vec![0x11; 256].into_boxed_slice(),
            },
            block_light: None,
            sky_light: None,
        });
        chunk.entities.push(nbt_compound![
            "id" => "minecraft:pig",
            "Pos" => slime_util::nbt::NBTList::try_from(vec![
                NBT::Double(x as f64 * 16.0 + 1.5),
                NBT::Double(70.0),
                NBT::Double(z as f64 * 16.0 + 2.5),
            ]).expect("list of doubles"),
        ]);
        chunk
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Flatland;

    impl WorldImporter for Flatland {
        fn import(&self, world_name: &str) -> Result<SlimeWorld, SlimeError> {
            SlimeWorld::with_chunks(
                world_name,
                WorldVersion::LATEST,
                SlimePropertyMap::new(),
                [stone_chunk(world_name, 0, 0), stone_chunk(world_name, -1, 3)],
            )
        }
    }

    #[test]
    fn empty_world_keeps_property_defaults() -> Result<(), LoaderError> {
        let dir = tempfile::tempdir()?;
        let loader = FileLoader::new(dir.path())?;
        let manager = WorldManager::default();
        let mut properties = SlimePropertyMap::new();
        properties.set_value(&property::SPAWN_Y, 100)?;

        manager.create_empty_world(&loader, "lobby", false, properties)?;
        assert!(loader.is_world_locked("lobby")?);
        assert!(matches!(
            manager.create_empty_world(&loader, "lobby", false, SlimePropertyMap::new()),
            Err(LoaderError::WorldAlreadyExists(_))
        ));

        let world = manager.load_world(&loader, "lobby", true, None)?;
        assert_eq!(world.chunk_count(), 0);
        assert!(!world.locked);
        assert!(world.properties.get_value(&property::PVP));
        assert_eq!(world.properties.get_value(&property::DIFFICULTY), "peaceful");
        assert_eq!(world.properties.get_value(&property::SPAWN_Y), 100);
        Ok(())
    }

    #[test]
    fn failed_load_releases_lease() -> Result<(), LoaderError> {
        init_logging();
        let dir = tempfile::tempdir()?;
        let loader = FileLoader::new(dir.path())?;
        loader.save_world("broken", &[0xB1, 0x0B, 9, 7, 0], false)?;
        let err = WorldManager::default()
            .load_world(&loader, "broken", false, None)
            .err()
            .expect("truncated world");
        assert_eq!(err.kind(), ErrorKind::CorruptedWorld);
        assert!(!loader.is_world_locked("broken")?);
        assert!(loader.held_worlds().is_empty());
        Ok(())
    }

    #[test]
    fn upgrades_on_load() -> Result<(), LoaderError> {
        init_logging();
        let dir = tempfile::tempdir()?;
        let loader = FileLoader::new(dir.path())?;
        let world = SlimeWorld::with_chunks(
            "old",
            WorldVersion::V1_13,
            SlimePropertyMap::new(),
            [stone_chunk("old", 0, 0)],
        )?;
        loader.save_world("old", &encode_world(&world)?, false)?;

        let manager = WorldManager::new(WorldVersion::V1_16);
        let world = manager.load_world(&loader, "old", false, None)?;
        assert_eq!(world.version, WorldVersion::V1_16);
        assert!(world.locked);
        assert!(loader.is_world_locked("old")?);

        manager.save_world(&loader, &world)?;
        let reloaded = manager.load_world(&loader, "old", true, None)?;
        assert_eq!(reloaded.version, WorldVersion::V1_16);
        assert_eq!(reloaded.get_chunk(0, 0), world.get_chunk(0, 0));
        Ok(())
    }

    #[test]
    fn migrate_moves_lease() -> Result<(), LoaderError> {
        init_logging();
        let dir = tempfile::tempdir()?;
        let files = FileLoader::new(dir.path().join("files"))?;
        let documents = DocumentLoader::new(dir.path().join("documents"))?;
        let manager = WorldManager::default();
        manager.create_empty_world(&files, "w", false, SlimePropertyMap::new())?;
        manager.create_empty_world(&documents, "taken", false, SlimePropertyMap::new())?;

        manager.migrate_world("w", &files, &documents)?;
        assert!(!files.world_exists("w")?);
        assert!(files.held_worlds().is_empty());
        assert!(documents.is_world_locked("w")?);
        assert_eq!(documents.held_worlds(), vec!["taken".to_owned(), "w".to_owned()]);

        files.save_world("taken", &[], false)?;
        assert!(matches!(
            manager.migrate_world("taken", &files, &documents),
            Err(LoaderError::WorldAlreadyExists(_))
        ));
        Ok(())
    }

    #[test]
    fn failed_migration_releases_source() -> Result<(), LoaderError> {
        init_logging();
        let dir = tempfile::tempdir()?;
        let files = FileLoader::new(dir.path().join("files"))?;
        let gone = FileLoader::new(dir.path().join("gone"))?;
        std::fs::remove_dir(dir.path().join("gone"))?;
        files.save_world("w", &[1, 2], false)?;

        let err = WorldManager::default()
            .migrate_world("w", &files, &gone)
            .err()
            .expect("destination directory is gone");
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(files.world_exists("w")?);
        assert!(!files.is_world_locked("w")?);
        assert!(files.held_worlds().is_empty());
        Ok(())
    }

    #[test]
    fn clone_and_import() -> Result<(), LoaderError> {
        let dir = tempfile::tempdir()?;
        let loader = FileLoader::new(dir.path())?;
        let manager = WorldManager::default();

        let world = manager.import_world(&Flatland, "flat", &loader)?;
        assert_eq!(world.chunk_count(), 2);
        assert!(!loader.is_world_locked("flat")?);
        assert!(matches!(
            manager.import_world(&Flatland, "flat", &loader),
            Err(LoaderError::WorldAlreadyExists(_))
        ));

        assert!(matches!(
            manager.clone_world(&world, "flat", Some(&loader)),
            Err(LoaderError::SameWorldName(_))
        ));
        let copy = manager.clone_world(&world, "copy", Some(&loader))?;
        assert!(copy.locked);
        assert!(loader.is_world_locked("copy")?);
        let stored = manager.load_world(&loader, "copy", true, None)?;
        let chunk = stored.get_chunk(-1, 3).expect("copied chunk");
        assert_eq!(chunk.world_name, "copy");
        assert_eq!(chunk.entities.len(), 1);

        let detached = manager.clone_world(&world, "scratch", None)?;
        assert!(!detached.locked);
        assert!(!loader.world_exists("scratch")?);
        Ok(())
    }
}
