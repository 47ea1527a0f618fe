use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    lease::{Clock, HeartbeatStore, LeaseManager, SystemClock, UNLOCKED},
    LoaderError, SlimeLoader,
};

/// Metadata kept next to every world binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldDocument {
    pub name: String,
    /// Heartbeat millis, 0 when unlocked.
    pub locked: u64,
    pub size: u64,
    /// Millis of the last save.
    pub updated: u64,
}

struct DocumentStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on documents.
    guard: Mutex<()>,
}

impl DocumentStore {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn document_path(&self, world_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", world_name))
    }

    fn binary_path(&self, world_name: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", world_name))
    }

    fn backup_path(&self, world_name: &str) -> PathBuf {
        self.dir.join(format!("{}_backup.bin", world_name))
    }

    fn read_document(&self, world_name: &str) -> Result<Option<WorldDocument>, LoaderError> {
        match std::fs::read(self.document_path(world_name)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn document(&self, world_name: &str) -> Result<WorldDocument, LoaderError> {
        self.read_document(world_name)?
            .ok_or_else(|| LoaderError::UnknownWorld(world_name.to_owned()))
    }

    fn write_document(&self, document: &WorldDocument) -> Result<(), LoaderError> {
        std::fs::write(
            self.document_path(&document.name),
            serde_json::to_vec_pretty(document)?,
        )?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<(), LoaderError> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

impl HeartbeatStore for DocumentStore {
    fn write_heartbeat(&self, world_name: &str, millis: u64) -> Result<(), LoaderError> {
        let _guard = self.lock();
        let mut document = self.document(world_name)?;
        document.locked = millis;
        self.write_document(&document)
    }
}

/// Document store layout: a binary object `<name>.bin` plus a JSON metadata
/// document `<name>.json` per world. The previous binary survives one save as
/// `<name>_backup.bin`.
pub struct DocumentLoader {
    store: Arc<DocumentStore>,
    leases: LeaseManager,
}

impl DocumentLoader {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, LoaderError> {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, LoaderError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let store = Arc::new(DocumentStore {
            dir: dir.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        });
        Ok(Self {
            leases: LeaseManager::new(clock, store.clone()),
            store,
        })
    }

    pub fn document(&self, world_name: &str) -> Result<WorldDocument, LoaderError> {
        let _guard = self.store.lock();
        self.store.document(world_name)
    }
}

impl SlimeLoader for DocumentLoader {
    fn world_exists(&self, world_name: &str) -> Result<bool, LoaderError> {
        Ok(self.store.document_path(world_name).is_file())
    }

    fn list_worlds(&self) -> Result<Vec<String>, LoaderError> {
        Ok(std::fs::read_dir(&self.store.dir)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| Some(path.file_stem()?.to_str()?.to_owned()))
            .sorted()
            .collect())
    }

    fn load_world(&self, world_name: &str, read_only: bool) -> Result<Vec<u8>, LoaderError> {
        {
            let _guard = self.store.lock();
            let mut document = self.store.document(world_name)?;
            if !read_only {
                if self.leases.is_fresh(document.locked) {
                    return Err(LoaderError::WorldInUse(world_name.to_owned()));
                }
                document.locked = self.leases.now();
                self.store.write_document(&document)?;
            }
        }
        if !read_only {
            self.leases.start_refresh(world_name);
        }
        Ok(std::fs::read(self.store.binary_path(world_name))?)
    }

    fn save_world(&self, world_name: &str, data: &[u8], lock: bool) -> Result<(), LoaderError> {
        {
            let _guard = self.store.lock();
            let binary = self.store.binary_path(world_name);
            if binary.exists() {
                std::fs::rename(&binary, self.store.backup_path(world_name))?;
            }
            std::fs::write(&binary, data)?;

            let now = self.leases.now();
            let mut document = self
                .store
                .read_document(world_name)?
                .unwrap_or_else(|| WorldDocument {
                    name: world_name.to_owned(),
                    locked: UNLOCKED,
                    size: 0,
                    updated: 0,
                });
            document.size = data.len() as u64;
            document.updated = now;
            if lock {
                document.locked = now;
            }
            self.store.write_document(&document)?;
        }
        if lock && !self.leases.held().iter().any(|held| held == world_name) {
            self.leases.start_refresh(world_name);
        }
        Ok(())
    }

    fn delete_world(&self, world_name: &str) -> Result<(), LoaderError> {
        self.leases.cancel_refresh(world_name);
        let _guard = self.store.lock();
        if !self.world_exists(world_name)? {
            return Err(LoaderError::UnknownWorld(world_name.to_owned()));
        }
        remove_if_exists(&self.store.binary_path(world_name))?;
        remove_if_exists(&self.store.backup_path(world_name))?;
        remove_if_exists(&self.store.document_path(world_name))
    }

    fn is_world_locked(&self, world_name: &str) -> Result<bool, LoaderError> {
        Ok(self.leases.is_fresh(self.document(world_name)?.locked))
    }

    fn unlock_world(&self, world_name: &str) -> Result<(), LoaderError> {
        self.leases.cancel_refresh(world_name);
        self.store.write_heartbeat(world_name, UNLOCKED)
    }

    fn held_worlds(&self) -> Vec<String> {
        self.leases.held()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::DocumentLoader;
    use crate::{
        lease::{ManualClock, STALE_THRESHOLD},
        test::contend,
        LoaderError, SlimeLoader,
    };

    #[test]
    fn keeps_one_backup() -> Result<(), LoaderError> {
        let dir = tempfile::tempdir()?;
        let clock = Arc::new(ManualClock::new(42));
        let loader = DocumentLoader::with_clock(dir.path(), clock.clone())?;
        loader.save_world("w", &[1, 2], false)?;
        clock.advance(10);
        loader.save_world("w", &[3, 4, 5], false)?;

        assert_eq!(loader.list_worlds()?, vec!["w"]);
        assert_eq!(loader.load_world("w", true)?, vec![3, 4, 5]);
        assert_eq!(std::fs::read(dir.path().join("w_backup.bin"))?, vec![1, 2]);
        let document = loader.document("w")?;
        assert_eq!((document.size, document.updated, document.locked), (3, 52, 0));

        loader.delete_world("w")?;
        assert!(!dir.path().join("w_backup.bin").exists());
        assert!(loader.list_worlds()?.is_empty());
        Ok(())
    }

    #[test]
    fn concurrent_loads_take_one_lease() -> Result<(), LoaderError> {
        let dir = tempfile::tempdir()?;
        let loader = DocumentLoader::with_clock(dir.path(), Arc::new(ManualClock::new(1_000_000)))?;
        loader.save_world("w", &[1], false)?;
        for _ in 0..50 {
            assert_eq!(contend(&loader, "w"), (1, 1));
            loader.unlock_world("w")?;
        }
        Ok(())
    }

    #[test]
    fn lease() -> Result<(), LoaderError> {
        let dir = tempfile::tempdir()?;
        let clock = Arc::new(ManualClock::new(1_000_000));
        let first = DocumentLoader::with_clock(dir.path(), clock.clone())?;
        let second = DocumentLoader::with_clock(dir.path(), clock.clone())?;
        first.save_world("w", &[1], true)?;
        assert_eq!(first.held_worlds(), vec!["w".to_owned()]);
        assert!(matches!(
            second.load_world("w", false),
            Err(LoaderError::WorldInUse(_))
        ));

        clock.advance(STALE_THRESHOLD + 1);
        second.load_world("w", false)?;
        assert!(first.is_world_locked("w")?);
        second.unlock_world("w")?;
        assert!(!first.is_world_locked("w")?);
        assert!(matches!(
            second.unlock_world("missing"),
            Err(LoaderError::UnknownWorld(_))
        ));
        Ok(())
    }
}
