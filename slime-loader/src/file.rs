use std::{
    collections::HashMap,
    fs::{File, OpenOptions, TryLockError},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use itertools::Itertools;
use log::warn;

use crate::{
    lease::{is_fresh, Clock, HeartbeatStore, LeaseManager, SystemClock, UNLOCKED},
    LoaderError, SlimeLoader,
};

const WORLD_EXTENSION: &str = "slime";

struct FileStore {
    dir: PathBuf,
    /// Open world files with an advisory lock on them, one per held lease.
    locked_files: Mutex<HashMap<String, File>>,
}

impl FileStore {
    fn world_path(&self, world_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", world_name, WORLD_EXTENSION))
    }

    fn heartbeat_path(&self, world_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.lock", world_name, WORLD_EXTENSION))
    }

    fn read_heartbeat(&self, world_name: &str) -> Result<u64, LoaderError> {
        match std::fs::read(self.heartbeat_path(world_name)) {
            Ok(bytes) => Ok(<[u8; 8]>::try_from(bytes.as_slice())
                .map(u64::from_be_bytes)
                .unwrap_or(UNLOCKED)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(UNLOCKED),
            Err(err) => Err(err.into()),
        }
    }

    /// Takes the OS lock on the world file, `false` if this loader or another
    /// handle already has it.
    fn lock_file(
        &self,
        locked_files: &mut HashMap<String, File>,
        world_name: &str,
    ) -> Result<bool, LoaderError> {
        if locked_files.contains_key(world_name) {
            return Ok(false);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.world_path(world_name))?;
        match file.try_lock() {
            Ok(()) => {
                locked_files.insert(world_name.to_owned(), file);
                Ok(true)
            }
            Err(TryLockError::WouldBlock) => Ok(false),
            Err(TryLockError::Error(err)) => Err(err.into()),
        }
    }

    /// Checks the heartbeat, locks the file and writes the first heartbeat
    /// as one step. `false` if the world is in use.
    fn acquire(&self, world_name: &str, now: u64) -> Result<bool, LoaderError> {
        let mut locked_files = self
            .locked_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locked_files.contains_key(world_name)
            || is_fresh(self.read_heartbeat(world_name)?, now)
            || !self.lock_file(&mut locked_files, world_name)?
        {
            return Ok(false);
        }
        if let Err(err) = self.write_heartbeat(world_name, now) {
            locked_files.remove(world_name);
            return Err(err);
        }
        Ok(true)
    }

    fn unlock_file(&self, world_name: &str) {
        // Closing the handle drops the OS lock.
        self.locked_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(world_name);
    }
}

impl HeartbeatStore for FileStore {
    fn write_heartbeat(&self, world_name: &str, millis: u64) -> Result<(), LoaderError> {
        std::fs::write(self.heartbeat_path(world_name), millis.to_be_bytes())?;
        Ok(())
    }
}

/// Stores every world as `<dir>/<name>.slime`, with its heartbeat next to it
/// in `<name>.slime.lock`.
pub struct FileLoader {
    store: Arc<FileStore>,
    leases: LeaseManager,
}

impl FileLoader {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, LoaderError> {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, LoaderError> {
        let dir = dir.as_ref();
        if dir.exists() && !dir.is_dir() {
            warn!(
                "Deleting file {} as its path is used for the worlds directory",
                dir.display()
            );
            std::fs::remove_file(dir)?;
        }
        std::fs::create_dir_all(dir)?;
        let store = Arc::new(FileStore {
            dir: dir.to_path_buf(),
            locked_files: Mutex::new(HashMap::new()),
        });
        Ok(Self {
            leases: LeaseManager::new(clock, store.clone()),
            store,
        })
    }

    fn check_exists(&self, world_name: &str) -> Result<(), LoaderError> {
        if self.world_exists(world_name)? {
            Ok(())
        } else {
            Err(LoaderError::UnknownWorld(world_name.to_owned()))
        }
    }

    fn acquire(&self, world_name: &str) -> Result<(), LoaderError> {
        if !self.store.acquire(world_name, self.leases.now())? {
            return Err(LoaderError::WorldInUse(world_name.to_owned()));
        }
        self.leases.start_refresh(world_name);
        Ok(())
    }
}

impl SlimeLoader for FileLoader {
    fn world_exists(&self, world_name: &str) -> Result<bool, LoaderError> {
        Ok(self.store.world_path(world_name).is_file())
    }

    fn list_worlds(&self) -> Result<Vec<String>, LoaderError> {
        Ok(std::fs::read_dir(&self.store.dir)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|path| path.extension().is_some_and(|ext| ext == WORLD_EXTENSION))
            .filter_map(|path| Some(path.file_stem()?.to_str()?.to_owned()))
            .sorted()
            .collect())
    }

    fn load_world(&self, world_name: &str, read_only: bool) -> Result<Vec<u8>, LoaderError> {
        self.check_exists(world_name)?;
        let path = self.store.world_path(world_name);
        if std::fs::metadata(&path)?.len() > i32::MAX as u64 {
            return Err(LoaderError::WorldTooBig(world_name.to_owned()));
        }
        if !read_only {
            self.acquire(world_name)?;
        }
        Ok(std::fs::read(path)?)
    }

    fn save_world(&self, world_name: &str, data: &[u8], lock: bool) -> Result<(), LoaderError> {
        if data.len() > i32::MAX as usize {
            return Err(LoaderError::WorldTooBig(world_name.to_owned()));
        }
        std::fs::write(self.store.world_path(world_name), data)?;
        if lock {
            self.store
                .write_heartbeat(world_name, self.leases.now())?;
            if !self.leases.held().iter().any(|held| held == world_name) {
                let mut locked_files = self
                    .store
                    .locked_files
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if !self.store.lock_file(&mut locked_files, world_name)? {
                    warn!("World {} is locked by another handle", world_name);
                }
                self.leases.start_refresh(world_name);
            }
        }
        Ok(())
    }

    fn delete_world(&self, world_name: &str) -> Result<(), LoaderError> {
        self.check_exists(world_name)?;
        self.leases.cancel_refresh(world_name);
        self.store.unlock_file(world_name);
        std::fs::remove_file(self.store.world_path(world_name))?;
        match std::fs::remove_file(self.store.heartbeat_path(world_name)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn is_world_locked(&self, world_name: &str) -> Result<bool, LoaderError> {
        self.check_exists(world_name)?;
        Ok(self.leases.is_fresh(self.store.read_heartbeat(world_name)?))
    }

    fn unlock_world(&self, world_name: &str) -> Result<(), LoaderError> {
        self.check_exists(world_name)?;
        self.leases.cancel_refresh(world_name);
        self.store.unlock_file(world_name);
        self.store.write_heartbeat(world_name, UNLOCKED)
    }

    fn held_worlds(&self) -> Vec<String> {
        self.leases.held()
    }
}
