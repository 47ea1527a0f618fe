use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    lease::{Clock, HeartbeatStore, LeaseManager, SystemClock, STALE_THRESHOLD, UNLOCKED},
    LoaderError, SlimeLoader,
};

const CURRENT_DB_VERSION: i32 = 1;

/// Blob size limit of the `world` column.
pub const MAX_WORLD_SIZE: usize = 16 * 1024 * 1024;

const CREATE_WORLDS_TABLE: &str = "CREATE TABLE IF NOT EXISTS worlds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    world BLOB NOT NULL,
    locked INTEGER NOT NULL DEFAULT 0
)";
const CREATE_VERSION_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS database_version (id INTEGER PRIMARY KEY, version INTEGER NOT NULL)";

struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl HeartbeatStore for SqliteStore {
    fn write_heartbeat(&self, world_name: &str, millis: u64) -> Result<(), LoaderError> {
        let updated = self.connection().execute(
            "UPDATE worlds SET locked = ?1 WHERE name = ?2",
            params![millis as i64, world_name],
        )?;
        if updated == 0 {
            return Err(LoaderError::UnknownWorld(world_name.to_owned()));
        }
        Ok(())
    }
}

/// Keeps worlds as rows of a single `worlds` table.
pub struct SqliteLoader {
    store: Arc<SqliteStore>,
    leases: LeaseManager,
}

impl SqliteLoader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        Self::from_connection(Connection::open(path)?, Arc::new(SystemClock))
    }

    pub fn open_in_memory() -> Result<Self, LoaderError> {
        Self::from_connection(Connection::open_in_memory()?, Arc::new(SystemClock))
    }

    pub fn from_connection(connection: Connection, clock: Arc<dyn Clock>) -> Result<Self, LoaderError> {
        connection.execute(CREATE_WORLDS_TABLE, [])?;
        connection.execute(CREATE_VERSION_TABLE, [])?;
        Self::update_database(&connection)?;
        let store = Arc::new(SqliteStore {
            connection: Mutex::new(connection),
        });
        Ok(Self {
            leases: LeaseManager::new(clock, store.clone()),
            store,
        })
    }

    fn update_database(connection: &Connection) -> Result<(), LoaderError> {
        let version: Option<i32> = connection
            .query_row(
                "SELECT version FROM database_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match version {
            Some(version) if version > CURRENT_DB_VERSION => {
                return Err(LoaderError::NewerDatabase {
                    current: CURRENT_DB_VERSION,
                    found: version,
                });
            }
            Some(version) if version == CURRENT_DB_VERSION => return Ok(()),
            Some(version) => {
                warn!(
                    "Database is at version {}, updating to {}",
                    version, CURRENT_DB_VERSION
                );
                // Version 0 stored the lock as a 0/1 flag instead of a heartbeat.
                connection.execute("UPDATE worlds SET locked = 0 WHERE locked = 1", [])?;
                info!("Database updated to version {}", CURRENT_DB_VERSION);
            }
            None => {}
        }
        connection.execute(
            "INSERT INTO database_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            params![CURRENT_DB_VERSION],
        )?;
        Ok(())
    }

    /// Takes the lease in one statement so two processes can't both win it.
    fn acquire(&self, world_name: &str) -> Result<(), LoaderError> {
        let now = self.leases.now() as i64;
        let acquired = self.store.connection().execute(
            "UPDATE worlds SET locked = ?1
             WHERE name = ?2 AND (locked = 0 OR ?1 - locked > ?3)",
            params![now, world_name, STALE_THRESHOLD as i64],
        )?;
        if acquired == 0 {
            return Err(if self.world_exists(world_name)? {
                LoaderError::WorldInUse(world_name.to_owned())
            } else {
                LoaderError::UnknownWorld(world_name.to_owned())
            });
        }
        self.leases.start_refresh(world_name);
        Ok(())
    }

    fn heartbeat(&self, world_name: &str) -> Result<u64, LoaderError> {
        self.store
            .connection()
            .query_row(
                "SELECT locked FROM worlds WHERE name = ?1",
                params![world_name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(|locked| locked.max(0) as u64)
            .ok_or_else(|| LoaderError::UnknownWorld(world_name.to_owned()))
    }
}

impl SlimeLoader for SqliteLoader {
    fn world_exists(&self, world_name: &str) -> Result<bool, LoaderError> {
        Ok(self
            .store
            .connection()
            .query_row(
                "SELECT 1 FROM worlds WHERE name = ?1",
                params![world_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn list_worlds(&self) -> Result<Vec<String>, LoaderError> {
        let connection = self.store.connection();
        let mut statement = connection.prepare("SELECT name FROM worlds ORDER BY name")?;
        let names = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn load_world(&self, world_name: &str, read_only: bool) -> Result<Vec<u8>, LoaderError> {
        if !read_only {
            self.acquire(world_name)?;
        }
        self.store
            .connection()
            .query_row(
                "SELECT world FROM worlds WHERE name = ?1",
                params![world_name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| LoaderError::UnknownWorld(world_name.to_owned()))
    }

    fn save_world(&self, world_name: &str, data: &[u8], lock: bool) -> Result<(), LoaderError> {
        if data.len() > MAX_WORLD_SIZE {
            return Err(LoaderError::WorldTooBig(world_name.to_owned()));
        }
        self.store.connection().execute(
            "INSERT INTO worlds (name, world, locked) VALUES (?1, ?2, 0)
             ON CONFLICT(name) DO UPDATE SET world = excluded.world",
            params![world_name, data],
        )?;
        if lock {
            self.store
                .write_heartbeat(world_name, self.leases.now())?;
            if !self.leases.held().iter().any(|held| held == world_name) {
                self.leases.start_refresh(world_name);
            }
        }
        Ok(())
    }

    fn delete_world(&self, world_name: &str) -> Result<(), LoaderError> {
        self.leases.cancel_refresh(world_name);
        let deleted = self
            .store
            .connection()
            .execute("DELETE FROM worlds WHERE name = ?1", params![world_name])?;
        if deleted == 0 {
            return Err(LoaderError::UnknownWorld(world_name.to_owned()));
        }
        Ok(())
    }

    fn is_world_locked(&self, world_name: &str) -> Result<bool, LoaderError> {
        Ok(self.leases.is_fresh(self.heartbeat(world_name)?))
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

    use rusqlite::{params, Connection};

    use super::{SqliteLoader, MAX_WORLD_SIZE};
    use crate::{
        lease::{ManualClock, STALE_THRESHOLD},
        test::contend,
        LoaderError, SlimeLoader,
    };

    #[test]
    fn stores_worlds() -> Result<(), LoaderError> {
        let loader = SqliteLoader::open_in_memory()?;
        loader.save_world("b", &[1], false)?;
        loader.save_world("a", &[2, 3], false)?;
        loader.save_world("a", &[4], false)?;
        assert_eq!(loader.list_worlds()?, vec!["a", "b"]);
        assert_eq!(loader.load_world("a", true)?, vec![4]);
        assert!(matches!(
            loader.load_world("c", false),
            Err(LoaderError::UnknownWorld(_))
        ));
        loader.delete_world("a")?;
        assert!(!loader.world_exists("a")?);
        assert!(matches!(
            loader.unlock_world("a"),
            Err(LoaderError::UnknownWorld(_))
        ));
        assert!(matches!(
            loader.save_world("big", &vec![0; MAX_WORLD_SIZE + 1], false),
            Err(LoaderError::WorldTooBig(_))
        ));
        Ok(())
    }

    #[test]
    fn lease_is_exclusive_and_expires() -> Result<(), LoaderError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("worlds.db");
        let clock = Arc::new(ManualClock::new(1_000_000));
        let first = SqliteLoader::from_connection(Connection::open(&path)?, clock.clone())?;
        let second = SqliteLoader::from_connection(Connection::open(&path)?, clock.clone())?;
        first.save_world("w", &[9], false)?;

        first.load_world("w", false)?;
        assert!(second.is_world_locked("w")?);
        assert!(matches!(
            second.load_world("w", false),
            Err(LoaderError::WorldInUse(_))
        ));

        clock.advance(STALE_THRESHOLD + 1);
        assert!(!second.is_world_locked("w")?);
        assert_eq!(second.load_world("w", false)?, vec![9]);
        assert!(matches!(
            first.load_world("w", false),
            Err(LoaderError::WorldInUse(_))
        ));

        second.unlock_world("w")?;
        assert!(!first.is_world_locked("w")?);
        Ok(())
    }

    #[test]
    fn concurrent_loads_take_one_lease() -> Result<(), LoaderError> {
        let loader = SqliteLoader::open_in_memory()?;
        loader.save_world("w", &[9], false)?;
        for _ in 0..50 {
            assert_eq!(contend(&loader, "w"), (1, 1));
            loader.unlock_world("w")?;
        }
        Ok(())
    }

    #[test]
    fn database_versions() -> Result<(), LoaderError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("worlds.db");
        {
            let connection = Connection::open(&path)?;
            connection.execute(
                "CREATE TABLE worlds (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE, world BLOB NOT NULL, locked INTEGER NOT NULL DEFAULT 0)",
                [],
            )?;
            connection.execute(
                "INSERT INTO worlds (name, world, locked) VALUES ('old', x'00', 1)",
                [],
            )?;
            connection.execute(
                "CREATE TABLE database_version (id INTEGER PRIMARY KEY, version INTEGER NOT NULL)",
                [],
            )?;
            connection.execute("INSERT INTO database_version VALUES (1, 0)", [])?;
        }
        let loader = SqliteLoader::open(&path)?;
        assert!(!loader.is_world_locked("old")?);
        drop(loader);

        Connection::open(&path)?.execute(
            "UPDATE database_version SET version = ?1 WHERE id = 1",
            params![7],
        )?;
        assert!(matches!(
            SqliteLoader::open(&path),
            Err(LoaderError::NewerDatabase { current: 1, found: 7 })
        ));
        Ok(())
    }
}
