//! Heartbeat leases.
//!
//! A world is leased while its stored heartbeat is at most
//! [`STALE_THRESHOLD`] old. The holder rewrites the heartbeat every
//! [`REFRESH_INTERVAL`] from a background thread until the lease is released.
//! A heartbeat of `0` means nobody holds the world.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError, Sender},
    },
    thread::JoinHandle,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use itertools::Itertools;
use log::{debug, error};

use crate::LoaderError;

pub const STALE_THRESHOLD: u64 = 300_000;
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(60_000);

/// Heartbeat value of a world nobody holds.
pub const UNLOCKED: u64 = 0;

pub trait Clock: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Whatever a backend keeps its heartbeats in.
pub trait HeartbeatStore: Send + Sync {
    fn write_heartbeat(&self, world_name: &str, millis: u64) -> Result<(), LoaderError>;
}

pub fn is_fresh(heartbeat: u64, now: u64) -> bool {
    heartbeat != UNLOCKED && now.saturating_sub(heartbeat) <= STALE_THRESHOLD
}

struct RefreshTimer {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    fn stop(self) {
        // A closed channel also stops the thread, the send result doesn't matter.
        let _ = self.cancel.send(());
        if self.handle.join().is_err() {
            error!("Lease refresh thread panicked");
        }
    }
}

/// Owns one refresh thread per held world.
pub struct LeaseManager {
    clock: Arc<dyn Clock>,
    store: Arc<dyn HeartbeatStore>,
    refresh_interval: Duration,
    timers: Mutex<HashMap<String, RefreshTimer>>,
}

impl LeaseManager {
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn HeartbeatStore>) -> Self {
        Self::with_refresh_interval(clock, store, REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(
        clock: Arc<dyn Clock>,
        store: Arc<dyn HeartbeatStore>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            clock,
            store,
            refresh_interval,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn is_fresh(&self, heartbeat: u64) -> bool {
        is_fresh(heartbeat, self.now())
    }

    /// Starts refreshing a lease whose first heartbeat the backend already
    /// wrote. A running refresh for the same world is replaced.
    pub fn start_refresh(&self, world_name: &str) {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let handle = std::thread::spawn({
            let clock = Arc::clone(&self.clock);
            let store = Arc::clone(&self.store);
            let world_name = world_name.to_owned();
            let interval = self.refresh_interval;
            move || loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(err) = store.write_heartbeat(&world_name, clock.now_millis()) {
                            error!("Failed to refresh lease of world {}: {}", world_name, err);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        let previous = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(world_name.to_owned(), RefreshTimer { cancel, handle });
        if let Some(previous) = previous {
            previous.stop();
        }
        debug!("Acquired lease of world {}", world_name);
    }

    /// Stops the refresh of a world, returns whether one was running.
    pub fn cancel_refresh(&self, world_name: &str) -> bool {
        let timer = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(world_name);
        match timer {
            Some(timer) => {
                timer.stop();
                debug!("Released lease of world {}", world_name);
                true
            }
            None => false,
        }
    }

    /// Worlds with a running refresh, sorted.
    pub fn held(&self) -> Vec<String> {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .sorted()
            .collect()
    }
}

impl Drop for LeaseManager {
    fn drop(&mut self) {
        let timers = std::mem::take(self.timers.get_mut().unwrap_or_else(PoisonError::into_inner));
        timers.into_values().for_each(RefreshTimer::stop);
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex, PoisonError},
        time::Duration,
    };

    use super::{is_fresh, Clock, HeartbeatStore, LeaseManager, ManualClock, STALE_THRESHOLD};
    use crate::LoaderError;

    #[derive(Default)]
    struct MemoryHeartbeats(Mutex<HashMap<String, u64>>);

    impl MemoryHeartbeats {
        fn get(&self, world_name: &str) -> Option<u64> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(world_name)
                .copied()
        }
    }

    impl HeartbeatStore for MemoryHeartbeats {
        fn write_heartbeat(&self, world_name: &str, millis: u64) -> Result<(), LoaderError> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(world_name.to_owned(), millis);
            Ok(())
        }
    }

    #[test]
    fn freshness() {
        assert!(is_fresh(1_000, 1_000 + STALE_THRESHOLD));
        assert!(!is_fresh(1_000, 1_001 + STALE_THRESHOLD));
        assert!(!is_fresh(0, 10));
        assert!(is_fresh(2_000, 1_000));
    }

    #[test]
    fn refreshes_until_cancelled() {
        let clock = Arc::new(ManualClock::new(5_000));
        let store = Arc::new(MemoryHeartbeats::default());
        let leases = LeaseManager::with_refresh_interval(
            clock.clone(),
            store.clone(),
            Duration::from_millis(5),
        );

        leases.start_refresh("w");
        assert_eq!(leases.held(), vec!["w".to_owned()]);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(store.get("w"), Some(5_000));

        clock.advance(1_000);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(store.get("w"), Some(clock.now_millis()));

        assert!(leases.cancel_refresh("w"));
        assert!(!leases.cancel_refresh("w"));
        clock.advance(1_000);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(store.get("w"), Some(6_000));
        assert!(leases.held().is_empty());
    }
}
