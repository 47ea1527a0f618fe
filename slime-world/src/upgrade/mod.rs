//! In place conversion of worlds between adjacent [`WorldVersion`]s.
//!
//! Upgrade and downgrade of a step are not exact inverses, some data (such as
//! villager levels) can't be reconstructed going back.

mod v1_11;
mod v1_14;
mod v1_16;

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::{SlimeError, SlimeWorld, WorldVersion};

pub use v1_11::V1_11WorldUpgrade;
pub use v1_14::V1_14WorldUpgrade;
pub use v1_16::V1_16WorldUpgrade;

pub trait WorldUpgrade: Send + Sync {
    fn from(&self) -> WorldVersion;
    fn to(&self) -> WorldVersion;
    /// Rewrites a world at [`WorldUpgrade::from`] into [`WorldUpgrade::to`].
    fn upgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError>;
    fn downgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError>;
}

/// Two way lookup built from `(old, new)` name pairs.
pub(crate) struct RenameTable {
    pub upgrade: HashMap<&'static str, &'static str>,
    pub downgrade: HashMap<&'static str, &'static str>,
}

impl RenameTable {
    pub fn new(pairs: &[(&'static str, &'static str)]) -> Self {
        Self {
            upgrade: pairs.iter().copied().collect(),
            downgrade: pairs.iter().map(|(old, new)| (*new, *old)).collect(),
        }
    }
}

/// Steps keyed by the version they upgrade to.
#[derive(Default)]
pub struct UpgradeChain {
    steps: BTreeMap<WorldVersion, Box<dyn WorldUpgrade>>,
}

impl UpgradeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with every step this crate ships.
    pub fn standard() -> Self {
        let mut chain = Self::new();
        chain.register(V1_11WorldUpgrade);
        chain.register(V1_14WorldUpgrade);
        chain.register(V1_16WorldUpgrade);
        chain
    }

    /// Replaces any step with the same target version.
    pub fn register(&mut self, step: impl WorldUpgrade + 'static) {
        self.steps.insert(step.to(), Box::new(step));
    }

    /// Applies steps ascending until the world reaches `target`. Missing
    /// steps are skipped with a warning.
    ///
    /// On error the world is left partially converted.
    pub fn upgrade_world(
        &self,
        world: &mut SlimeWorld,
        target: WorldVersion,
    ) -> Result<(), SlimeError> {
        for version in WorldVersion::ALL {
            if version <= world.version || version > target {
                continue;
            }
            match self.steps.get(&version) {
                Some(step) => {
                    debug!("Upgrading world {} to {}", world.name(), version);
                    step.upgrade(world)?;
                }
                None => warn!(
                    "No upgrade to {} for world {}, skipping",
                    version,
                    world.name()
                ),
            }
            world.version = version;
        }
        Ok(())
    }

    /// Applies steps descending until the world is back at `target`.
    pub fn downgrade_world(
        &self,
        world: &mut SlimeWorld,
        target: WorldVersion,
    ) -> Result<(), SlimeError> {
        for version in WorldVersion::ALL.into_iter().rev() {
            if version > world.version || version <= target {
                continue;
            }
            match self.steps.get(&version) {
                Some(step) => {
                    debug!("Downgrading world {} from {}", world.name(), version);
                    step.downgrade(world)?;
                }
                None => warn!(
                    "No downgrade from {} for world {}, skipping",
                    version,
                    world.name()
                ),
            }
            world.version = version.previous().unwrap_or(target);
        }
        Ok(())
    }

    /// Upgrades or downgrades, whichever direction reaches `target`.
    pub fn convert(&self, world: &mut SlimeWorld, target: WorldVersion) -> Result<(), SlimeError> {
        if world.version < target {
            self.upgrade_world(world, target)
        } else if world.version > target {
            self.downgrade_world(world, target)
        } else {
            Ok(())
        }
    }
}
