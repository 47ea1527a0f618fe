use crate::{SlimeError, SlimeWorld};

/// Produces a populated world from some foreign source, such as a region
/// file directory.
///
/// Malformed sources are reported as [`SlimeError::InvalidWorld`].
pub trait WorldImporter {
    fn import(&self, world_name: &str) -> Result<SlimeWorld, SlimeError>;
}
