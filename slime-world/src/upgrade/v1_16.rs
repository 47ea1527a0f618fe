use slime_util::{PackedArray, PackedLayout};

use super::WorldUpgrade;
use crate::{
    chunk::BLOCKS_PER_SECTION, SectionBlocks, SlimeError, SlimeWorld, WorldVersion,
};

/// 1.16 stopped letting block state entries straddle two longs.
pub struct V1_16WorldUpgrade;

impl V1_16WorldUpgrade {
    fn repack(world: &mut SlimeWorld, from: PackedLayout, to: PackedLayout) -> Result<(), SlimeError> {
        for chunk in world.chunks_mut() {
            let (x, z) = (chunk.x, chunk.z);
            for (index, section) in chunk.sections.iter_mut().enumerate() {
                let Some(SectionBlocks::Modern {
                    palette,
                    block_states,
                }) = section.as_mut().map(|s| &mut s.blocks)
                else {
                    continue;
                };
                let max_state = palette.len().saturating_sub(1) as u64;
                let bits = PackedArray::bits_per_entry(max_state).max(4);
                let states = PackedArray::from_inner(
                    from,
                    block_states.iter().map(|s| *s as u64).collect(),
                    bits,
                    BLOCKS_PER_SECTION,
                )
                .ok_or_else(|| SlimeError::Upgrade {
                    to: WorldVersion::V1_16,
                    reason: format!(
                        "chunk ({}, {}) section {} has {} block state longs for a palette of {}",
                        x,
                        z,
                        index,
                        block_states.len(),
                        palette.len()
                    ),
                })?;
                *block_states = states
                    .repack(to)
                    .into_inner()
                    .iter()
                    .map(|s| *s as i64)
                    .collect();
            }
        }
        Ok(())
    }
}

impl WorldUpgrade for V1_16WorldUpgrade {
    fn from(&self) -> WorldVersion {
        WorldVersion::V1_14
    }

    fn to(&self) -> WorldVersion {
        WorldVersion::V1_16
    }

    fn upgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError> {
        Self::repack(world, PackedLayout::Spanning, PackedLayout::Aligned)
    }

    fn downgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError> {
        Self::repack(world, PackedLayout::Aligned, PackedLayout::Spanning)
    }
}

#[cfg(test)]
mod test {
    use slime_util::{nbt::NBT, nbt_compound, PackedArray, PackedLayout};

    use super::V1_16WorldUpgrade;
    use crate::{
        upgrade::WorldUpgrade, Biomes, SectionBlocks, SlimeChunk, SlimeError, SlimePropertyMap,
        SlimeSection, SlimeWorld, WorldVersion,
    };

    fn palette(size: usize) -> Vec<NBT> {
        (0..size)
            .map(|i| nbt_compound!["Name" => format!("minecraft:block_{}", i)])
            .collect()
    }

    fn world(palette: Vec<NBT>, block_states: Box<[i64]>) -> Result<SlimeWorld, SlimeError> {
        let mut chunk = SlimeChunk::new("w", 0, 0, Biomes::Modern(vec![0; 1024].into_boxed_slice()));
        chunk.sections[0] = Some(SlimeSection {
            blocks: SectionBlocks::Modern {
                palette,
                block_states,
            },
            block_light: None,
            sky_light: None,
        });
        SlimeWorld::with_chunks("w", WorldVersion::V1_14, SlimePropertyMap::new(), [chunk])
    }

    fn block_states(world: &SlimeWorld) -> Box<[i64]> {
        match world.get_chunk(0, 0).and_then(|c| c.sections[0].clone()).map(|s| s.blocks) {
            Some(SectionBlocks::Modern { block_states, .. }) => block_states,
            _ => panic!("modern section expected"),
        }
    }

    #[test]
    fn repacks_between_layouts() -> Result<(), SlimeError> {
        let mut spanning = PackedArray::new(PackedLayout::Spanning, 5, 4096);
        (0..4096).for_each(|i| spanning.set(i, (i % 17) as u64));
        let states = spanning.clone().into_inner().iter().map(|s| *s as i64).collect();
        let mut world = world(palette(17), states)?;

        V1_16WorldUpgrade.upgrade(&mut world)?;
        let upgraded = block_states(&world);
        assert_eq!(upgraded.len(), 342);
        let aligned = PackedArray::from_inner(
            PackedLayout::Aligned,
            upgraded.iter().map(|s| *s as u64).collect(),
            5,
            4096,
        )
        .expect("aligned states");
        assert!((0..4096).all(|i| aligned.get(i) == Some((i % 17) as u64)));

        V1_16WorldUpgrade.downgrade(&mut world)?;
        let expected: Box<[i64]> = spanning.into_inner().iter().map(|s| *s as i64).collect();
        assert_eq!(block_states(&world), expected);
        Ok(())
    }

    #[test]
    fn small_palettes_use_four_bits() -> Result<(), SlimeError> {
        let mut world = world(palette(2), vec![0; 256].into_boxed_slice())?;
        V1_16WorldUpgrade.upgrade(&mut world)?;
        // 4 bit entries divide a long evenly, both layouts agree
        assert_eq!(block_states(&world).len(), 256);
        Ok(())
    }

    #[test]
    fn short_block_states_fail() -> Result<(), SlimeError> {
        let mut world = world(palette(17), vec![0; 10].into_boxed_slice())?;
        assert!(matches!(
            V1_16WorldUpgrade.upgrade(&mut world),
            Err(SlimeError::Upgrade { to: WorldVersion::V1_16, .. })
        ));
        Ok(())
    }
}
