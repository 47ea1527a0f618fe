use std::sync::LazyLock;

use serde::Deserialize;
use slime_util::{
    nbt::{from_nbt, NBT},
    PackedArray, PackedLayout,
};

use super::{RenameTable, WorldUpgrade};
use crate::{
    chunk::BLOCKS_PER_SECTION, SectionBlocks, SlimeChunk, SlimeError, SlimeWorld, WorldVersion,
};

const VILLAGER_XP: [i32; 5] = [0, 10, 50, 100, 150];

const TRAPPED_CHEST: &str = "minecraft:trapped_chest";
const CHEST: &str = "minecraft:chest";

const ILLAGER_BANNER: &str = "\"translate\":\"block.minecraft.illager_banner\"";
const OMINOUS_BANNER: &str = "\"translate\":\"block.minecraft.ominous_banner\"";

static BLOCKS: LazyLock<RenameTable> = LazyLock::new(|| {
    RenameTable::new(&[
        ("minecraft:tube_coral_fan", "minecraft:tube_coral_wall_fan"),
        ("minecraft:brain_coral_fan", "minecraft:brain_coral_wall_fan"),
        ("minecraft:bubble_coral_fan", "minecraft:bubble_coral_wall_fan"),
        ("minecraft:fire_coral_fan", "minecraft:fire_coral_wall_fan"),
        ("minecraft:horn_coral_fan", "minecraft:horn_coral_wall_fan"),
        ("minecraft:stone_slab", "minecraft:smooth_stone_slab"),
        ("minecraft:sign", "minecraft:oak_sign"),
        ("minecraft:wall_sign", "minecraft:oak_wall_sign"),
    ])
});

/// Pre 1.14 `(Profession, Career)` pairs and their 1.14 profession.
const PROFESSIONS: &[((i32, i32), &str)] = &[
    ((0, 1), "minecraft:farmer"),
    ((0, 2), "minecraft:fisherman"),
    ((0, 3), "minecraft:shepherd"),
    ((0, 4), "minecraft:fletcher"),
    ((1, 1), "minecraft:librarian"),
    ((1, 2), "minecraft:cartographer"),
    ((2, 1), "minecraft:cleric"),
    ((3, 1), "minecraft:armorer"),
    ((3, 2), "minecraft:weaponsmith"),
    ((3, 3), "minecraft:toolsmith"),
    ((4, 1), "minecraft:butcher"),
    ((4, 2), "minecraft:leatherworker"),
    ((5, 1), "minecraft:nitwit"),
];

/// Unknown careers fall back to the first career of the profession.
fn profession_name(profession: i32, career: i32) -> &'static str {
    PROFESSIONS
        .iter()
        .find(|(key, _)| *key == (profession, career))
        .or_else(|| PROFESSIONS.iter().find(|((p, c), _)| *p == profession && *c == 1))
        .map(|(_, name)| *name)
        .unwrap_or("minecraft:none")
}

fn profession_ids(name: &str) -> (i32, i32) {
    PROFESSIONS
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(key, _)| *key)
        .unwrap_or((0, 0))
}

fn upgrade_error(reason: impl Into<String>) -> SlimeError {
    SlimeError::Upgrade {
        to: WorldVersion::V1_14,
        reason: reason.into(),
    }
}

/// Block positions in a section whose state is `palette_index`.
fn positions_of(
    chunk: &SlimeChunk,
    section_index: usize,
    palette_index: usize,
) -> Result<Vec<(i32, i32, i32)>, SlimeError> {
    let Some(SectionBlocks::Modern { block_states, .. }) = chunk.sections[section_index]
        .as_ref()
        .map(|s| &s.blocks)
    else {
        return Ok(Vec::new());
    };
    let bits = (block_states.len() * 64 / BLOCKS_PER_SECTION).max(4) as u8;
    let states = PackedArray::from_inner(
        PackedLayout::Spanning,
        block_states.iter().map(|s| *s as u64).collect(),
        bits,
        BLOCKS_PER_SECTION,
    )
    .ok_or_else(|| {
        upgrade_error(format!(
            "chunk ({}, {}) section {} has {} block state longs",
            chunk.x,
            chunk.z,
            section_index,
            block_states.len()
        ))
    })?;
    Ok(states
        .iter()
        .enumerate()
        .filter(|(_, state)| *state == palette_index as u64)
        .map(|(index, _)| {
            (
                chunk.x * 16 + (index & 0xF) as i32,
                section_index as i32 * 16 + (index >> 8) as i32,
                chunk.z * 16 + ((index >> 4) & 0xF) as i32,
            )
        })
        .collect())
}

/// Retypes the block entities standing on `palette_index` blocks from `old` to `new`.
fn retype_block_entities(
    chunk: &mut SlimeChunk,
    section_index: usize,
    palette_index: usize,
    old: &str,
    new: &str,
) -> Result<(), SlimeError> {
    for (x, y, z) in positions_of(chunk, section_index, palette_index)? {
        let Some(tile_entity) = chunk.tile_entities.iter_mut().find(|t| {
            t.get_int("x") == Some(x) && t.get_int("y") == Some(y) && t.get_int("z") == Some(z)
        }) else {
            continue;
        };
        let id = tile_entity.get_str("id").unwrap_or_default();
        if id != old {
            return Err(upgrade_error(format!(
                "expected block entity at ({}, {}, {}) to be {}, not {}",
                x, y, z, old, id
            )));
        }
        tile_entity.insert("id", new);
    }
    Ok(())
}

/// Renames palette entries, trapped chests get their block entity retyped first.
fn update_blocks(chunk: &mut SlimeChunk, upgrade: bool) -> Result<(), SlimeError> {
    let renames = if upgrade {
        &BLOCKS.upgrade
    } else {
        &BLOCKS.downgrade
    };
    for section_index in 0..chunk.sections.len() {
        let trapped_chests = match chunk.sections[section_index].as_ref().map(|s| &s.blocks) {
            Some(SectionBlocks::Modern { palette, .. }) => palette
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.get_str("Name") == Some(TRAPPED_CHEST))
                .map(|(i, _)| i)
                .collect::<Vec<_>>(),
            _ => continue,
        };
        for palette_index in trapped_chests {
            let (old, new) = if upgrade {
                (CHEST, TRAPPED_CHEST)
            } else {
                (TRAPPED_CHEST, CHEST)
            };
            retype_block_entities(chunk, section_index, palette_index, old, new)?;
        }

        if let Some(SectionBlocks::Modern { palette, .. }) =
            chunk.sections[section_index].as_mut().map(|s| &mut s.blocks)
        {
            for entry in palette.iter_mut() {
                if let Some(renamed) = entry.get_str("Name").and_then(|n| renames.get(n).copied()) {
                    entry.insert("Name", renamed);
                }
            }
        }
    }
    Ok(())
}

fn translate_banner(entity: &mut NBT, from: &str, to: &str) {
    if let Some(name) = entity.get_str("CustomName") {
        let translated = name.replace(from, to);
        entity.insert("CustomName", translated);
    }
}

fn recipe_count(offers: &NBT) -> usize {
    match offers.get("Recipes") {
        Some(NBT::List(recipes)) => recipes.len(),
        Some(NBT::Compound(recipes)) => recipes.len(),
        _ => 0,
    }
}

fn upgrade_villager(entity: &mut NBT) {
    let profession = entity.get_int("Profession").unwrap_or(0);
    let career = entity.get_int("Career").unwrap_or(0);
    let mut level = entity.get_int("CareerLevel").unwrap_or(1);
    if let Some(offers) = entity.get("Offers")
        && (level == 0 || level == 1)
    {
        level = (recipe_count(offers) as i32 / 2).clamp(1, 5);
    }
    if entity.get("Xp").is_none() {
        let xp_index = (level - 1).clamp(0, VILLAGER_XP.len() as i32 - 1) as usize;
        entity.insert("Xp", VILLAGER_XP[xp_index]);
    }
    entity.remove("Profession");
    entity.remove("Career");
    entity.remove("CareerLevel");
    entity.insert(
        "VillagerData",
        slime_util::nbt_compound![
            "type" => "minecraft:plains",
            "profession" => profession_name(profession, career),
            "level" => level,
        ],
    );
}

#[derive(Deserialize)]
struct VillagerData {
    #[serde(default)]
    profession: String,
}

fn downgrade_villager(entity: &mut NBT) {
    let Some(data) = entity.remove("VillagerData") else {
        return;
    };
    let profession = from_nbt::<VillagerData>(&data)
        .map(|data| data.profession)
        .unwrap_or_default();
    let (profession, career) = profession_ids(&profession);
    entity.insert("Profession", profession);
    entity.insert("Career", career);
    entity.insert("CareerLevel", 1);
}

fn upgrade_ocelot(entity: &mut NBT) {
    match entity.get_int("CatType").unwrap_or(0) {
        0 => {
            if entity.get_str("Owner").is_some() || entity.get_str("OwnerUUID").is_some() {
                entity.insert("Trusting", 1i8);
            }
            entity.remove("CatType");
        }
        1..=3 => {
            entity.insert("id", "minecraft:cat");
        }
        _ => {}
    }
}

/// 1.14 split cats from ocelots, rebuilt villager data and renamed a few blocks.
pub struct V1_14WorldUpgrade;

impl WorldUpgrade for V1_14WorldUpgrade {
    fn from(&self) -> WorldVersion {
        WorldVersion::V1_13
    }

    fn to(&self) -> WorldVersion {
        WorldVersion::V1_14
    }

    fn upgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError> {
        for chunk in world.chunks_mut() {
            update_blocks(chunk, true)?;
            for entity in chunk.entities_mut() {
                let id = entity.get_str("id").unwrap_or_default().to_owned();
                match id.as_str() {
                    "minecraft:ocelot" => upgrade_ocelot(entity),
                    "minecraft:villager" | "minecraft:zombie_villager" => upgrade_villager(entity),
                    "minecraft:banner" => translate_banner(entity, ILLAGER_BANNER, OMINOUS_BANNER),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn downgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError> {
        for chunk in world.chunks_mut() {
            update_blocks(chunk, false)?;
            for entity in chunk.entities_mut() {
                let id = entity.get_str("id").unwrap_or_default().to_owned();
                match id.as_str() {
                    "minecraft:cat" => {
                        entity.insert("id", "minecraft:ocelot");
                    }
                    "minecraft:villager" | "minecraft:zombie_villager" => {
                        downgrade_villager(entity)
                    }
                    "minecraft:banner" => translate_banner(entity, OMINOUS_BANNER, ILLAGER_BANNER),
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use slime_util::{
        nbt::{NBTList, NBT},
        nbt_compound, PackedArray, PackedLayout,
    };

    use super::V1_14WorldUpgrade;
    use crate::{
        upgrade::WorldUpgrade, Biomes, SectionBlocks, SlimeChunk, SlimeError, SlimePropertyMap,
        SlimeSection, SlimeWorld, WorldVersion,
    };

    fn world_with(chunk: SlimeChunk) -> SlimeWorld {
        SlimeWorld::with_chunks("w", WorldVersion::V1_13, SlimePropertyMap::new(), [chunk])
            .expect("chunk belongs to world")
    }

    fn empty_chunk() -> SlimeChunk {
        SlimeChunk::new("w", 1, 2, Biomes::Modern(vec![0; 256].into_boxed_slice()))
    }

    #[test]
    fn trapped_chests_and_renames() -> Result<(), SlimeError> {
        let mut states = PackedArray::new(PackedLayout::Spanning, 4, 4096);
        // y = 1, z = 2, x = 3 inside section 4
        states.set(1 << 8 | 2 << 4 | 3, 2);
        states.set(0, 1);
        let mut chunk = empty_chunk();
        chunk.sections[4] = Some(SlimeSection {
            blocks: SectionBlocks::Modern {
                palette: vec![
                    nbt_compound!["Name" => "minecraft:air"],
                    nbt_compound!["Name" => "minecraft:sign"],
                    nbt_compound!["Name" => "minecraft:trapped_chest"],
                ],
                block_states: states.into_inner().iter().map(|s| *s as i64).collect(),
            },
            block_light: None,
            sky_light: None,
        });
        chunk.tile_entities.push(nbt_compound![
            "id" => "minecraft:chest", "x" => 19, "y" => 65, "z" => 34,
        ]);
        chunk.tile_entities.push(nbt_compound![
            "id" => "minecraft:chest", "x" => 20, "y" => 65, "z" => 34,
        ]);
        let mut world = world_with(chunk);

        V1_14WorldUpgrade.upgrade(&mut world)?;
        let chunk = world.get_chunk(1, 2).expect("chunk");
        assert_eq!(chunk.tile_entities[0].get_str("id"), Some("minecraft:trapped_chest"));
        assert_eq!(chunk.tile_entities[1].get_str("id"), Some("minecraft:chest"));
        let Some(SectionBlocks::Modern { palette, .. }) = chunk.sections[4].as_ref().map(|s| &s.blocks) else {
            panic!("modern section expected");
        };
        assert_eq!(palette[1].get_str("Name"), Some("minecraft:oak_sign"));

        V1_14WorldUpgrade.downgrade(&mut world)?;
        let chunk = world.get_chunk(1, 2).expect("chunk");
        assert_eq!(chunk.tile_entities[0].get_str("id"), Some("minecraft:chest"));
        Ok(())
    }

    #[test]
    fn mismatched_block_entity_fails() {
        let mut states = PackedArray::new(PackedLayout::Spanning, 4, 4096);
        states.set(0, 1);
        let mut chunk = empty_chunk();
        chunk.sections[0] = Some(SlimeSection {
            blocks: SectionBlocks::Modern {
                palette: vec![
                    nbt_compound!["Name" => "minecraft:air"],
                    nbt_compound!["Name" => "minecraft:trapped_chest"],
                ],
                block_states: states.into_inner().iter().map(|s| *s as i64).collect(),
            },
            block_light: None,
            sky_light: None,
        });
        chunk.tile_entities.push(nbt_compound![
            "id" => "minecraft:furnace", "x" => 16, "y" => 0, "z" => 32,
        ]);
        let mut world = world_with(chunk);
        assert!(matches!(
            V1_14WorldUpgrade.upgrade(&mut world),
            Err(SlimeError::Upgrade { to: WorldVersion::V1_14, .. })
        ));
    }

    #[test]
    fn villagers_and_cats() -> Result<(), SlimeError> {
        let recipes = NBTList::try_from(vec![NBT::empty(); 7])?;
        let mut chunk = empty_chunk();
        chunk.entities.push(nbt_compound![
            "id" => "minecraft:villager",
            "Profession" => 3,
            "Career" => 2,
            "CareerLevel" => 1,
            "Offers" => nbt_compound!["Recipes" => recipes],
        ]);
        chunk.entities.push(nbt_compound![
            "id" => "minecraft:ocelot",
            "CatType" => 0,
            "OwnerUUID" => "1234",
        ]);
        chunk.entities.push(nbt_compound!["id" => "minecraft:ocelot", "CatType" => 2]);
        let mut world = world_with(chunk);

        V1_14WorldUpgrade.upgrade(&mut world)?;
        let chunk = world.get_chunk(1, 2).expect("chunk");
        let villager = &chunk.entities[0];
        assert!(villager.get("Profession").is_none());
        assert_eq!(villager.get_int("Xp"), Some(50));
        let data = villager.get("VillagerData").expect("villager data");
        assert_eq!(data.get_str("profession"), Some("minecraft:weaponsmith"));
        assert_eq!(data.get_int("level"), Some(3));
        assert_eq!(data.get_str("type"), Some("minecraft:plains"));

        assert_eq!(chunk.entities[1].get("Trusting"), Some(&NBT::Byte(1)));
        assert!(chunk.entities[1].get("CatType").is_none());
        assert_eq!(chunk.entities[2].get_str("id"), Some("minecraft:cat"));

        V1_14WorldUpgrade.downgrade(&mut world)?;
        let chunk = world.get_chunk(1, 2).expect("chunk");
        let villager = &chunk.entities[0];
        assert_eq!(villager.get_int("Profession"), Some(3));
        assert_eq!(villager.get_int("Career"), Some(2));
        // The original career level is not recoverable.
        assert_eq!(villager.get_int("CareerLevel"), Some(1));
        assert_eq!(chunk.entities[2].get_str("id"), Some("minecraft:ocelot"));
        Ok(())
    }

    #[test]
    fn banner_names() -> Result<(), SlimeError> {
        let mut chunk = empty_chunk();
        chunk.tile_entities.push(nbt_compound![
            "id" => "minecraft:banner",
            "CustomName" => "{\"color\":\"gold\",\"translate\":\"block.minecraft.illager_banner\"}",
        ]);
        let mut world = world_with(chunk);
        V1_14WorldUpgrade.upgrade(&mut world)?;
        let chunk = world.get_chunk(1, 2).expect("chunk");
        assert_eq!(
            chunk.tile_entities[0].get_str("CustomName"),
            Some("{\"color\":\"gold\",\"translate\":\"block.minecraft.ominous_banner\"}")
        );
        Ok(())
    }
}
