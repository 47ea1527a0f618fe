use std::{collections::HashMap, sync::LazyLock};

use slime_util::nbt::{NBTError, NBT};

use super::{RenameTable, WorldUpgrade};
use crate::{SlimeError, SlimeWorld, WorldVersion};

const ENTITY_IDS: &[(&str, &str)] = &[
    ("AreaEffectCloud", "minecraft:area_effect_cloud"),
    ("ArmorStand", "minecraft:armor_stand"),
    ("Arrow", "minecraft:arrow"),
    ("Bat", "minecraft:bat"),
    ("Blaze", "minecraft:blaze"),
    ("Boat", "minecraft:boat"),
    ("CaveSpider", "minecraft:cave_spider"),
    ("Chicken", "minecraft:chicken"),
    ("Cow", "minecraft:cow"),
    ("Creeper", "minecraft:creeper"),
    ("DragonFireball", "minecraft:dragon_fireball"),
    ("EnderCrystal", "minecraft:ender_crystal"),
    ("EnderDragon", "minecraft:ender_dragon"),
    ("Enderman", "minecraft:enderman"),
    ("Endermite", "minecraft:endermite"),
    ("EntityHorse", "minecraft:horse"),
    ("EyeOfEnderSignal", "minecraft:eye_of_ender_signal"),
    ("FallingSand", "minecraft:falling_block"),
    ("Fireball", "minecraft:fireball"),
    ("FireworksRocketEntity", "minecraft:fireworks_rocket"),
    ("Ghast", "minecraft:ghast"),
    ("Giant", "minecraft:giant"),
    ("Guardian", "minecraft:guardian"),
    ("Item", "minecraft:item"),
    ("ItemFrame", "minecraft:item_frame"),
    ("LavaSlime", "minecraft:magma_cube"),
    ("LeashKnot", "minecraft:leash_knot"),
    ("MinecartChest", "minecraft:chest_minecart"),
    ("MinecartCommandBlock", "minecraft:commandblock_minecart"),
    ("MinecartFurnace", "minecraft:furnace_minecart"),
    ("MinecartHopper", "minecraft:hopper_minecart"),
    ("MinecartRideable", "minecraft:minecart"),
    ("MinecartSpawner", "minecraft:spawner_minecart"),
    ("MinecartTNT", "minecraft:tnt_minecart"),
    ("MushroomCow", "minecraft:mooshroom"),
    ("Ozelot", "minecraft:ocelot"),
    ("Painting", "minecraft:painting"),
    ("Pig", "minecraft:pig"),
    ("PigZombie", "minecraft:zombie_pigman"),
    ("PolarBear", "minecraft:polar_bear"),
    ("PrimedTnt", "minecraft:tnt"),
    ("Rabbit", "minecraft:rabbit"),
    ("Sheep", "minecraft:sheep"),
    ("Shulker", "minecraft:shulker"),
    ("ShulkerBullet", "minecraft:shulker_bullet"),
    ("Silverfish", "minecraft:silverfish"),
    ("Skeleton", "minecraft:skeleton"),
    ("Slime", "minecraft:slime"),
    ("SmallFireball", "minecraft:small_fireball"),
    ("SnowMan", "minecraft:snowman"),
    ("Snowball", "minecraft:snowball"),
    ("SpectralArrow", "minecraft:spectral_arrow"),
    ("Spider", "minecraft:spider"),
    ("Squid", "minecraft:squid"),
    ("ThrownEgg", "minecraft:egg"),
    ("ThrownEnderpearl", "minecraft:ender_pearl"),
    ("ThrownExpBottle", "minecraft:xp_bottle"),
    ("ThrownPotion", "minecraft:potion"),
    ("Villager", "minecraft:villager"),
    ("VillagerGolem", "minecraft:villager_golem"),
    ("Witch", "minecraft:witch"),
    ("WitherBoss", "minecraft:wither"),
    ("WitherSkull", "minecraft:wither_skull"),
    ("Wolf", "minecraft:wolf"),
    ("XPOrb", "minecraft:xp_orb"),
    ("Zombie", "minecraft:zombie"),
];

const TILE_ENTITY_IDS: &[(&str, &str)] = &[
    ("Airportal", "minecraft:end_portal"),
    ("Banner", "minecraft:banner"),
    ("Beacon", "minecraft:beacon"),
    ("Cauldron", "minecraft:brewing_stand"),
    ("Chest", "minecraft:chest"),
    ("Comparator", "minecraft:comparator"),
    ("Control", "minecraft:command_block"),
    ("DLDetector", "minecraft:daylight_detector"),
    ("Dropper", "minecraft:dropper"),
    ("EnchantTable", "minecraft:enchanting_table"),
    ("EndGateway", "minecraft:end_gateway"),
    ("EnderChest", "minecraft:ender_chest"),
    ("FlowerPot", "minecraft:flower_pot"),
    ("Furnace", "minecraft:furnace"),
    ("Hopper", "minecraft:hopper"),
    ("MobSpawner", "minecraft:mob_spawner"),
    ("Music", "minecraft:noteblock"),
    ("Piston", "minecraft:piston"),
    ("RecordPlayer", "minecraft:jukebox"),
    ("Sign", "minecraft:sign"),
    ("Skull", "minecraft:skull"),
    ("Structure", "minecraft:structure_block"),
    ("Trap", "minecraft:dispenser"),
];

static ENTITIES: LazyLock<RenameTable> = LazyLock::new(|| RenameTable::new(ENTITY_IDS));
static TILE_ENTITIES: LazyLock<RenameTable> =
    LazyLock::new(|| RenameTable::new(TILE_ENTITY_IDS));

/// Renames `id` through `table`, riders stacked in `Passengers` included.
fn rename(entity: &mut NBT, table: &HashMap<&'static str, &'static str>) -> Result<(), NBTError> {
    if let Some(new) = entity.get_str("id").and_then(|id| table.get(id).copied()) {
        entity.insert("id", new);
    }
    if let Some(NBT::List(passengers)) = entity.get_mut("Passengers") {
        let mut riders = Ok(());
        passengers.try_map(|mut passenger| {
            if riders.is_ok() {
                riders = rename(&mut passenger, table);
            }
            passenger
        })?;
        riders?;
    }
    Ok(())
}

/// 1.11 switched entity and block entity ids to namespaced identifiers.
pub struct V1_11WorldUpgrade;

impl V1_11WorldUpgrade {
    fn apply(world: &mut SlimeWorld, upgrade: bool) -> Result<(), SlimeError> {
        let (entities, tile_entities) = if upgrade {
            (&ENTITIES.upgrade, &TILE_ENTITIES.upgrade)
        } else {
            (&ENTITIES.downgrade, &TILE_ENTITIES.downgrade)
        };
        for chunk in world.chunks_mut() {
            for entity in chunk.entities.iter_mut() {
                rename(entity, entities)?;
            }
            for tile_entity in chunk.tile_entities.iter_mut() {
                rename(tile_entity, tile_entities)?;
            }
        }
        Ok(())
    }
}

impl WorldUpgrade for V1_11WorldUpgrade {
    fn from(&self) -> WorldVersion {
        WorldVersion::V1_9
    }

    fn to(&self) -> WorldVersion {
        WorldVersion::V1_11
    }

    fn upgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError> {
        Self::apply(world, true)
    }

    fn downgrade(&self, world: &mut SlimeWorld) -> Result<(), SlimeError> {
        Self::apply(world, false)
    }
}
