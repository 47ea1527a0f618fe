//! Typed world settings stored in the `properties` compound of a world's
//! extra data.

use std::{collections::HashMap, sync::LazyLock};

use slime_util::nbt::NBT;

use crate::SlimeError;

/// A Rust type a property can hold, with its NBT representation.
pub trait PropertyType: Clone + std::fmt::Debug {
    fn to_nbt(&self) -> NBT;
    /// [`None`] if the stored tag has the wrong type.
    fn from_nbt(nbt: &NBT) -> Option<Self>;
}

impl PropertyType for bool {
    fn to_nbt(&self) -> NBT {
        NBT::Byte(*self as i8)
    }

    fn from_nbt(nbt: &NBT) -> Option<Self> {
        match nbt {
            NBT::Byte(byte) => Some(*byte == 1),
            _ => None,
        }
    }
}

impl PropertyType for i32 {
    fn to_nbt(&self) -> NBT {
        NBT::Int(*self)
    }

    fn from_nbt(nbt: &NBT) -> Option<Self> {
        match nbt {
            NBT::Int(int) => Some(*int),
            _ => None,
        }
    }
}

impl PropertyType for String {
    fn to_nbt(&self) -> NBT {
        NBT::String(self.clone())
    }

    fn from_nbt(nbt: &NBT) -> Option<Self> {
        nbt.as_str().map(str::to_owned)
    }
}

#[derive(Debug)]
pub struct SlimeProperty<T: PropertyType> {
    name: &'static str,
    default: T,
    validator: Option<fn(&T) -> bool>,
}

impl<T: PropertyType> SlimeProperty<T> {
    /// # Panics
    /// If `default` is rejected by `validator`.
    pub fn new(name: &'static str, default: T, validator: Option<fn(&T) -> bool>) -> Self {
        if let Some(validator) = validator {
            assert!(
                validator(&default),
                "Default value {:?} of property {} fails its own validator",
                default,
                name
            );
        }
        Self {
            name,
            default,
            validator,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub fn is_valid(&self, value: &T) -> bool {
        self.validator.is_none_or(|validator| validator(value))
    }
}

fn one_of_ignore_case(value: &str, allowed: &[&str]) -> bool {
    allowed.iter().any(|a| a.eq_ignore_ascii_case(value))
}

pub static SPAWN_X: LazyLock<SlimeProperty<i32>> =
    LazyLock::new(|| SlimeProperty::new("spawnX", 0, None));
pub static SPAWN_Y: LazyLock<SlimeProperty<i32>> =
    LazyLock::new(|| SlimeProperty::new("spawnY", 255, None));
pub static SPAWN_Z: LazyLock<SlimeProperty<i32>> =
    LazyLock::new(|| SlimeProperty::new("spawnZ", 0, None));
pub static DIFFICULTY: LazyLock<SlimeProperty<String>> = LazyLock::new(|| {
    SlimeProperty::new(
        "difficulty",
        "peaceful".to_owned(),
        Some(|value| one_of_ignore_case(value, &["peaceful", "easy", "normal", "hard"])),
    )
});
pub static ALLOW_MONSTERS: LazyLock<SlimeProperty<bool>> =
    LazyLock::new(|| SlimeProperty::new("allowMonsters", true, None));
pub static ALLOW_ANIMALS: LazyLock<SlimeProperty<bool>> =
    LazyLock::new(|| SlimeProperty::new("allowAnimals", true, None));
pub static DRAGON_BATTLE: LazyLock<SlimeProperty<bool>> =
    LazyLock::new(|| SlimeProperty::new("dragonBattle", false, None));
pub static PVP: LazyLock<SlimeProperty<bool>> =
    LazyLock::new(|| SlimeProperty::new("pvp", true, None));
pub static ENVIRONMENT: LazyLock<SlimeProperty<String>> = LazyLock::new(|| {
    SlimeProperty::new(
        "environment",
        "normal".to_owned(),
        Some(|value| one_of_ignore_case(value, &["normal", "nether", "the_end"])),
    )
});
pub static WORLD_TYPE: LazyLock<SlimeProperty<String>> = LazyLock::new(|| {
    SlimeProperty::new(
        "worldtype",
        "default".to_owned(),
        Some(|value| {
            one_of_ignore_case(
                value,
                &[
                    "default",
                    "flat",
                    "large_biomes",
                    "amplified",
                    "customized",
                    "debug_all_block_states",
                    "default_1_1",
                ],
            )
        }),
    )
});
pub static DEFAULT_BIOME: LazyLock<SlimeProperty<String>> =
    LazyLock::new(|| SlimeProperty::new("defaultBiome", "minecraft:plains".to_owned(), None));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlimePropertyMap {
    properties: HashMap<String, NBT>,
}

impl SlimePropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_compound(properties: HashMap<String, NBT>) -> Self {
        Self { properties }
    }

    /// Stored value, or the property's default when unset or stored with the
    /// wrong tag type.
    pub fn get_value<T: PropertyType>(&self, property: &SlimeProperty<T>) -> T {
        self.properties
            .get(property.name)
            .and_then(T::from_nbt)
            .unwrap_or_else(|| property.default.clone())
    }

    pub fn set_value<T: PropertyType>(
        &mut self,
        property: &SlimeProperty<T>,
        value: T,
    ) -> Result<(), SlimeError> {
        if !property.is_valid(&value) {
            return Err(SlimeError::InvalidPropertyValue {
                property: property.name.to_owned(),
                value: format!("{:?}", value),
            });
        }
        self.properties
            .insert(property.name.to_owned(), value.to_nbt());
        Ok(())
    }

    /// Copies every entry of `other` into this map, `other` wins on collisions.
    pub fn merge(&mut self, other: &SlimePropertyMap) {
        self.properties.extend(
            other
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    pub fn to_compound(&self) -> NBT {
        NBT::Compound(self.properties.clone())
    }
}
