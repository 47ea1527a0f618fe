//! Reading typed structs out of NBT trees in place.

use std::fmt::Display;

use serde::{
    de::{
        value::{MapDeserializer, SeqDeserializer},
        Deserialize, Deserializer, IntoDeserializer, Visitor,
    },
    forward_to_deserialize_any,
};

use super::{NBTError, NBT};

impl serde::de::Error for NBTError {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::DeserializeError(msg.to_string())
    }
}

/// Deserializer borrowing a tag, strings and compound keys are handed out
/// without copying.
#[derive(Clone, Copy)]
struct TagDeserializer<'de>(&'de NBT);

impl<'de> IntoDeserializer<'de, NBTError> for TagDeserializer<'de> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> Deserializer<'de> for TagDeserializer<'de> {
    type Error = NBTError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, NBTError>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            NBT::Byte(v) => visitor.visit_i8(*v),
            NBT::Short(v) => visitor.visit_i16(*v),
            NBT::Int(v) => visitor.visit_i32(*v),
            NBT::Long(v) => visitor.visit_i64(*v),
            NBT::Float(v) => visitor.visit_f32(*v),
            NBT::Double(v) => visitor.visit_f64(*v),
            NBT::String(v) => visitor.visit_borrowed_str(v),
            NBT::List(list) => visitor.visit_seq(SeqDeserializer::new(list.iter().map(TagDeserializer))),
            NBT::Compound(compound) => visitor.visit_map(MapDeserializer::new(
                compound
                    .iter()
                    .map(|(key, value)| (key.as_str(), TagDeserializer(value))),
            )),
            NBT::ByteArray(bytes) => visitor.visit_seq(SeqDeserializer::new(bytes.iter().copied())),
            NBT::IntArray(ints) => visitor.visit_seq(SeqDeserializer::new(ints.iter().copied())),
            NBT::LongArray(longs) => visitor.visit_seq(SeqDeserializer::new(longs.iter().copied())),
        }
    }

    /// Flags like `Trusting` are bytes.
    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, NBTError>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            NBT::Byte(v) => visitor.visit_bool(*v != 0),
            _ => self.deserialize_any(visitor),
        }
    }

    /// A tag that is there is always `Some`, absent fields are up to `#[serde(default)]`.
    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, NBTError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, NBTError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

/// Reads `T` from `nbt` without taking it apart.
pub fn from_nbt<'de, T>(nbt: &'de NBT) -> Result<T, NBTError>
where
    T: Deserialize<'de>,
{
    T::deserialize(TagDeserializer(nbt))
}
