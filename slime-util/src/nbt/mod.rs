mod bin;
mod de;
mod tag;

use std::collections::HashMap;

pub use de::from_nbt;
pub use tag::NBTTag;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NBTError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
    #[error("NBT invalid tag value {0}")]
    InvalidTagValue(u8),
    #[error("NBT unexpected end tag")]
    UnexpectedEnd,
    #[error("NBT list tag mismatch {expected:?} {got:?}")]
    ListTagMismatch { expected: NBTTag, got: NBTTag },
    #[error("NBT negative length {0}")]
    NegativeLength(i32),
    #[error("NBT length {0} doesn't fit its prefix")]
    LengthOverflow(usize),
    #[error("NBT root is not a compound")]
    RootNotCompound,
    #[error("NBT error while deserializing: {0:?}")]
    DeserializeError(String),
}

/// Values of one NBT type.
///
/// An empty list may carry no type at all, the first pushed item decides it.
#[derive(Clone, Default)]
pub struct NBTList {
    tag: Option<NBTTag>,
    list: Vec<NBT>,
}

impl PartialEq for NBTList {
    fn eq(&self, other: &Self) -> bool {
        self.list == other.list
    }
}

impl std::fmt::Debug for NBTList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.list.fmt(f)
    }
}

impl NBTList {
    pub fn tag(&self) -> Option<NBTTag> {
        self.tag.or_else(|| self.list.first().map(|item| item.tag()))
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_tag(tag: NBTTag) -> Self {
        Self {
            tag: (tag != NBTTag::End).then_some(tag),
            list: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn push(&mut self, v: NBT) -> Result<(), NBTError> {
        if let Some(tag) = self.tag() {
            if tag != v.tag() {
                return Err(NBTError::ListTagMismatch {
                    expected: tag,
                    got: v.tag(),
                });
            }
        }
        self.list.push(v);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&NBT> {
        self.list.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NBT> {
        self.list.iter()
    }

    /// Items are mapped in place, a mapper returning a different type than
    /// the list holds is an error and leaves that item out.
    pub fn try_map<F>(&mut self, mut mapper: F) -> Result<(), NBTError>
    where
        F: FnMut(NBT) -> NBT,
    {
        let mut new = NBTList {
            tag: self.tag,
            list: Vec::with_capacity(self.list.len()),
        };
        let result = self
            .list
            .drain(..)
            .map(|v| new.push(mapper(v)))
            .collect::<Vec<_>>();
        *self = new;
        result.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

impl IntoIterator for NBTList {
    type Item = NBT;
    type IntoIter = std::vec::IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}

impl TryFrom<Vec<NBT>> for NBTList {
    type Error = NBTError;

    fn try_from(value: Vec<NBT>) -> Result<Self, Self::Error> {
        let mut list = Self::new();
        value.into_iter().try_for_each(|v| list.push(v))?;
        Ok(list)
    }
}

#[derive(Clone, PartialEq)]
pub enum NBT {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    List(NBTList),
    Compound(HashMap<String, NBT>),
    ByteArray(Box<[i8]>),
    IntArray(Box<[i32]>),
    LongArray(Box<[i64]>),
}

impl std::fmt::Debug for NBT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Byte(byte) => write!(f, "{}b", byte),
            Self::Short(short) => write!(f, "{}s", short),
            Self::Int(int) => write!(f, "{}i", int),
            Self::Long(long) => write!(f, "{}l", long),
            Self::Float(float) => write!(f, "{}f", float),
            Self::Double(double) => write!(f, "{}d", double),
            Self::String(string) => write!(f, "\"{}\"", string),
            Self::List(list) => list.fmt(f),
            Self::Compound(compound) => compound.fmt(f),
            Self::ByteArray(byte_array) => byte_array.fmt(f),
            Self::IntArray(int_array) => int_array.fmt(f),
            Self::LongArray(long_array) => long_array.fmt(f),
        }
    }
}

macro_rules! nbt_from {
    ($type:ty, $value_name:ident => $parse:expr) => {
        impl From<$type> for NBT {
            fn from($value_name: $type) -> Self {
                $parse
            }
        }
    };
}

nbt_from!(i8, v => NBT::Byte(v));
nbt_from!(bool, v => NBT::Byte(v as i8));
nbt_from!(i16, v => NBT::Short(v));
nbt_from!(i32, v => NBT::Int(v));
nbt_from!(i64, v => NBT::Long(v));
nbt_from!(f32, v => NBT::Float(v));
nbt_from!(f64, v => NBT::Double(v));
nbt_from!(String, v => NBT::String(v));
nbt_from!(&str, v => NBT::String(v.to_owned()));
nbt_from!(NBTList, v => NBT::List(v));
nbt_from!(HashMap<String, NBT>, v => NBT::Compound(v));

#[macro_export]
macro_rules! nbt_compound {
    [$($name:expr => $value:expr),* $(,)?] => {
        $crate::nbt::NBT::Compound(
            vec![
                $(
                    ($name.to_string(), $crate::nbt::NBT::from($value)),
                )*
            ].into_iter().collect::<std::collections::HashMap<String, $crate::nbt::NBT>>()
        )
    };
}

impl NBT {
    /// Empty NBT compound.
    pub fn empty() -> Self {
        Self::Compound(HashMap::new())
    }

    pub fn tag(&self) -> NBTTag {
        match self {
            NBT::Byte(..) => NBTTag::Byte,
            NBT::Short(..) => NBTTag::Short,
            NBT::Int(..) => NBTTag::Int,
            NBT::Long(..) => NBTTag::Long,
            NBT::Float(..) => NBTTag::Float,
            NBT::Double(..) => NBTTag::Double,
            NBT::String(..) => NBTTag::String,
            NBT::List(..) => NBTTag::List,
            NBT::Compound(..) => NBTTag::Compound,
            NBT::ByteArray(..) => NBTTag::ByteArray,
            NBT::IntArray(..) => NBTTag::IntArray,
            NBT::LongArray(..) => NBTTag::LongArray,
        }
    }

    pub fn as_compound(&self) -> Option<&HashMap<String, NBT>> {
        match self {
            NBT::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut HashMap<String, NBT>> {
        match self {
            NBT::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&NBTList> {
        match self {
            NBT::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NBT::String(string) => Some(string),
            _ => None,
        }
    }

    /// Any integral value widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NBT::Byte(v) => Some(*v as i64),
            NBT::Short(v) => Some(*v as i64),
            NBT::Int(v) => Some(*v as i64),
            NBT::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Any numeric value widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NBT::Float(v) => Some(*v as f64),
            NBT::Double(v) => Some(*v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Compound field lookup, [`None`] if this isn't a compound.
    pub fn get(&self, key: &str) -> Option<&NBT> {
        self.as_compound()?.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut NBT> {
        self.as_compound_mut()?.get_mut(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.get(key)?.as_i64().map(|v| v as i32)
    }

    /// Sets a compound field, returning the previous value. Does nothing on
    /// non-compound values.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<NBT>) -> Option<NBT> {
        self.as_compound_mut()?.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<NBT> {
        self.as_compound_mut()?.remove(key)
    }
}

#[cfg(test)]
mod test {
    use super::{NBTError, NBTList, NBTTag, NBT};

    #[test]
    fn list_rejects_mixed_types() -> Result<(), NBTError> {
        let mut list = NBTList::new();
        list.push(NBT::Int(1))?;
        assert!(matches!(
            list.push(NBT::Byte(1)),
            Err(NBTError::ListTagMismatch {
                expected: NBTTag::Int,
                got: NBTTag::Byte
            })
        ));
        assert_eq!(list.len(), 1);
        Ok(())
    }

    #[test]
    fn compound_accessors() {
        let mut nbt = nbt_compound![
            "id" => "minecraft:cow",
            "Age" => 3i16,
            "Pos" => NBTList::try_from(vec![NBT::Double(1.5), NBT::Double(64.0)]).unwrap(),
        ];
        assert_eq!(nbt.get_str("id"), Some("minecraft:cow"));
        assert_eq!(nbt.get_int("Age"), Some(3));
        assert_eq!(
            nbt.get("Pos").and_then(|pos| pos.as_list()?.get(1)?.as_f64()),
            Some(64.0)
        );
        assert_eq!(nbt.remove("Age"), Some(NBT::Short(3)));
        assert!(nbt.get("Age").is_none());
        assert!(NBT::Int(5).get("x").is_none());
    }

    #[test]
    fn list_try_map() -> Result<(), NBTError> {
        let mut list = NBTList::try_from(vec![NBT::Int(1), NBT::Int(2)])?;
        list.try_map(|v| NBT::Int(v.as_i64().unwrap_or(0) as i32 * 10))?;
        assert_eq!(list.get(1), Some(&NBT::Int(20)));
        assert!(list.try_map(|_| NBT::Byte(0)).is_err());
        Ok(())
    }
}
