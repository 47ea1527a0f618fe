use super::NBTError;

macro_rules! nbt_tags {
    ($($name:ident = $id:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NBTTag {
            $($name),*
        }

        impl TryFrom<u8> for NBTTag {
            type Error = NBTError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($id => Ok(NBTTag::$name),)*
                    _ => Err(NBTError::InvalidTagValue(value)),
                }
            }
        }

        impl From<NBTTag> for u8 {
            fn from(tag: NBTTag) -> Self {
                match tag {
                    $(NBTTag::$name => $id),*
                }
            }
        }
    };
}

nbt_tags! {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}
