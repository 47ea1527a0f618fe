use std::{
    collections::HashMap,
    io::{Read, Write},
};

use super::{tag::NBTTag, NBTError, NBTList, NBT};
use crate::ReadExt as _;

fn read_length(data: &mut impl Read) -> Result<usize, NBTError> {
    let length = i32::from_be_bytes(data.read_const()?);
    usize::try_from(length).map_err(|_| NBTError::NegativeLength(length))
}

fn read_string(data: &mut impl Read) -> Result<String, NBTError> {
    let length = u16::from_be_bytes(data.read_const()?) as usize;
    Ok(String::from_utf8(data.read_var(length)?.to_vec())?)
}

fn write_length(length: usize, data: &mut impl Write) -> Result<(), NBTError> {
    let length = i32::try_from(length).map_err(|_| NBTError::LengthOverflow(length))?;
    data.write_all(&length.to_be_bytes())?;
    Ok(())
}

fn write_string(string: &str, data: &mut impl Write) -> Result<(), NBTError> {
    let length =
        u16::try_from(string.len()).map_err(|_| NBTError::LengthOverflow(string.len()))?;
    data.write_all(&length.to_be_bytes())?;
    data.write_all(string.as_bytes())?;
    Ok(())
}

impl NBT {
    fn read_tag(data: &mut impl Read, tag: NBTTag) -> Result<Self, NBTError> {
        match tag {
            NBTTag::End => Err(NBTError::UnexpectedEnd),
            NBTTag::Byte => Ok(NBT::Byte(i8::from_be_bytes(data.read_const()?))),
            NBTTag::Short => Ok(NBT::Short(i16::from_be_bytes(data.read_const()?))),
            NBTTag::Int => Ok(NBT::Int(i32::from_be_bytes(data.read_const()?))),
            NBTTag::Long => Ok(NBT::Long(i64::from_be_bytes(data.read_const()?))),
            NBTTag::Float => Ok(NBT::Float(f32::from_be_bytes(data.read_const()?))),
            NBTTag::Double => Ok(NBT::Double(f64::from_be_bytes(data.read_const()?))),
            NBTTag::ByteArray => Ok(NBT::ByteArray({
                let length = read_length(data)?;
                data.read_var(length)?
                    .iter()
                    .map(|b| *b as i8)
                    .collect()
            })),
            NBTTag::String => Ok(NBT::String(read_string(data)?)),
            NBTTag::List => Ok(NBT::List({
                let tag = NBTTag::try_from(u8::from_be_bytes(data.read_const()?))?;
                let length = read_length(data)?;
                let mut list = NBTList::new_with_tag(tag);
                (0..length).try_for_each(|_| {
                    let item = NBT::read_tag(data, tag)?;
                    list.push(item)
                })?;
                list
            })),
            NBTTag::Compound => Ok(NBT::Compound({
                let mut compound = HashMap::new();
                loop {
                    let tag = NBTTag::try_from(u8::from_be_bytes(data.read_const()?))?;
                    if tag == NBTTag::End {
                        break;
                    }
                    let name = read_string(data)?;
                    compound.insert(name, NBT::read_tag(data, tag)?);
                }
                compound
            })),
            NBTTag::IntArray => Ok(NBT::IntArray(
                (0..read_length(data)?)
                    .map(|_| Ok(i32::from_be_bytes(data.read_const()?)))
                    .collect::<Result<Box<[_]>, std::io::Error>>()?,
            )),
            NBTTag::LongArray => Ok(NBT::LongArray(
                (0..read_length(data)?)
                    .map(|_| Ok(i64::from_be_bytes(data.read_const()?)))
                    .collect::<Result<Box<[_]>, std::io::Error>>()?,
            )),
        }
    }

    /// Reads one named root tag.
    pub fn read(mut data: impl Read) -> Result<(String, NBT), NBTError> {
        let tag = NBTTag::try_from(u8::from_be_bytes(data.read_const()?))?;
        if tag == NBTTag::End {
            return Err(NBTError::UnexpectedEnd);
        }
        let name = read_string(&mut data)?;
        Ok((name, NBT::read_tag(&mut data, tag)?))
    }

    /// Reads a named root tag that must be a compound.
    pub fn read_compound(data: impl Read) -> Result<(String, NBT), NBTError> {
        let (name, nbt) = NBT::read(data)?;
        if !matches!(nbt, NBT::Compound(..)) {
            return Err(NBTError::RootNotCompound);
        }
        Ok((name, nbt))
    }

    fn write_tag(
        &self,
        name: Option<&str>,
        write_tag: bool,
        data: &mut impl Write,
    ) -> Result<(), NBTError> {
        if write_tag {
            data.write_all(&u8::from(self.tag()).to_be_bytes())?;
        }
        if let Some(name) = name {
            write_string(name, data)?;
        }
        match self {
            NBT::Byte(byte) => data.write_all(&byte.to_be_bytes())?,
            NBT::Short(short) => data.write_all(&short.to_be_bytes())?,
            NBT::Int(int) => data.write_all(&int.to_be_bytes())?,
            NBT::Long(long) => data.write_all(&long.to_be_bytes())?,
            NBT::Float(float) => data.write_all(&float.to_be_bytes())?,
            NBT::Double(double) => data.write_all(&double.to_be_bytes())?,
            NBT::String(string) => write_string(string, data)?,
            NBT::List(list) => {
                // Untyped lists are always empty and go out as End lists.
                let tag = list.tag().unwrap_or(NBTTag::End);
                data.write_all(&u8::from(tag).to_be_bytes())?;
                write_length(list.len(), data)?;
                list.iter()
                    .try_for_each(|item| item.write_tag(None, false, data))?;
            }
            NBT::Compound(compound) => {
                compound
                    .iter()
                    .try_for_each(|(key, value)| value.write_tag(Some(key), true, data))?;
                data.write_all(&u8::from(NBTTag::End).to_be_bytes())?;
            }
            NBT::ByteArray(bytes) => {
                write_length(bytes.len(), data)?;
                data.write_all(&bytes.iter().map(|b| *b as u8).collect::<Vec<_>>())?;
            }
            NBT::IntArray(ints) => {
                write_length(ints.len(), data)?;
                data.write_all(
                    &ints
                        .iter()
                        .flat_map(|i| i.to_be_bytes())
                        .collect::<Vec<_>>(),
                )?;
            }
            NBT::LongArray(longs) => {
                write_length(longs.len(), data)?;
                data.write_all(
                    &longs
                        .iter()
                        .flat_map(|l| l.to_be_bytes())
                        .collect::<Vec<_>>(),
                )?;
            }
        }
        Ok(())
    }

    /// Writes this value as a named root tag.
    pub fn write(&self, name: &str, mut data: impl Write) -> Result<(), NBTError> {
        self.write_tag(Some(name), true, &mut data)
    }

    pub fn to_bytes(&self, name: &str) -> Result<Vec<u8>, NBTError> {
        let mut data = Vec::new();
        self.write(name, &mut data)?;
        Ok(data)
    }
}
