use std::io::{Read, Write};

use crate::ReadExt as _;

/// Bit set stored as bytes, bit `i` lives in byte `i / 8` at bit `i % 8`.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct BitSet {
    length: usize,
    data: Box<[u8]>,
}

impl BitSet {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            data: vec![0; length.div_ceil(8)].into_boxed_slice(),
        }
    }

    pub fn from_inner(length: usize, inner: Box<[u8]>) -> Self {
        assert!(inner.len() == length.div_ceil(8));
        Self {
            length,
            data: inner,
        }
    }

    pub fn into_inner(self) -> Box<[u8]> {
        self.data
    }

    pub fn inner(&self) -> &[u8] {
        &self.data
    }

    pub fn num_bits(&self) -> usize {
        self.length
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.length).then(|| (self.data[index >> 3] & (1 << (index & 0b111))) != 0)
    }

    pub fn set(&mut self, index: usize, set: bool) {
        if index >= self.length {
            return;
        }
        if set {
            self.data[index >> 3] |= 1 << (index & 0b111);
        } else {
            self.data[index >> 3] &= !(1 << (index & 0b111));
        }
    }

    /// Indices of every set bit, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.length).filter(|i| self.get(*i).unwrap_or(false))
    }

    pub fn read(length: usize, mut reader: impl Read) -> std::io::Result<Self> {
        Ok(Self::from_inner(length, reader.read_var(length.div_ceil(8))?))
    }

    pub fn write(&self, mut writer: impl Write) -> std::io::Result<()> {
        writer.write_all(&self.data)
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct FixedBitSet<const N: usize> {
    data: Box<[u8]>,
}

impl<const N: usize> Default for FixedBitSet<N> {
    fn default() -> Self {
        Self {
            data: vec![0u8; N.div_ceil(8)].into_boxed_slice(),
        }
    }
}

impl<const N: usize> FixedBitSet<N> {
    pub fn from_inner(inner: Box<[u8]>) -> Self {
        assert!(inner.len() == N.div_ceil(8));
        Self { data: inner }
    }

    pub fn inner(&self) -> &[u8] {
        &self.data
    }

    pub const fn num_bits() -> usize {
        N
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        (index < N).then(|| (self.data[index >> 3] & (1 << (index & 0b111))) != 0)
    }

    pub fn set(&mut self, index: usize, set: bool) {
        if index >= N {
            return;
        }
        if set {
            self.data[index >> 3] |= 1 << (index & 0b111);
        } else {
            self.data[index >> 3] &= !(1 << (index & 0b111));
        }
    }

    pub fn read(mut reader: impl Read) -> std::io::Result<Self> {
        Ok(Self::from_inner(reader.read_var(N.div_ceil(8))?))
    }

    pub fn write(&self, mut writer: impl Write) -> std::io::Result<()> {
        writer.write_all(&self.data)
    }
}
