/// Fixed size array of 4 bit values, two per byte.
///
/// Even indices are stored in the low nibble, odd indices in the high nibble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NibbleArray {
    backing: Box<[u8]>,
}

impl NibbleArray {
    /// Light and block data arrays of one 16x16x16 section.
    pub const SECTION_BYTES: usize = 2048;

    pub fn new(size: usize) -> Self {
        Self {
            backing: vec![0u8; size.div_ceil(2)].into_boxed_slice(),
        }
    }

    pub fn from_backing(backing: Box<[u8]>) -> Self {
        Self { backing }
    }

    pub fn backing(&self) -> &[u8] {
        &self.backing
    }

    pub fn into_backing(self) -> Box<[u8]> {
        self.backing
    }

    pub fn len(&self) -> usize {
        self.backing.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.backing.is_empty()
    }

    /// # Panics
    /// If `index` is out of range.
    pub fn get(&self, index: usize) -> u8 {
        let byte = self.backing[index >> 1];
        if index & 1 == 0 {
            byte & 0x0F
        } else {
            (byte >> 4) & 0x0F
        }
    }

    /// Only the low 4 bits of `value` are stored.
    ///
    /// # Panics
    /// If `index` is out of range.
    pub fn set(&mut self, index: usize, value: u8) {
        let value = value & 0x0F;
        let byte = &mut self.backing[index >> 1];
        if index & 1 == 0 {
            *byte = (*byte & 0xF0) | value;
        } else {
            *byte = (*byte & 0x0F) | (value << 4);
        }
    }
}
