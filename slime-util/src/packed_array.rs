/// How entries are laid out across the backing longs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedLayout {
    /// Entries never straddle two longs, leftover high bits are padding.
    Aligned,
    /// Entries are packed back to back and may straddle two longs.
    Spanning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArray {
    layout: PackedLayout,
    bits_per_entry: u8,
    num_entries: usize,
    entry_mask: u64,
    packed: Box<[u64]>,
}

impl PackedArray {
    /// If this returns 0, you should not be using PackedArray
    pub const fn bits_per_entry(max_value: u64) -> u8 {
        match max_value {
            0 => 0,
            1 => 1,
            _ => (u64::BITS - max_value.leading_zeros()) as u8,
        }
    }

    pub fn packed_size(layout: PackedLayout, bits_per_entry: u8, num_entries: usize) -> usize {
        match layout {
            PackedLayout::Aligned => {
                num_entries.div_ceil((u64::BITS / bits_per_entry as u32) as usize)
            }
            PackedLayout::Spanning => (num_entries * bits_per_entry as usize).div_ceil(64),
        }
    }
}

impl PackedArray {
    /// [`None`] if the entry width is outside `1..=64` or `packed` is too
    /// short for `num_entries`.
    pub fn from_inner(
        layout: PackedLayout,
        packed: Box<[u64]>,
        bits_per_entry: u8,
        num_entries: usize,
    ) -> Option<Self> {
        if !(1..=64).contains(&bits_per_entry)
            || packed.len() < PackedArray::packed_size(layout, bits_per_entry, num_entries)
        {
            return None;
        }
        Some(Self {
            layout,
            bits_per_entry,
            num_entries,
            entry_mask: u64::MAX >> (64 - bits_per_entry as u32),
            packed,
        })
    }

    /// # Panics
    /// If `bits_per_entry` is outside `1..=64`.
    pub fn new(layout: PackedLayout, bits_per_entry: u8, num_entries: usize) -> Self {
        assert!((1..=64).contains(&bits_per_entry));
        Self {
            layout,
            bits_per_entry,
            num_entries,
            entry_mask: u64::MAX >> (64 - bits_per_entry as u32),
            packed: vec![0; PackedArray::packed_size(layout, bits_per_entry, num_entries)]
                .into_boxed_slice(),
        }
    }

    pub fn layout(&self) -> PackedLayout {
        self.layout
    }

    pub fn bits(&self) -> u8 {
        self.bits_per_entry
    }

    pub fn len(&self) -> usize {
        self.num_entries
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    pub fn into_inner(self) -> Box<[u64]> {
        self.packed
    }

    /// Long index and bit offset of an entry.
    fn index_offset(&self, index: usize) -> (usize, u32) {
        match self.layout {
            PackedLayout::Aligned => {
                let entries_per_long = 64 / self.bits_per_entry as usize;
                (
                    index / entries_per_long,
                    ((index % entries_per_long) * self.bits_per_entry as usize) as u32,
                )
            }
            PackedLayout::Spanning => {
                let bit = index * self.bits_per_entry as usize;
                (bit / 64, (bit % 64) as u32)
            }
        }
    }

    fn spills(&self, offset: u32) -> bool {
        self.layout == PackedLayout::Spanning && offset + self.bits_per_entry as u32 > 64
    }

    pub fn set(&mut self, index: usize, value: u64) {
        if index >= self.num_entries || value > self.entry_mask {
            return;
        }
        let (long, offset) = self.index_offset(index);
        self.packed[long] &= !(self.entry_mask << offset);
        self.packed[long] |= value << offset;
        if self.spills(offset) {
            let shift = 64 - offset;
            self.packed[long + 1] &= !(self.entry_mask >> shift);
            self.packed[long + 1] |= value >> shift;
        }
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        if index >= self.num_entries {
            return None;
        }
        let (long, offset) = self.index_offset(index);
        let mut value = self.packed[long] >> offset;
        if self.spills(offset) {
            value |= self.packed[long + 1] << (64 - offset);
        }
        Some(value & self.entry_mask)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.num_entries).filter_map(|i| self.get(i))
    }

    /// Copies every entry into a new array using `layout`.
    pub fn repack(&self, layout: PackedLayout) -> PackedArray {
        let mut repacked = PackedArray::new(layout, self.bits_per_entry, self.num_entries);
        self.iter()
            .enumerate()
            .for_each(|(i, v)| repacked.set(i, v));
        repacked
    }
}
