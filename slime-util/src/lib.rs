pub mod bitset;
pub mod nbt;
pub mod nibble_array;
pub mod packed_array;
pub mod read_ext;

pub use bitset::{BitSet, FixedBitSet};
pub use nibble_array::NibbleArray;
pub use packed_array::{PackedArray, PackedLayout};
pub use read_ext::{ReadExt, WriteExt};
