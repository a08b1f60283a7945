//! Fixed-width set of operation indices

use std::hash::{Hash, Hasher};

/// Set of linearized operations, one bit per operation in a partition
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    /// Create an empty set able to hold `bits` members
    pub fn new(bits: usize) -> Self {
        Bitset {
            words: vec![0; bits.div_ceil(64)],
        }
    }

    pub fn set(&mut self, pos: usize) {
        self.words[pos / 64] |= 1u64 << (pos % 64);
    }

    pub fn clear(&mut self, pos: usize) {
        self.words[pos / 64] &= !(1u64 << (pos % 64));
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.words[pos / 64] & (1u64 << (pos % 64)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Hash used to bucket memo entries
    pub fn hash_value(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
