//! Bloom filter of already-known node ids carried by find-nodes requests.
//!
//! A responder skips every candidate the filter reports as known, so the
//! filter only ever trims responses; a false positive costs one omitted node.

use std::io::Cursor;

use bitvec::prelude::*;

/// Filter size used on the wire, in bits.
pub const FIND_NODES_BLOOM_BITS: usize = 4096;

/// Hash functions per element.
pub const FIND_NODES_BLOOM_HASHES: usize = 11;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    k: usize,
}

impl BloomFilter {
    /// Create an empty filter of `m` bits and `k` hash functions.
    pub fn new(m: usize, k: usize) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; m.max(8)],
            k: k.max(1),
        }
    }

    /// Empty filter with the find-nodes parameters.
    pub fn for_find_nodes() -> Self {
        Self::new(FIND_NODES_BLOOM_BITS, FIND_NODES_BLOOM_HASHES)
    }

    /// Rebuild a filter from its raw bytes.
    ///
    /// An empty slice yields `None`; callers treat that as "nothing known".
    pub fn from_bytes(bytes: &[u8], k: usize) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Some(Self {
            bits: BitVec::from_vec(bytes.to_vec()),
            k: k.max(1),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.as_raw_slice().to_vec()
    }

    pub fn insert(&mut self, element: &[u8]) {
        for pos in hash_positions(element, self.k, self.bits.len()) {
            self.bits.set(pos, true);
        }
    }

    /// `false` means definitely not inserted.
    pub fn contains(&self, element: &[u8]) -> bool {
        hash_positions(element, self.k, self.bits.len())
            .into_iter()
            .all(|pos| self.bits[pos])
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }
}

fn murmur_hash(element: &[u8], seed: u32) -> u64 {
    let mut cursor = Cursor::new(element);
    murmur3::murmur3_x64_128(&mut cursor, seed).unwrap_or(0) as u64
}

/// Double hashing: `h(i) = h1 + i * h2 mod m`.
fn hash_positions(element: &[u8], k: usize, m: usize) -> Vec<usize> {
    let h1 = murmur_hash(element, 0);
    let h2 = murmur_hash(element, 1);
    (0..k)
        .map(|i| {
            let hash = h1.wrapping_add((i as u64).wrapping_mul(h2));
            (hash % m as u64) as usize
        })
        .collect()
}
