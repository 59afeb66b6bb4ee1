//! Kademlia distance calculations.

use crate::domain::{NodeId, NODE_ID_BITS, NODE_ID_SIZE};

/// Byte-wise XOR of two identifiers.
///
/// Comparing the results lexicographically orders nodes by distance.
pub fn xor_distance(a: &NodeId, b: &NodeId) -> [u8; NODE_ID_SIZE] {
    let mut out = [0u8; NODE_ID_SIZE];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a.0[i] ^ b.0[i];
    }
    out
}

/// Bucket a remote node falls into relative to the local node.
///
/// # Returns
/// `NODE_ID_BITS - offset_of_first_differing_bit`, so the range is
/// `1..=256` for distinct ids: 256 when the very first bit differs (farthest
/// half of the space), 1 when only the last bit differs. Identical ids give 0.
pub fn bucket_index(local: &NodeId, remote: &NodeId) -> u32 {
    for i in 0..NODE_ID_SIZE {
        let xor = local.0[i] ^ remote.0[i];
        if xor != 0 {
            let offset = i * 8 + xor.leading_zeros() as usize;
            return (NODE_ID_BITS - offset) as u32;
        }
    }
    0
}

/// True iff `a` is strictly closer to `target` than `b` under XOR.
///
/// Ties (`a == b`) are not closer.
pub fn closer_to_target(a: &NodeId, b: &NodeId, target: &NodeId) -> bool {
    for i in 0..NODE_ID_SIZE {
        let da = a.0[i] ^ target.0[i];
        let db = b.0[i] ^ target.0[i];
        if da != db {
            return da < db;
        }
    }
    false
}
