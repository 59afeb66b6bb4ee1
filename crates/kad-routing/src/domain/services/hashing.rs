//! Stable 64-bit digest of xids.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

/// Deterministic digest used as the hash-index key.
///
/// Fixed keys keep the value identical across processes and restarts.
pub fn hash64(data: &[u8]) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(data);
    hasher.finish()
}
