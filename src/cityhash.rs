//! Stable 64-bit hash used by the handle codec ([`crate::handle`]) and the
//! pseudo-filesystem's node ids ([`crate::pseudofs`]).
//!
//! Not Google's CityHash bit-for-bit; a fixed-seed multiplicative mix with a
//! final avalanche round, chosen only for being cheap, deterministic for the
//! lifetime of one process, and collision-resistant enough for handle and
//! pseudo-path identification (spec invariant: pseudofs node ids are stable
//! within one process lifetime and collision-resistant across one export
//! configuration, not across processes or time).

const SEED: u64 = 0x9E37_79B9_7F4A_7C15;
const PRIME: u64 = 0x1000_0000_01B3;

/// Hashes an arbitrary byte string to a stable 64-bit value.
pub fn city_hash64(bytes: &[u8]) -> u64 {
    let mut h = SEED ^ (bytes.len() as u64).wrapping_mul(PRIME);

    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        let word = u64::from_le_bytes(chunk.try_into().unwrap());
        h ^= mix(word);
        h = h.wrapping_mul(PRIME);
    }

    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut buf = [0u8; 8];
        buf[..rem.len()].copy_from_slice(rem);
        h ^= mix(u64::from_le_bytes(buf));
        h = h.wrapping_mul(PRIME);
    }

    avalanche(h)
}

fn mix(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    x
}

fn avalanche(mut x: u64) -> u64 {
    x ^= x >> 29;
    x = x.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    x ^= x >> 32;
    x
}
