//! Deterministic string hashing for bucketing.
//!
//! The hash must be identical across runs, platforms and releases, so the
//! standard library's randomly seeded hasher is never used here.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a followed by the murmur3 finaliser, so that keys differing
/// only in their last byte still land far apart.
pub fn stable_hash(key: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    fmix32(hash)
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Reduce a key to a bucket in `[0, 100)` with two decimals of resolution.
pub fn bucket_percent(key: &str) -> f64 {
    (stable_hash(key) % 10_000) as f64 / 100.0
}
