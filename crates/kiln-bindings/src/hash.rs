//! Jenkins one-at-a-time hash used to bucket member names

/// Hash a byte string with Jenkins' one-at-a-time function
pub const fn joaat(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        hash = hash.wrapping_add(bytes[i] as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
        i += 1;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}
