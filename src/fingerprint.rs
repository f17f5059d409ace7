/// Bytes of the digest that feed the key.
const DIGEST_PREFIX_LEN: usize = 8;

/// Derives the short key for `url` under a disambiguation `salt`.
///
/// The BLAKE3 digest of `url ++ salt` is truncated to its first 64 bits,
/// read as a big-endian signed integer, and the magnitude of that integer
/// is base-62 encoded (`0-9a-zA-Z`). The same `(url, salt)` always yields
/// the same key; this is a lookup key, not a capability token.
#[must_use]
pub fn fingerprint(url: &str, salt: &str) -> String {
    let hash = blake3::Hasher::new()
        .update(url.as_bytes())
        .update(salt.as_bytes())
        .finalize();

    let mut prefix = [0; DIGEST_PREFIX_LEN];
    prefix.copy_from_slice(&hash.as_bytes()[..DIGEST_PREFIX_LEN]);

    // NOTE: unsigned_abs so that i64::MIN maps to 2^63 instead of overflowing
    encode_key(i64::from_be_bytes(prefix).unsigned_abs())
}

/// Zero encodes to `"0"`, never to an empty key.
fn encode_key(value: u64) -> String {
    base62::encode_alternative(value)
}
