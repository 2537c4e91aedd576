use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Check a WeChat callback signature.
///
/// The platform signs every callback by lexicographically sorting the shared
/// token, the timestamp and the nonce, concatenating them with no separator,
/// and hex-encoding the SHA-1 digest. Comparison is case-sensitive and
/// constant-time. No freshness window is applied to the timestamp: a captured
/// valid signature stays replayable (known limitation of the scheme, kept
/// as-is).
pub fn verify(token: &str, timestamp: &str, nonce: &str, signature: &str) -> bool {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();

    let mut sha = Sha1::new();
    sha.update(parts.concat());
    let expected = hex::encode(sha.finalize());

    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
