// Content fingerprinting for fast equality tests between captures.
use md5::{Digest, Md5};

/// 128-bit hex digest of the normalized full text. Deterministic and
/// content-only; collisions are accepted at MD5-class risk since the hash
/// is only used as an equality shortcut.
pub fn fingerprint(full_text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(full_text.as_bytes());
    format!("{:x}", hasher.finalize())
}
