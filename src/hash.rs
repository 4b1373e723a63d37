use sha2::{Digest as _, Sha256};

/// SHA-256 digest of a canvas's raw pixel bytes (plus optional metadata),
/// rendered as 64 lowercase hex chars in the cache file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn new(bytes: [u8; 32]) -> ContentHash {
        ContentHash(bytes)
    }

    pub fn digest(data: &[u8]) -> ContentHash {
        ContentHash(Sha256::digest(data).into())
    }

    pub fn parse(s: &str) -> Option<ContentHash> {
        if s.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let hi = hex_value(chunk[0])?;
            let lo = hex_value(chunk[1])?;
            out[i] = (hi << 4) | lo;
        }
        Some(ContentHash(out))
    }
}

/// Lowercase only; the cache format is defined over `[0-9a-f]`.
fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({self})")
    }
}
