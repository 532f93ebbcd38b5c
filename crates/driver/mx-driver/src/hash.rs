//! Content hashes for cache keys

use mx_macro::CallContext;
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::fmt;

/// SHA-256 of length-prefixed parts
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hashes `parts`; the length prefix keeps `("ab", "c")` and
    /// `("a", "bc")` apart
    pub fn of(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(formatter, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "ContentHash({self})")
    }
}

/// Identity of a definition's text
pub fn def_hash(source: &str, krate: &str) -> ContentHash {
    ContentHash::of(&[b"def", source.as_bytes(), krate.as_bytes()])
}

/// Key of the shared content cache: everything the expansion depends on
pub fn content_key(source: &str, krate: &str, body: &str, context: CallContext) -> ContentHash {
    ContentHash::of(&[
        b"content",
        source.as_bytes(),
        krate.as_bytes(),
        body.as_bytes(),
        context.as_str().as_bytes(),
    ])
}

/// Identity of one call as written at its site
pub fn call_hash(path: &str, body: &str, context: CallContext, offset: u32) -> ContentHash {
    ContentHash::of(&[
        b"call",
        path.as_bytes(),
        body.as_bytes(),
        context.as_str().as_bytes(),
        &offset.to_le_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_are_length_prefixed() {
        assert_ne!(ContentHash::of(&[b"ab", b"c"]), ContentHash::of(&[b"a", b"bc"]));
        assert_eq!(ContentHash::of(&[b"ab", b"c"]), ContentHash::of(&[b"ab", b"c"]));
    }

    #[test]
    fn test_call_hash_tracks_offset_but_content_key_does_not() {
        let first = call_hash("m", "aaa", CallContext::Item, 10);
        let moved = call_hash("m", "aaa", CallContext::Item, 14);
        assert_ne!(first, moved);
        assert_eq!(
            content_key("def", "demo", "aaa", CallContext::Item),
            content_key("def", "demo", "aaa", CallContext::Item)
        );
        assert_ne!(
            content_key("def", "demo", "aaa", CallContext::Item),
            content_key("def", "demo", "aab", CallContext::Item)
        );
        assert_eq!(def_hash("def", "demo").to_string().len(), 16);
    }
}
