use hashbrown::HashSet;
use sha2::{Digest, Sha256};

use crate::decoder;

#[derive(Debug, PartialEq, Eq, Hash)]
enum SeenKey {
    /// First 128 bits of the SHA-256 digest of the trimmed link.
    Content(u128),
    /// `address:port:protocol` of a link that decoded successfully.
    Endpoint(String),
}

fn content_hash(raw: &str) -> u128 {
    let digest = Sha256::digest(raw.trim().as_bytes());
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(head)
}

/// Folds duplicate links using two independent rejection gates: the content
/// hash of the link text and, for links that decode, the endpoint identity.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<SeenKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `raw` and reports whether it is new.
    ///
    /// A link is rejected when its content hash was seen before, or when it
    /// decodes to an `address:port:protocol` that was seen before. Links that
    /// fail to decode are judged on the content hash alone.
    pub fn insert(&mut self, raw: &str) -> bool {
        let content = SeenKey::Content(content_hash(raw));
        if self.seen.contains(&content) {
            return false;
        }

        if let Ok(config) = decoder::decode(raw) {
            let endpoint = SeenKey::Endpoint(config.identity_key());
            if self.seen.contains(&endpoint) {
                return false;
            }
            self.seen.insert(endpoint);
        }
        self.seen.insert(content);
        true
    }

    /// Number of keys recorded so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Removes duplicate links. Output order follows first appearance, although
/// callers must not rely on it.
pub fn dedupe<I, S>(raws: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut deduplicator = Deduplicator::new();
    raws.into_iter()
        .map(Into::into)
        .filter(|raw| deduplicator.insert(raw))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_fold() {
        let raw = "trojan://password123@example.com:443#A";
        assert_eq!(dedupe([raw, raw]).len(), 1);
        let padded = format!("  {}  ", raw);
        assert_eq!(dedupe([raw, padded.as_str()]).len(), 1);
    }

    #[test]
    fn same_endpoint_with_cosmetic_differences_folds() {
        let out = dedupe([
            "vless://aaaaaaaaaaaa@edge.example.com:443?security=tls&type=ws#one",
            "vless://aaaaaaaaaaaa@edge.example.com:443?type=ws&security=tls#two",
            "vless://bbbbbbbbbbbb@EDGE.example.com:443?security=tls#three",
        ]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn distinct_endpoints_survive() {
        let out = dedupe([
            "vless://aaaaaaaaaaaa@edge.example.com:443",
            "vless://aaaaaaaaaaaa@edge.example.com:8443",
            "trojan://aaaaaaaaaaaa@edge.example.com:443",
        ]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn undecodable_links_fold_on_content_only() {
        let out = dedupe(["vless://garbage", "vless://garbage", "vless://other-garbage"]);
        assert_eq!(out, vec!["vless://garbage", "vless://other-garbage"]);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let input = vec![
            "vless://aaaaaaaaaaaa@edge.example.com:443#x",
            "vless://aaaaaaaaaaaa@edge.example.com:443#y",
            "garbage",
            "garbage",
            "trojan://pw@1.2.3.4:443",
        ];
        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }
}
