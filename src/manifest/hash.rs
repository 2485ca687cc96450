//! Manifest fingerprint using blake3.
//!
//! The fingerprint only covers the chunk membership table and the kernel,
//! so rebuilding without source changes yields the same value even though
//! the version moves forward.

use std::collections::BTreeMap;

/// A 256-bit fingerprint (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of a kernel list and chunk table.
    ///
    /// Both are hashed through their JSON encoding; `BTreeMap` and the
    /// sorted kernel keep the encoding stable across builds.
    pub fn of_table(kernel: Option<&[String]>, chunks: &BTreeMap<String, Vec<String>>) -> Self {
        let mut hasher = blake3::Hasher::new();
        if let Some(kernel) = kernel {
            // Vec<String> always serializes
            hasher.update(serde_json::to_string(kernel).unwrap_or_default().as_bytes());
        }
        hasher.update(serde_json::to_string(chunks).unwrap_or_default().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Convert to hex string (the manifest's `hash` field).
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse a manifest `hash` field. Other publishers may use any string,
    /// so this is `None` for anything but 64 hex digits.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display first 16 chars of hex for brevity
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_same_table_same_fingerprint() {
        let a = table(&[("a.js", &["a.ts"]), ("b.js", &["b.ts"])]);
        let b = table(&[("b.js", &["b.ts"]), ("a.js", &["a.ts"])]);
        assert_eq!(Fingerprint::of_table(None, &a), Fingerprint::of_table(None, &b));
    }

    #[test]
    fn test_membership_change_changes_fingerprint() {
        let a = table(&[("a.js", &["a.ts"])]);
        let b = table(&[("a.js", &["a.ts", "z.ts"])]);
        assert_ne!(Fingerprint::of_table(None, &a), Fingerprint::of_table(None, &b));
    }

    #[test]
    fn test_kernel_participates() {
        let chunks = table(&[("a.js", &["a.ts"])]);
        let kernel = vec!["rt.js".to_string()];
        assert_ne!(
            Fingerprint::of_table(None, &chunks),
            Fingerprint::of_table(Some(&kernel), &chunks)
        );
    }

    #[test]
    fn test_hex_roundtrip_and_display() {
        let fp = Fingerprint::of_table(None, &BTreeMap::new());
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Fingerprint::from_hex(&hex), Some(fp));
        assert_eq!(fp.to_string().len(), 16);
        assert_eq!(Fingerprint::from_hex("abcd"), None);
    }
}
