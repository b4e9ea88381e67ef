// src/fingerprint.rs
//! Content identity for items.
//!
//! A fingerprint is the hex SHA-256 of `title`, `link` and `description`
//! after normalization, joined with U+001F so field boundaries cannot alias.
//! Cosmetic extraction noise (entities, tags, whitespace, link case,
//! trailing slash, fragment) does not change it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::ingest::types::Item;
use crate::ingest::{normalize_link, normalize_text};

const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical text that gets hashed.
fn canonical_form(title: &str, link: &str, description: &str) -> String {
    let mut out = normalize_text(title);
    out.push(FIELD_SEP);
    out.push_str(&normalize_link(link));
    out.push(FIELD_SEP);
    out.push_str(&normalize_text(description));
    out
}

pub fn fingerprint_fields(title: &str, link: &str, description: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(title, link, description).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Fingerprint(out)
}

pub fn fingerprint(item: &Item) -> Fingerprint {
    fingerprint_fields(&item.title, &item.link, &item.description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_sha256_shape() {
        let fp = fingerprint_fields("", "", "");
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn field_boundaries_do_not_alias() {
        assert_ne!(fingerprint_fields("ab", "", "c"), fingerprint_fields("a", "", "bc"));
        assert_ne!(fingerprint_fields("a", "b", ""), fingerprint_fields("a", "", "b"));
    }

    #[test]
    fn cosmetic_noise_is_ignored() {
        let a = fingerprint_fields("Rust  1.90\nreleased", "https://blog.test/post/", "<p>Fast &amp; safe</p>");
        let b = fingerprint_fields("Rust 1.90 released", "HTTPS://blog.test/post", "Fast & safe");
        assert_eq!(a, b);
    }

    #[test]
    fn title_case_is_content() {
        assert_ne!(fingerprint_fields("US", "http://a", ""), fingerprint_fields("us", "http://a", ""));
    }
}
