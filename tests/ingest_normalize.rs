// tests/ingest_normalize.rs
use chrono::{TimeZone, Utc};
use daily_digest::fingerprint::fingerprint_fields;
use daily_digest::ingest::normalize_text;
use daily_digest::{fingerprint, Item};

fn item(title: &str, link: &str, description: &str) -> Item {
    Item {
        source_id: "s".into(),
        title: title.into(),
        link: link.into(),
        description: description.into(),
        confidence: 0.9,
        extracted_at: Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap(),
        published_at: None,
    }
}

#[test]
fn empty_is_ok() {
    assert_eq!(normalize_text(""), "");
    // Empty content is still an identity.
    let a = fingerprint(&item("", "", ""));
    let b = fingerprint(&item("", "", ""));
    assert_eq!(a, b);
}

#[test]
fn repeated_calls_are_stable() {
    let it = item("Release notes", "https://x.test/r", "All the changes");
    assert_eq!(fingerprint(&it), fingerprint(&it));
    assert_eq!(fingerprint(&it), fingerprint(&it.clone()));
}

#[test]
fn run_time_does_not_matter() {
    let a = item("T", "http://a", "d");
    let mut b = a.clone();
    b.extracted_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    b.confidence = 0.1;
    b.source_id = "other".into();
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn description_change_changes_fingerprint() {
    let a = item("T", "http://a", "first version");
    let b = item("T", "http://a", "second version");
    assert_ne!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn whitespace_only_change_keeps_fingerprint() {
    let a = item("Big  news\ttoday", "http://a", "line one\nline two");
    let b = item(" Big news today ", "http://a", "line one line two");
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn link_variants_collapse() {
    let base = fingerprint_fields("T", "https://site.test/post", "");
    for variant in [
        "https://site.test/post/",
        "HTTPS://SITE.TEST/post",
        "https://site.test/post#comments",
        " https://site.test/post ",
    ] {
        assert_eq!(fingerprint_fields("T", variant, ""), base, "variant {variant}");
    }
    assert_ne!(fingerprint_fields("T", "https://site.test/other", ""), base);
}

#[test]
fn entity_variance_collapses() {
    assert_eq!(
        fingerprint_fields("Tom &amp; Jerry", "http://a", "&lt;b&gt;x&lt;/b&gt;"),
        fingerprint_fields("Tom & Jerry", "http://a", "<b>x</b>")
    );
}

#[test]
fn angle_brackets_in_text_are_content() {
    assert_ne!(
        fingerprint_fields("C", "http://a", "A HashMap<K, V>"),
        fingerprint_fields("C", "http://a", "A HashMap<K>")
    );
    assert_ne!(
        fingerprint_fields("C", "http://a", "Fast Vec<T> for x"),
        fingerprint_fields("C", "http://a", "Fast Vec<U> for x")
    );
    // Real markup is still noise.
    assert_eq!(
        fingerprint_fields("C", "http://a", "<p>Fast <code>Vec</code></p>"),
        fingerprint_fields("C", "http://a", "Fast Vec")
    );
}
