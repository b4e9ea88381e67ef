// src/ingest/mod.rs
//! Extraction boundary: text normalization shared with fingerprinting, and
//! validation of raw extractor records into `Item`s.
pub mod providers;
pub mod types;

use crate::error::PipelineError;
use crate::ingest::types::{Item, RawItem};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

/// Confidence assumed when the extractor does not report one.
pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_items_extracted_total",
            "Records returned by extractors."
        );
        describe_counter!(
            "digest_items_malformed_total",
            "Records dropped by boundary validation."
        );
        describe_counter!("digest_items_new_total", "Items accepted as new.");
        describe_counter!(
            "digest_items_seen_total",
            "Items dropped because their fingerprint was already recorded."
        );
        describe_counter!(
            "digest_items_low_confidence_total",
            "Items below the source's minimum confidence."
        );
        describe_counter!(
            "digest_items_stale_total",
            "Items older than the source's maximum age."
        );
        describe_counter!(
            "digest_items_duplicate_total",
            "Items repeating a fingerprint within the same batch."
        );
        describe_counter!(
            "digest_extraction_errors_total",
            "Sources whose extraction failed, timed out or came back empty."
        );
        describe_counter!(
            "digest_state_corrupt_total",
            "State files that could not be read back and were reset."
        );
        describe_counter!(
            "digest_state_persist_failures_total",
            "State saves that failed after a digest was written."
        );
        describe_counter!("digest_runs_total", "Completed pipeline runs.");
        describe_histogram!("digest_extract_ms", "Extraction time in milliseconds.");
        describe_histogram!("digest_rss_parse_ms", "RSS parse time in milliseconds.");
        describe_gauge!("digest_last_run_ts", "Unix ts when the pipeline last ran.");
    });
}

/// Normalize free text: decode entities, strip tags, fold whitespace, trim.
/// Case and punctuation are kept; they can carry meaning.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip known HTML tags only; `Vec<T>` or `HashMap<K, V>` is text.
    // Single-letter tags must be lowercase so generic parameters survive.
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| {
        regex::Regex::new(concat!(
            r"</?(?:(?i:abbr|article|aside|big|blockquote|br|center|cite|code|dd|del|div|dl|dt|",
            r"em|figcaption|figure|font|footer|h[1-6]|header|hr|img|ins|kbd|li|mark|nav|ol|",
            r"pre|section|small|span|strike|strong|sub|sup|table|tbody|td|th|thead|time|tr|",
            r"tt|ul)|[abipqsu])(?:\s[^>]*)?/?>"
        ))
        .unwrap()
    });
    let out = re_tags.replace_all(&out, " ");

    // 3) Collapse whitespace (includes NBSP)
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a link for identity purposes: `HTTP://A.com/x/#top` == `http://a.com/x`.
pub fn normalize_link(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s.trim()).to_string();
    let mut out = decoded.trim().to_lowercase();
    if let Some(idx) = out.find('#') {
        out.truncate(idx);
    }
    while out.ends_with('/') {
        out.pop();
    }
    out
}

/// Repair the link shapes extractors commonly emit. Relative paths have no
/// host to resolve against and are rejected.
fn repair_link(link: &str) -> Result<String, String> {
    if link.starts_with("http://") || link.starts_with("https://") {
        Ok(link.to_string())
    } else if let Some(rest) = link.strip_prefix("//") {
        Ok(format!("https://{rest}"))
    } else if link.starts_with('/') {
        Err(format!("relative link `{link}`"))
    } else if link.contains("://") {
        Err(format!("unsupported scheme in `{link}`"))
    } else {
        Ok(format!("https://{link}"))
    }
}

/// Parse the timestamp shapes seen in extractor output:
/// RFC 3339, RFC 2822, naive ISO 8601 (taken as UTC) and bare dates.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Turn one raw record into an `Item`, or explain why it is malformed.
pub fn validate_item(
    source_id: &str,
    raw: RawItem,
    now: DateTime<Utc>,
) -> Result<Item, PipelineError> {
    let malformed = |reason: String| PipelineError::MalformedItem {
        source_id: source_id.to_string(),
        reason,
    };

    // Titles render inside a single Markdown line.
    let title = raw
        .title
        .as_deref()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if title.is_empty() {
        return Err(malformed("missing title".into()));
    }
    let link = raw.link.as_deref().map(str::trim).unwrap_or_default();
    if link.is_empty() {
        return Err(malformed(format!("missing link for `{title}`")));
    }
    if link.chars().any(char::is_whitespace) {
        return Err(malformed(format!("whitespace in link `{link}`")));
    }
    let link = repair_link(link).map_err(malformed)?;

    let confidence = match raw.confidence {
        None => DEFAULT_CONFIDENCE,
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0) as f32,
        Some(c) => return Err(malformed(format!("non-finite confidence {c}"))),
    };

    let published_at = raw.published_at.as_deref().and_then(parse_timestamp);
    let extracted_at = raw
        .extracted_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now);

    Ok(Item {
        source_id: source_id.to_string(),
        title,
        link,
        description: raw.description.unwrap_or_default().trim().to_string(),
        confidence,
        extracted_at,
        published_at,
    })
}

/// Validate a batch, keeping extraction order. Returns (items, malformed count).
pub fn validate_batch(
    source_id: &str,
    raw: Vec<RawItem>,
    now: DateTime<Utc>,
) -> (Vec<Item>, usize) {
    let mut malformed = 0usize;
    let mut items = Vec::with_capacity(raw.len());
    for r in raw {
        match validate_item(source_id, r, now) {
            Ok(it) => items.push(it),
            Err(e) => {
                tracing::warn!(target: "extract", source = source_id, error = %e, "dropping record");
                malformed += 1;
            }
        }
    }
    (items, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn normalize_text_folds_ws_and_entities() {
        let s = "  <b>Hello</b>&nbsp;&nbsp;\n world!  ";
        assert_eq!(normalize_text(s), "Hello world!");
    }

    #[test]
    fn normalize_text_keeps_generic_types() {
        assert_eq!(normalize_text("Fast Vec<T> for x"), "Fast Vec<T> for x");
        assert_eq!(normalize_text("A HashMap<K, V>"), "A HashMap<K, V>");
        assert_eq!(normalize_text("Option<String> &lt;br/&gt;"), "Option<String>");
        assert_eq!(
            normalize_text(r#"<DIV class="x">Box<I></DIV>"#),
            "Box<I>"
        );
    }

    #[test]
    fn titles_fold_to_one_line_and_spaced_links_are_rejected() {
        let it = validate_item("s", RawItem::new("Big\n\n## news", "https://a.test"), now()).unwrap();
        assert_eq!(it.title, "Big ## news");
        assert!(validate_item("s", RawItem::new("T", "https://a.test/my post"), now()).is_err());
        assert!(validate_item("s", RawItem::new("T", "https://a.test/\nx"), now()).is_err());
    }

    #[test]
    fn normalize_link_ignores_case_slash_and_fragment() {
        assert_eq!(normalize_link(" HTTP://Example.com/a/#x "), "http://example.com/a");
        assert_eq!(normalize_link("http://example.com/a?x=1&amp;y=2"), "http://example.com/a?x=1&y=2");
    }

    #[test]
    fn links_are_repaired_or_rejected() {
        let ok = validate_item("s", RawItem::new("T", "//cdn.test/x"), now()).unwrap();
        assert_eq!(ok.link, "https://cdn.test/x");
        let bare = validate_item("s", RawItem::new("T", "example.com"), now()).unwrap();
        assert_eq!(bare.link, "https://example.com");
        assert!(validate_item("s", RawItem::new("T", "/relative"), now()).is_err());
        assert!(validate_item("s", RawItem::new("T", "ftp://x"), now()).is_err());
    }

    #[test]
    fn confidence_defaults_and_clamps() {
        let d = validate_item("s", RawItem::new("T", "http://a"), now()).unwrap();
        assert_eq!(d.confidence, DEFAULT_CONFIDENCE);
        let hi = validate_item("s", RawItem::new("T", "http://a").with_confidence(3.0), now())
            .unwrap();
        assert_eq!(hi.confidence, 1.0);
        let nan = RawItem::new("T", "http://a").with_confidence(f64::NAN);
        assert!(validate_item("s", nan, now()).is_err());
    }

    #[test]
    fn timestamps_in_common_shapes() {
        let want = Utc.with_ymd_and_hms(2025, 9, 5, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-09-05"), Some(want));
        assert_eq!(parse_timestamp("2025-09-05T00:00:00Z"), Some(want));
        assert_eq!(parse_timestamp("2025-09-05T00:00:00.000"), Some(want));
        assert_eq!(parse_timestamp("Fri, 05 Sep 2025 00:00:00 +0000"), Some(want));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn batch_keeps_order_and_counts_malformed() {
        let raw = vec![
            RawItem::new("B", "http://b"),
            RawItem::default(),
            RawItem::new("A", "http://a"),
        ];
        let (items, bad) = validate_batch("s", raw, now());
        assert_eq!(bad, 1);
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["B", "A"]);
    }
}
