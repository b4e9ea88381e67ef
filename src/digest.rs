// src/digest.rs
//! Digest assembly and Markdown rendering.
//!
//! Rendering is a pure function of its inputs: the same items, sources and
//! timestamp always produce byte-identical text.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::SourceConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fsio::write_atomic;
use crate::ingest::types::Item;

pub const LATEST_FILE_NAME: &str = "latest.md";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestEntry {
    pub source_name: String,
    pub source_icon: String,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestSection {
    pub source_id: String,
    pub display_name: String,
    pub icon: String,
    pub entries: Vec<DigestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<DigestSection>,
}

impl Digest {
    /// Calendar date (UTC) the digest is named after.
    pub fn date(&self) -> NaiveDate {
        self.generated_at.date_naive()
    }

    pub fn source_count(&self) -> usize {
        self.sections.len()
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &DigestEntry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }

    /// Render as Markdown.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Daily Digest {}", self.date().format("%Y-%m-%d"));

        for section in &self.sections {
            let _ = writeln!(out);
            let _ = writeln!(out, "## {} {}", section.icon, section.display_name);
            for entry in &section.entries {
                let _ = writeln!(out);
                let _ = writeln!(out, "### [{}]({})", entry.item.title, entry.item.link);
                if !entry.item.description.is_empty() {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "{}", entry.item.description);
                }
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "---");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "- Generated at: {}",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(out, "- Sources with new content: {}", self.source_count());
        let _ = writeln!(out, "- New items: {}", self.item_count());
        out
    }
}

/// Build the digest for one run. Sources follow `sources` order; sources
/// without new items are left out.
pub fn generate(
    new_items: &HashMap<String, Vec<Item>>,
    sources: &[SourceConfig],
    generated_at: DateTime<Utc>,
) -> Digest {
    let sections = sources
        .iter()
        .filter_map(|src| {
            let items = new_items.get(&src.id).filter(|v| !v.is_empty())?;
            let entries = items
                .iter()
                .map(|it| DigestEntry {
                    source_name: src.display_name.clone(),
                    source_icon: src.icon.clone(),
                    item: it.clone(),
                })
                .collect();
            Some(DigestSection {
                source_id: src.id.clone(),
                display_name: src.display_name.clone(),
                icon: src.icon.clone(),
                entries,
            })
        })
        .collect();

    Digest {
        generated_at,
        sections,
    }
}

/// File name for the `n`-th digest of `date` (1-based).
pub fn digest_file_name(date: NaiveDate, n: u32) -> String {
    if n <= 1 {
        format!("{}.md", date.format("%Y-%m-%d"))
    } else {
        format!("{}-{n}.md", date.format("%Y-%m-%d"))
    }
}

/// Where rendered digests go.
pub trait DigestSink: Send + Sync {
    /// Durably store the rendered digest; returns where it was written.
    fn write(&self, digest: &Digest, rendered: &str) -> PipelineResult<PathBuf>;
}

/// Writes `<out_dir>/<date>.md` (or the next free `<date>-<n>.md`) plus `latest.md`.
#[derive(Debug, Clone)]
pub struct FileDigestSink {
    out_dir: PathBuf,
}

impl FileDigestSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn next_free_path(&self, date: NaiveDate) -> PathBuf {
        let mut n = 1;
        loop {
            let p = self.out_dir.join(digest_file_name(date, n));
            if !p.exists() {
                return p;
            }
            n += 1;
        }
    }
}

impl DigestSink for FileDigestSink {
    fn write(&self, digest: &Digest, rendered: &str) -> PipelineResult<PathBuf> {
        let path = self.next_free_path(digest.date());
        write_atomic(&path, rendered.as_bytes()).map_err(|source| PipelineError::DigestWrite {
            path: path.clone(),
            source,
        })?;

        // The dated file is the record; `latest.md` is a convenience copy.
        let latest = self.out_dir.join(LATEST_FILE_NAME);
        if let Err(e) = write_atomic(&latest, rendered.as_bytes()) {
            tracing::warn!(target: "pipeline", path = %latest.display(), error = %e, "could not update latest digest");
        }
        Ok(path)
    }
}

/// Keeps rendered digests in memory.
#[derive(Debug, Default)]
pub struct MemoryDigestSink {
    written: Mutex<Vec<(PathBuf, String)>>,
    fail: bool,
}

impl MemoryDigestSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn written(&self) -> Vec<(PathBuf, String)> {
        self.written.lock().expect("sink mutex poisoned").clone()
    }
}

impl DigestSink for MemoryDigestSink {
    fn write(&self, digest: &Digest, rendered: &str) -> PipelineResult<PathBuf> {
        let mut written = self.written.lock().expect("sink mutex poisoned");
        let same_day = written
            .iter()
            .filter(|(p, _)| p.to_string_lossy().starts_with(&digest.date().format("%Y-%m-%d").to_string()))
            .count() as u32;
        let path = PathBuf::from(digest_file_name(digest.date(), same_day + 1));
        if self.fail {
            return Err(PipelineError::DigestWrite {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
            });
        }
        written.push((path.clone(), rendered.to_string()));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 30, 0).unwrap()
    }

    fn item(source: &str, title: &str, desc: &str) -> Item {
        Item {
            source_id: source.into(),
            title: title.into(),
            link: format!("https://example.test/{title}"),
            description: desc.into(),
            confidence: 0.9,
            extracted_at: at(),
            published_at: None,
        }
    }

    #[test]
    fn renders_exact_layout() {
        let mut src = SourceConfig::new("gh", "GitHub Trending");
        src.icon = "⭐".into();
        let mut m = HashMap::new();
        m.insert("gh".to_string(), vec![item("gh", "tokio", "Async runtime."), item("gh", "serde", "")]);

        let text = generate(&m, &[src], at()).render();
        let want = "\
# Daily Digest 2025-09-06

## ⭐ GitHub Trending

### [tokio](https://example.test/tokio)

Async runtime.

### [serde](https://example.test/serde)

---

- Generated at: 2025-09-06T09:30:00Z
- Sources with new content: 1
- New items: 2
";
        assert_eq!(text, want);
    }

    #[test]
    fn file_names_are_dated_and_sequenced() {
        let d = at().date_naive();
        assert_eq!(digest_file_name(d, 1), "2025-09-06.md");
        assert_eq!(digest_file_name(d, 3), "2025-09-06-3.md");
    }

    #[test]
    fn file_sink_never_overwrites_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileDigestSink::new(dir.path());
        let d = Digest {
            generated_at: at(),
            sections: vec![],
        };
        let p1 = sink.write(&d, "first").unwrap();
        let p2 = sink.write(&d, "second").unwrap();
        assert_ne!(p1, p2);
        assert_eq!(std::fs::read_to_string(p1).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(p2).unwrap(), "second");
        let latest = std::fs::read_to_string(dir.path().join(LATEST_FILE_NAME)).unwrap();
        assert_eq!(latest, "second");
    }
}
