//! Frontmatter extraction and the process-global frontmatter cache.
//!
//! Async doc collections only need the YAML header of each document, so the
//! generator reads headers through [`FRONTMATTER_CACHE`] instead of
//! re-parsing whole files. The cache also tracks whether any header was
//! requested during the current generation pass; the watcher uses that flag
//! to skip regeneration for content edits that cannot change generated
//! output.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, LazyLock,
    },
};

use parking_lot::RwLock;

use crate::error::Issue;

// ============================================================================
// Extraction
// ============================================================================

/// Split a document into its raw YAML header and body.
///
/// The header is delimited by a `---` line at the very start of the document
/// and a closing `---` line. Documents without a header return `None` and
/// the full source as body.
pub fn split_frontmatter(source: &str) -> (Option<&str>, &str) {
    let rest = match source.strip_prefix("---") {
        Some(rest) => rest,
        None => return (None, source),
    };
    // The opening fence must be the whole first line.
    let rest = match rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) {
        Some(rest) => rest,
        None => return (None, source),
    };

    for (offset, _) in rest.match_indices("---") {
        let line_start = offset == 0 || rest[..offset].ends_with('\n');
        if !line_start {
            continue;
        }
        let after = &rest[offset + 3..];
        let body = match after.strip_prefix("\r\n").or_else(|| after.strip_prefix('\n')) {
            Some(body) => body,
            None if after.is_empty() => "",
            None => continue,
        };
        return (Some(&rest[..offset]), body);
    }

    (None, source)
}

/// Parse a raw YAML header into JSON. Empty or null headers become an empty
/// object so downstream consumers always see a map.
pub fn parse_frontmatter(raw: Option<&str>) -> Result<Value, Vec<Issue>> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    let parsed: Value = serde_yaml_ng::from_str(raw)
        .map_err(|e| vec![Issue::new(None, format!("invalid YAML header: {e}"))])?;
    match parsed {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(parsed),
        other => Err(vec![Issue::new(
            None,
            format!("header must be a map, found {}", json_type_name(&other)),
        )]),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

// ============================================================================
// Cache
// ============================================================================

pub static FRONTMATTER_CACHE: LazyLock<FrontmatterCache> =
    LazyLock::new(FrontmatterCache::new);

/// Absolute-path keyed cache of parsed document headers.
pub struct FrontmatterCache {
    entries: RwLock<FxHashMap<PathBuf, Arc<Value>>>,
    used: AtomicBool,
}

impl FrontmatterCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            used: AtomicBool::new(false),
        }
    }

    /// Header of `path`, read from cache or disk.
    ///
    /// Every call marks the cache as used for the current pass, so the
    /// watcher knows generated output depends on document headers.
    pub fn get(&self, path: &Path) -> Result<Arc<Value>, std::io::Error> {
        self.used.store(true, Ordering::Relaxed);

        if let Some(cached) = self.entries.read().get(path) {
            return Ok(cached.clone());
        }

        let source = fs::read_to_string(path)?;
        let (raw, _) = split_frontmatter(&source);
        // An unparsable header is cached as an empty map; the per-file
        // transform reports the real error with its issue list.
        let value = parse_frontmatter(raw).unwrap_or_else(|_| Value::Object(Default::default()));
        let value = Arc::new(value);
        self.entries
            .write()
            .insert(path.to_path_buf(), value.clone());
        Ok(value)
    }

    /// Drop the cached header of one file.
    pub fn invalidate(&self, path: &Path) {
        self.entries.write().remove(path);
    }

    /// Start a generation pass with a clean usage flag.
    pub fn begin_pass(&self) {
        self.used.store(false, Ordering::Relaxed);
    }

    /// Whether any header was requested since [`Self::begin_pass`].
    pub fn frontmatter_used(&self) -> bool {
        self.used.load(Ordering::Relaxed)
    }
}

impl Default for FrontmatterCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_split_with_header() {
        let source = "---\ntitle: Hello\n---\n# Body\n";
        let (raw, body) = split_frontmatter(source);
        assert_eq!(raw, Some("title: Hello\n"));
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn test_split_without_header() {
        let source = "# Just a body\n";
        let (raw, body) = split_frontmatter(source);
        assert_eq!(raw, None);
        assert_eq!(body, source);
    }

    #[test]
    fn test_split_unclosed_header() {
        let source = "---\ntitle: Hello\n# never closed\n";
        let (raw, body) = split_frontmatter(source);
        assert_eq!(raw, None);
        assert_eq!(body, source);
    }

    #[test]
    fn test_split_crlf() {
        let source = "---\r\ntitle: Hello\r\n---\r\nbody\r\n";
        let (raw, body) = split_frontmatter(source);
        assert_eq!(raw, Some("title: Hello\r\n"));
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn test_split_dashes_inside_body() {
        let source = "# Body\n---\nrule\n";
        let (raw, _) = split_frontmatter(source);
        assert_eq!(raw, None);
    }

    #[test]
    fn test_split_header_at_eof() {
        let source = "---\ntitle: Hello\n---";
        let (raw, body) = split_frontmatter(source);
        assert_eq!(raw, Some("title: Hello\n"));
        assert_eq!(body, "");
    }

    #[test]
    fn test_parse_empty_header_is_object() {
        assert_eq!(
            parse_frontmatter(None).unwrap(),
            Value::Object(Default::default())
        );
        assert_eq!(
            parse_frontmatter(Some("")).unwrap(),
            Value::Object(Default::default())
        );
    }

    #[test]
    fn test_parse_non_map_header_rejected() {
        let issues = parse_frontmatter(Some("- a\n- b\n")).unwrap_err();
        assert!(issues[0].message.contains("must be a map"));
    }

    #[test]
    fn test_cache_hit_skips_disk() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("doc.mdx");
        fs::write(&file, "---\ntitle: Cached\n---\nbody\n").unwrap();

        let cache = FrontmatterCache::new();
        let first = cache.get(&file).unwrap();
        assert_eq!(first["title"], "Cached");

        // A hit must not touch the filesystem.
        fs::remove_file(&file).unwrap();
        let second = cache.get(&file).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalidate_is_scoped_to_one_file() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.mdx");
        let b = tmp.path().join("b.mdx");
        fs::write(&a, "---\ntitle: A\n---\n").unwrap();
        fs::write(&b, "---\ntitle: B\n---\n").unwrap();

        let cache = FrontmatterCache::new();
        cache.get(&a).unwrap();
        let b_first = cache.get(&b).unwrap();

        cache.invalidate(&a);
        fs::write(&a, "---\ntitle: A2\n---\n").unwrap();

        assert_eq!(cache.get(&a).unwrap()["title"], "A2");
        assert!(Arc::ptr_eq(&b_first, &cache.get(&b).unwrap()));
    }

    #[test]
    fn test_usage_flag_tracks_passes() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("doc.mdx");
        fs::write(&file, "---\ntitle: T\n---\n").unwrap();

        let cache = FrontmatterCache::new();
        cache.begin_pass();
        assert!(!cache.frontmatter_used());

        cache.get(&file).unwrap();
        assert!(cache.frontmatter_used());

        cache.begin_pass();
        assert!(!cache.frontmatter_used());

        // A cache hit still counts as usage.
        cache.get(&file).unwrap();
        assert!(cache.frontmatter_used());
    }
}
