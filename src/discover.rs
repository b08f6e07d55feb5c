//! File discovery and classification.
//!
//! Expands a collection's include/exclude globs over its declared
//! directories, classifies every match as `doc` or `meta` by extension, and
//! returns the deduplicated file set.
//!
//! The result is order-insensitive: directories are scanned concurrently and
//! a file matched from two directories keeps the last-scanned entry. Callers
//! that need stable output (the code generator) must sort by logical path
//! themselves.

use crate::{
    config::{DocCollection, MetaCollection},
    error::BuildError,
    log,
};
use glob::Pattern;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// The unsuffixed default locale for localized collections.
const DEFAULT_LOCALE: &str = "en";

// ============================================================================
// Types
// ============================================================================

/// File classification by filename/extension heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Content documents (`.md`, `.mdx`).
    Doc,
    /// Sidecar metadata files (`.json`, `.yaml`, `.yml`, `.toml`).
    Meta,
}

/// Classify a path, or `None` when it is neither a document nor metadata.
pub fn classify(path: &Path) -> Option<FileKind> {
    match path.extension()?.to_str()? {
        "md" | "mdx" => Some(FileKind::Doc),
        "json" | "yaml" | "yml" | "toml" => Some(FileKind::Meta),
        _ => None,
    }
}

/// One resolved collection file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Logical path within the collection (locale-rewritten when localized).
    pub path: String,
    #[serde(rename = "absolutePath")]
    pub absolute_path: PathBuf,
    /// Original relative path within the scanned directory; lets consumers
    /// re-derive the absolute path without re-scanning.
    #[serde(rename = "_part")]
    pub part: String,
}

/// Borrowed scan parameters shared by the `doc` and `meta` variants.
#[derive(Debug, Clone, Copy)]
pub struct ScanSpec<'a> {
    pub kind: FileKind,
    pub dirs: &'a [PathBuf],
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub localized: bool,
}

impl<'a> ScanSpec<'a> {
    pub fn doc(collection: &'a DocCollection) -> Self {
        Self {
            kind: FileKind::Doc,
            dirs: &collection.dirs,
            include: &collection.include,
            exclude: &collection.exclude,
            localized: collection.localized,
        }
    }

    pub fn meta(collection: &'a MetaCollection) -> Self {
        Self {
            kind: FileKind::Meta,
            dirs: &collection.dirs,
            include: &collection.include,
            exclude: &collection.exclude,
            localized: collection.localized,
        }
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Resolve the file set of one collection.
///
/// Directories are scanned concurrently; absolute-path deduplication keeps
/// the last-scanned entry. An unreadable declared directory is fatal for the
/// collection.
pub fn resolve_files(spec: &ScanSpec) -> Result<Vec<FileInfo>, BuildError> {
    let include = compile_patterns(spec.include);
    let exclude = compile_patterns(spec.exclude);

    let per_dir: Vec<Vec<FileInfo>> = spec
        .dirs
        .par_iter()
        .map(|dir| scan_dir(dir, spec, &include, &exclude))
        .collect::<Result<_, _>>()?;

    let mut files: FxHashMap<PathBuf, FileInfo> = FxHashMap::default();
    for scanned in per_dir {
        for info in scanned {
            files.insert(info.absolute_path.clone(), info);
        }
    }

    // Distinct files mapping to one logical path (localized rewrites across
    // directories) both survive; emission order decides which wins.
    let mut seen: FxHashMap<&str, u32> = FxHashMap::default();
    for info in files.values() {
        *seen.entry(info.path.as_str()).or_default() += 1;
    }
    for (path, count) in seen {
        if count > 1 {
            log!("warn"; "{count} files resolve to `{path}`");
        }
    }

    Ok(files.into_values().collect())
}

/// Patterns were validated at config resolution; recompiling cannot fail.
fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
}

fn scan_dir(
    dir: &Path,
    spec: &ScanSpec,
    include: &[Pattern],
    exclude: &[Pattern],
) -> Result<Vec<FileInfo>, BuildError> {
    // A declared directory that does not exist yet yields an empty set;
    // everything else unreadable is fatal for the collection.
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| BuildError::Discovery {
            dir: dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if IGNORED_FILES.contains(&name) {
            continue;
        }

        let absolute = entry.path();
        let relative = match absolute.strip_prefix(dir) {
            Ok(rel) => rel_path_str(rel),
            Err(_) => continue,
        };

        // Include-glob defaults to matching everything.
        if !include.is_empty() && !include.iter().any(|p| p.matches(&relative)) {
            continue;
        }
        if exclude.iter().any(|p| p.matches(&relative)) {
            continue;
        }
        if classify(absolute) != Some(spec.kind) {
            continue;
        }

        let logical = if spec.localized {
            localized_path(&relative)
        } else {
            relative.clone()
        };

        files.push(FileInfo {
            path: logical,
            absolute_path: absolute.to_path_buf(),
            part: relative,
        });
    }

    Ok(files)
}

/// Relative path with forward slashes, for globs and logical paths.
fn rel_path_str(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Move a leading locale directory to a filename suffix:
/// `es/foo.mdx` → `foo.es.mdx`; the default locale stays unsuffixed.
fn localized_path(relative: &str) -> String {
    let Some((locale, rest)) = relative.split_once('/') else {
        return relative.to_string();
    };
    let locale = locale.replace('.', "");
    if locale == DEFAULT_LOCALE {
        return rest.to_string();
    }
    match rest.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}.{locale}.{ext}"),
        None => format!("{rest}.{locale}"),
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

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "content").unwrap();
    }

    fn spec<'a>(
        kind: FileKind,
        dirs: &'a [PathBuf],
        include: &'a [String],
        exclude: &'a [String],
        localized: bool,
    ) -> ScanSpec<'a> {
        ScanSpec {
            kind,
            dirs,
            include,
            exclude,
            localized,
        }
    }

    fn sorted_logical(mut files: Vec<FileInfo>) -> Vec<String> {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.into_iter().map(|f| f.path).collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Path::new("a/guide.mdx")), Some(FileKind::Doc));
        assert_eq!(classify(Path::new("guide.md")), Some(FileKind::Doc));
        assert_eq!(classify(Path::new("meta.json")), Some(FileKind::Meta));
        assert_eq!(classify(Path::new("meta.yaml")), Some(FileKind::Meta));
        assert_eq!(classify(Path::new("image.png")), None);
        assert_eq!(classify(Path::new("no-extension")), None);
    }

    #[test]
    fn test_kind_mismatch_discarded() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "index.mdx");
        touch(tmp.path(), "meta.json");

        let dirs = vec![tmp.path().to_path_buf()];
        let docs = resolve_files(&spec(FileKind::Doc, &dirs, &[], &[], false)).unwrap();
        let metas = resolve_files(&spec(FileKind::Meta, &dirs, &[], &[], false)).unwrap();

        assert_eq!(sorted_logical(docs), vec!["index.mdx"]);
        assert_eq!(sorted_logical(metas), vec!["meta.json"]);
    }

    #[test]
    fn test_include_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "keep/a.mdx");
        touch(tmp.path(), "keep/drafts/b.mdx");
        touch(tmp.path(), "other/c.mdx");

        let dirs = vec![tmp.path().to_path_buf()];
        let include = vec!["keep/**".to_string()];
        let exclude = vec!["keep/drafts/**".to_string()];
        let files = resolve_files(&spec(FileKind::Doc, &dirs, &include, &exclude, false)).unwrap();

        assert_eq!(sorted_logical(files), vec!["keep/a.mdx"]);
    }

    #[test]
    fn test_overlapping_globs_dedup() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "guide.mdx");

        let dirs = vec![tmp.path().to_path_buf()];
        let include = vec!["**/*.mdx".to_string(), "guide.*".to_string()];
        let files = resolve_files(&spec(FileKind::Doc, &dirs, &include, &[], false)).unwrap();

        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_dedup_across_dirs() {
        // The same directory declared twice must not duplicate entries.
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "index.mdx");

        let dirs = vec![tmp.path().to_path_buf(), tmp.path().to_path_buf()];
        let files = resolve_files(&spec(FileKind::Doc, &dirs, &[], &[], false)).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_dir_order_does_not_change_sorted_result() {
        let tmp_a = TempDir::new().unwrap();
        let tmp_b = TempDir::new().unwrap();
        touch(tmp_a.path(), "a.mdx");
        touch(tmp_b.path(), "b.mdx");

        let forward = vec![tmp_a.path().to_path_buf(), tmp_b.path().to_path_buf()];
        let backward = vec![tmp_b.path().to_path_buf(), tmp_a.path().to_path_buf()];

        let first = resolve_files(&spec(FileKind::Doc, &forward, &[], &[], false)).unwrap();
        let second = resolve_files(&spec(FileKind::Doc, &backward, &[], &[], false)).unwrap();

        assert_eq!(sorted_logical(first), sorted_logical(second));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dirs = vec![PathBuf::from("/no/such/dir")];
        let files = resolve_files(&spec(FileKind::Doc, &dirs, &[], &[], false)).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_localized_rewrite() {
        assert_eq!(localized_path("es/guide.mdx"), "guide.es.mdx");
        assert_eq!(localized_path("en/guide.mdx"), "guide.mdx");
        assert_eq!(localized_path("es/folder/guide.mdx"), "folder/guide.es.mdx");
        assert_eq!(localized_path("guide.mdx"), "guide.mdx");
    }

    #[test]
    fn test_localized_collection_scan() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "es/guide.mdx");
        touch(tmp.path(), "en/guide.mdx");

        let dirs = vec![tmp.path().to_path_buf()];
        let files = resolve_files(&spec(FileKind::Doc, &dirs, &[], &[], true)).unwrap();

        assert_eq!(sorted_logical(files), vec!["guide.es.mdx", "guide.mdx"]);
    }

    #[test]
    fn test_part_keeps_original_relative_path() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "es/guide.mdx");

        let dirs = vec![tmp.path().to_path_buf()];
        let files = resolve_files(&spec(FileKind::Doc, &dirs, &[], &[], true)).unwrap();

        assert_eq!(files[0].path, "guide.es.mdx");
        assert_eq!(files[0].part, "es/guide.mdx");
        assert_eq!(files[0].absolute_path, tmp.path().join("es/guide.mdx"));
    }

    #[test]
    fn test_file_info_serialization_keys() {
        let info = FileInfo {
            path: "guide.mdx".into(),
            absolute_path: PathBuf::from("/proj/content/guide.mdx"),
            part: "guide.mdx".into(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["path"], "guide.mdx");
        assert_eq!(json["absolutePath"], "/proj/content/guide.mdx");
        assert_eq!(json["_part"], "guide.mdx");
    }
}
