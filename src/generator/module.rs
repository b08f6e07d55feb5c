//! Per-group module generation.
//!
//! The emitted module has a fixed shape:
//!
//! ```js
//! // config-hash: <hash>
//! import { _runtime } from "mdxmap";
//! import { _runtimeAsync, buildConfig } from "mdxmap/runtime/async";
//! import * as path from "node:path";
//! import * as _source from "./source.js";
//! import { blogData } from "./index.fm.js";
//! import * as docs_doc_0 from "../content/docs/index.mdx";
//! ...
//! const [err, _sourceConfig] = buildConfig(_source);
//! ...
//! export const docs = _runtime.docs([...], [...]);
//! ```
//!
//! Conditional sections are dropped, never reordered, so any two modules
//! diff cleanly against each other.

use super::{ResolvedEntry, ResolvedGroup};
use crate::{
    config::{CollectionDecl, LoadedConfig},
    discover::FileInfo,
    error::BuildError,
    frontmatter::FRONTMATTER_CACHE,
    registry::{TRANSFORM_REGISTRY, TransformDescriptor},
};
use rayon::prelude::*;
use std::fmt::Write as _;
use std::path::Path;

/// Generate the module source of one resolved group.
///
/// Also records a transform descriptor for every document file, so the
/// per-file transform can recover collection and declaration version from
/// nothing but an absolute path.
pub(crate) fn generate_module(
    config: &LoadedConfig,
    group: &ResolvedGroup,
    out_dir: &Path,
) -> Result<String, BuildError> {
    let has_async = group
        .entries
        .iter()
        .any(|e| e.decl.as_doc().is_some_and(|d| d.async_load));
    let standalone_async: Vec<&ResolvedEntry> = group
        .entries
        .iter()
        .filter(|e| matches!(e.decl, CollectionDecl::Doc(d) if d.async_load))
        .collect();

    for entry in &group.entries {
        register_docs(config, entry);
    }

    let mut out = String::new();
    let _ = writeln!(out, "// config-hash: {}", config.hash);

    // Imports, fixed order.
    let runtime = &config.global.runtime_module;
    let _ = writeln!(out, "import {{ _runtime }} from {};", js_str(runtime));
    if has_async {
        let _ = writeln!(
            out,
            "import {{ _runtimeAsync, buildConfig }} from {};",
            js_str(&format!("{runtime}/runtime/async"))
        );
    }
    if !standalone_async.is_empty() {
        let _ = writeln!(out, "import * as path from \"node:path\";");
    }
    let _ = writeln!(
        out,
        "import * as _source from {};",
        js_str(&source_specifier(config, out_dir))
    );
    for entry in &standalone_async {
        let _ = writeln!(
            out,
            "import {{ {name}Data }} from {};",
            js_str(&format!("./{}.fm.js", group.name)),
            name = entry.name
        );
    }
    for entry in &group.entries {
        if entry.decl.as_doc().is_none_or(|d| !d.async_load) {
            write_file_imports(&mut out, entry.name, "doc", &entry.docs, out_dir);
        }
        write_file_imports(&mut out, entry.name, "meta", &entry.metas, out_dir);
    }

    if has_async {
        let _ = writeln!(out, "const [err, _sourceConfig] = buildConfig(_source);");
        let _ = writeln!(out, "if (!_sourceConfig) throw new Error(err);");
    }

    // Exports, one per collection in group order.
    for entry in &group.entries {
        match entry.decl {
            CollectionDecl::Meta(_) => {
                let _ = writeln!(
                    out,
                    "export const {} = _runtime.meta({});",
                    entry.name,
                    entry_array(&eager_entries(entry.name, "meta", &entry.metas)?)
                );
            }
            CollectionDecl::Doc(doc) if doc.async_load => {
                let _ = writeln!(
                    out,
                    "export const {name} = _runtimeAsync.doc(Object.entries({name}Data)\
                     .map(([file, data]) => ({{ info: {{ path: file, absolutePath: \
                     path.join(process.cwd(), {dir}, data._part) }}, data }})), \
                     {key}, _sourceConfig);",
                    name = entry.name,
                    dir = js_str(&doc.raw_dirs[0]),
                    key = js_str(entry.name),
                );
            }
            CollectionDecl::Doc(_) => {
                let _ = writeln!(
                    out,
                    "export const {} = _runtime.doc({});",
                    entry.name,
                    entry_array(&eager_entries(entry.name, "doc", &entry.docs)?)
                );
            }
            CollectionDecl::Docs(pair) if pair.doc.async_load => {
                let _ = writeln!(
                    out,
                    "export const {name} = _runtimeAsync.docs({docs}, {metas}, {key}, _sourceConfig);",
                    name = entry.name,
                    docs = entry_array(&inline_entries(&entry.docs)?),
                    metas = entry_array(&eager_entries(entry.name, "meta", &entry.metas)?),
                    key = js_str(entry.name),
                );
            }
            CollectionDecl::Docs(_) => {
                let _ = writeln!(
                    out,
                    "export const {} = _runtime.docs({}, {});",
                    entry.name,
                    entry_array(&eager_entries(entry.name, "doc", &entry.docs)?),
                    entry_array(&eager_entries(entry.name, "meta", &entry.metas)?)
                );
            }
        }
    }

    Ok(out)
}

// ============================================================================
// Pieces
// ============================================================================

fn register_docs(config: &LoadedConfig, entry: &ResolvedEntry) {
    if entry.decl.as_doc().is_none() {
        return;
    }
    for file in &entry.docs {
        TRANSFORM_REGISTRY.insert(
            file.absolute_path.clone(),
            TransformDescriptor {
                collection: entry.name.to_string(),
                hash: config.hash.clone(),
            },
        );
    }
}

/// Specifier the group imports as `_source`.
pub(crate) fn source_specifier(config: &LoadedConfig, out_dir: &Path) -> String {
    match &config.global.source_module {
        Some(spec) => spec.clone(),
        None => relative_import(out_dir, &config.path.with_extension("js")),
    }
}

fn write_file_imports(out: &mut String, name: &str, label: &str, files: &[FileInfo], out_dir: &Path) {
    for (i, file) in files.iter().enumerate() {
        let _ = writeln!(
            out,
            "import * as {name}_{label}_{i} from {};",
            js_str(&relative_import(out_dir, &file.absolute_path))
        );
    }
}

/// `{ info: {...}, data: <importId> }` entries for eagerly imported files.
fn eager_entries(name: &str, label: &str, files: &[FileInfo]) -> Result<Vec<String>, BuildError> {
    files
        .iter()
        .enumerate()
        .map(|(i, file)| Ok(format!("{{ info: {}, data: {name}_{label}_{i} }}", info_json(file)?)))
        .collect()
}

/// `{ info: {...}, data: <frontmatter> }` entries with the parsed header
/// inlined, for async doc sides of paired collections.
fn inline_entries(files: &[FileInfo]) -> Result<Vec<String>, BuildError> {
    files
        .par_iter()
        .map(|file| {
            let fm = FRONTMATTER_CACHE.get(&file.absolute_path).map_err(|e| {
                BuildError::Frontmatter {
                    path: file.absolute_path.clone(),
                    source: e,
                }
            })?;
            let data = serde_json::to_string(fm.as_ref()).map_err(|e| BuildError::Frontmatter {
                path: file.absolute_path.clone(),
                source: std::io::Error::other(e),
            })?;
            Ok(format!("{{ info: {}, data: {data} }}", info_json(file)?))
        })
        .collect()
}

fn info_json(file: &FileInfo) -> Result<String, BuildError> {
    serde_json::to_string(file).map_err(|e| BuildError::GenerationIo {
        path: file.absolute_path.clone(),
        source: std::io::Error::other(e),
    })
}

/// One entry per line, trailing comma, or `[]` when empty.
fn entry_array(entries: &[String]) -> String {
    if entries.is_empty() {
        return "[]".to_string();
    }
    let mut out = String::from("[\n");
    for entry in entries {
        let _ = writeln!(out, "  {entry},");
    }
    out.push(']');
    out
}

pub(crate) fn js_str(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Relative specifier from `from_dir` to `to`, with forward slashes and a
/// `./` prefix when the target is not above `from_dir`.
pub(crate) fn relative_import(from_dir: &Path, to: &Path) -> String {
    let from: Vec<_> = from_dir.components().collect();
    let target: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );

    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{joined}")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigHash;
    use crate::generator::{resolve_group, to_output_groups};
    use std::fs;
    use tempfile::TempDir;

    fn write_content(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn load(root: &Path, content: &str) -> LoadedConfig {
        LoadedConfig::from_str(
            content,
            &root.join("source.toml"),
            root,
            ConfigHash::for_tests("testhash"),
        )
        .unwrap()
    }

    fn generate(config: &LoadedConfig, out_dir: &Path) -> String {
        let groups = to_output_groups(config);
        let resolved = resolve_group(&groups[0]).unwrap();
        generate_module(config, &resolved, out_dir).unwrap()
    }

    #[test]
    fn test_relative_import() {
        assert_eq!(
            relative_import(Path::new("/proj/.source"), Path::new("/proj/content/a.mdx")),
            "../content/a.mdx"
        );
        assert_eq!(
            relative_import(Path::new("/proj"), Path::new("/proj/source.js")),
            "./source.js"
        );
        assert_eq!(
            relative_import(Path::new("/proj/.source"), Path::new("/other/a.mdx")),
            "../../other/a.mdx"
        );
    }

    #[test]
    fn test_eager_module_shape() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "content/docs/index.mdx", "# Index");
        write_content(tmp.path(), "content/docs/folder/test.mdx", "# Test");
        let config = load(tmp.path(), r#"
            [collections.docs]
            type = "doc"
            dir = "content/docs"
        "#);

        let out_dir = tmp.path().join(".source");
        let module = generate(&config, &out_dir);

        assert!(module.starts_with("// config-hash: testhash\n"));
        assert!(module.contains("import { _runtime } from \"mdxmap\";"));
        assert!(module.contains("import * as _source from \"../source.js\";"));
        assert!(module.contains("import * as docs_doc_0 from \"../content/docs/folder/test.mdx\";"));
        assert!(module.contains("import * as docs_doc_1 from \"../content/docs/index.mdx\";"));
        assert!(module.contains("export const docs = _runtime.doc(["));
        assert!(module.contains("\"path\":\"folder/test.mdx\""));
        // Async machinery is absent from all-eager groups.
        assert!(!module.contains("_runtimeAsync"));
        assert!(!module.contains("buildConfig"));
        assert!(!module.contains("node:path"));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "content/a.mdx", "# A");
        write_content(tmp.path(), "content/b.mdx", "# B");
        let config = load(tmp.path(), r#"
            [collections.docs]
            type = "doc"
            dir = "content"
        "#);

        let out_dir = tmp.path().join(".source");
        assert_eq!(generate(&config, &out_dir), generate(&config, &out_dir));
    }

    #[test]
    fn test_async_doc_uses_fm_module() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "content/blog/post.mdx", "---\ntitle: P\n---\n");
        let config = load(tmp.path(), r#"
            [collections.blog]
            type = "doc"
            dir = "content/blog"
            async = true
        "#);

        let module = generate(&config, &tmp.path().join(".source"));

        assert!(module.contains("import { _runtimeAsync, buildConfig } from \"mdxmap/runtime/async\";"));
        assert!(module.contains("import * as path from \"node:path\";"));
        assert!(module.contains("import { blogData } from \"./index.fm.js\";"));
        assert!(module.contains("const [err, _sourceConfig] = buildConfig(_source);"));
        assert!(module.contains("Object.entries(blogData)"));
        assert!(module.contains("path.join(process.cwd(), \"content/blog\", data._part)"));
        // Async documents are never imported eagerly.
        assert!(!module.contains("blog_doc_0"));
    }

    #[test]
    fn test_async_docs_pair_inlines_frontmatter() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "content/docs/guide.mdx", "---\ntitle: Guide\n---\n");
        write_content(tmp.path(), "content/docs/meta.json", "{}");
        let config = load(tmp.path(), r#"
            [collections.docs]
            type = "docs"
            dir = "content/docs"

            [collections.docs.doc]
            async = true
        "#);

        let module = generate(&config, &tmp.path().join(".source"));

        assert!(module.contains("_runtimeAsync.docs("));
        assert!(module.contains("data: {\"title\":\"Guide\"}"));
        assert!(module.contains("import * as docs_meta_0 from \"../content/docs/meta.json\";"));
        // Paired async reads headers inline, no fm sidecar import.
        assert!(!module.contains(".fm.js"));
        assert!(!module.contains("docs_doc_0"));
    }

    #[test]
    fn test_async_and_eager_expose_same_logical_entries() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "content/docs/a.mdx", "---\ntitle: A\n---\n");
        write_content(tmp.path(), "content/docs/b.mdx", "---\ntitle: B\n---\n");
        let eager = load(tmp.path(), r#"
            [collections.docs]
            type = "docs"
            dir = "content/docs"
        "#);
        let deferred = load(tmp.path(), r#"
            [collections.docs]
            type = "docs"
            dir = "content/docs"

            [collections.docs.doc]
            async = true
        "#);

        let out_dir = tmp.path().join(".source");
        let logical_paths = |module: &str| {
            let mut paths: Vec<String> = module
                .match_indices("\"path\":\"")
                .map(|(i, tag)| {
                    let rest = &module[i + tag.len()..];
                    rest[..rest.find('"').unwrap()].to_string()
                })
                .collect();
            paths.sort_unstable();
            paths
        };

        assert_eq!(
            logical_paths(&generate(&eager, &out_dir)),
            logical_paths(&generate(&deferred, &out_dir))
        );
    }

    #[test]
    fn test_registry_populated_for_docs() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "content/reg/item.mdx", "# Item");
        let config = load(tmp.path(), r#"
            [collections.reg]
            type = "doc"
            dir = "content/reg"
        "#);

        generate(&config, &tmp.path().join(".source"));

        let descriptor = TRANSFORM_REGISTRY
            .lookup(&tmp.path().join("content/reg/item.mdx"))
            .unwrap();
        assert_eq!(descriptor.collection, "reg");
        assert_eq!(descriptor.hash, ConfigHash::for_tests("testhash"));
    }

    #[test]
    fn test_source_module_override_used_verbatim() {
        let tmp = TempDir::new().unwrap();
        let config = load(tmp.path(), r#"
            [global]
            source_module = "app/source.config.js"

            [collections.empty]
            type = "doc"
            dir = "content/empty"
        "#);

        let module = generate(&config, &tmp.path().join(".source"));
        assert!(module.contains("import * as _source from \"app/source.config.js\";"));
        assert!(module.contains("export const empty = _runtime.doc([]);"));
    }
}
