//! Per-file transform hook.
//!
//! Bundlers hand each imported document to [`Transformer::transform`] as an
//! absolute path plus source text. The transformer recovers the owning
//! collection from [`TRANSFORM_REGISTRY`], re-resolves the declaration
//! through [`CONFIG_CACHE`], validates the header against the collection's
//! schema and compiles the body through the pluggable [`Compile`] seam.

use crate::{
    config::{CONFIG_CACHE, ConfigCache, DocCollection, LoadedConfig, TimestampMode},
    error::{BuildError, Issue},
    frontmatter::{parse_frontmatter, split_frontmatter},
    registry::TRANSFORM_REGISTRY,
};
use anyhow::{Context, Result, bail};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{collections::BTreeMap, path::Path, process::Command, sync::Arc};

// ============================================================================
// Seams
// ============================================================================

/// Compiled body of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOutput {
    pub value: String,
    /// Source map, when the compiler produces one.
    pub map: Option<String>,
}

/// Body compiler seam. The engine is compiler-agnostic; callers plug in
/// whatever turns document bodies into module code.
pub trait Compile: Send + Sync {
    fn compile(
        &self,
        path: &Path,
        body: &str,
        options: &BTreeMap<String, toml::Value>,
    ) -> Result<CompiledOutput>;
}

/// Header validator seam, looked up by the schema name a collection declares.
pub trait SchemaValidator: Send + Sync {
    /// Validate and optionally normalize a parsed header.
    fn validate(&self, frontmatter: &Value) -> Result<Value, Vec<Issue>>;
}

/// Last-modified collaborator consulted when `global.timestamp = "git"`.
pub trait TimestampSource: Send + Sync {
    fn last_modified(&self, path: &Path) -> Result<Option<String>>;
}

/// Timestamp source that never reports one.
pub struct NoTimestamps;

impl TimestampSource for NoTimestamps {
    fn last_modified(&self, _path: &Path) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Commit time of the last change touching the file, in strict ISO 8601.
/// Untracked files report no timestamp.
pub struct GitTimestamps;

impl TimestampSource for GitTimestamps {
    fn last_modified(&self, path: &Path) -> Result<Option<String>> {
        let output = Command::new("git")
            .args(["log", "-1", "--format=%cI", "--"])
            .arg(path)
            .output()
            .context("failed to run git for last-modified lookup")?;
        if !output.status.success() {
            bail!("git log failed for `{}`", path.display());
        }
        let stamp = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!stamp.is_empty()).then_some(stamp))
    }
}

// ============================================================================
// Validator set
// ============================================================================

/// Named validators resolvable from `schema = "<name>"` declarations.
pub struct ValidatorSet {
    validators: FxHashMap<String, Box<dyn SchemaValidator>>,
}

impl ValidatorSet {
    pub fn empty() -> Self {
        Self {
            validators: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, name: &str, validator: Box<dyn SchemaValidator>) {
        self.validators.insert(name.to_string(), validator);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SchemaValidator> {
        self.validators.get(name).map(Box::as_ref)
    }
}

impl Default for ValidatorSet {
    /// Structural validators for the common document and metadata shapes.
    fn default() -> Self {
        let mut set = Self::empty();
        set.insert("frontmatter", Box::new(FrontmatterSchema));
        set.insert("meta", Box::new(MetaSchema));
        set
    }
}

/// `title` required, `description` optional, both strings.
struct FrontmatterSchema;

impl SchemaValidator for FrontmatterSchema {
    fn validate(&self, frontmatter: &Value) -> Result<Value, Vec<Issue>> {
        let mut issues = Vec::new();
        match frontmatter.get("title") {
            Some(Value::String(_)) => {}
            Some(_) => issues.push(Issue::new(Some("title"), "expected a string")),
            None => issues.push(Issue::new(Some("title"), "missing required field")),
        }
        if let Some(desc) = frontmatter.get("description")
            && !desc.is_string()
        {
            issues.push(Issue::new(Some("description"), "expected a string"));
        }
        if issues.is_empty() {
            Ok(frontmatter.clone())
        } else {
            Err(issues)
        }
    }
}

/// Optional `title` string and `pages` list of strings.
struct MetaSchema;

impl SchemaValidator for MetaSchema {
    fn validate(&self, frontmatter: &Value) -> Result<Value, Vec<Issue>> {
        let mut issues = Vec::new();
        if let Some(title) = frontmatter.get("title")
            && !title.is_string()
        {
            issues.push(Issue::new(Some("title"), "expected a string"));
        }
        if let Some(pages) = frontmatter.get("pages") {
            match pages.as_array() {
                Some(items) if items.iter().all(Value::is_string) => {}
                _ => issues.push(Issue::new(Some("pages"), "expected a list of strings")),
            }
        }
        if issues.is_empty() {
            Ok(frontmatter.clone())
        } else {
            Err(issues)
        }
    }
}

// ============================================================================
// Transformer
// ============================================================================

/// One transform invocation.
pub struct TransformRequest<'a> {
    /// Absolute path of the imported file.
    pub path: &'a Path,
    pub source: &'a str,
    /// Declaration source consulted when the registry has no descriptor.
    pub config_path: &'a Path,
    pub root: &'a Path,
}

/// Result handed back to the bundler.
#[derive(Debug)]
pub struct TransformOutput {
    pub compiled: CompiledOutput,
    /// Validated header, with `lastModified` added when a timestamp source
    /// reports one.
    pub frontmatter: Value,
    pub collection: String,
}

pub struct Transformer {
    compiler: Box<dyn Compile>,
    validators: ValidatorSet,
    timestamps: Box<dyn TimestampSource>,
}

impl Transformer {
    pub fn new(compiler: Box<dyn Compile>) -> Self {
        Self {
            compiler,
            validators: ValidatorSet::default(),
            timestamps: Box::new(NoTimestamps),
        }
    }

    pub fn with_timestamps(mut self, timestamps: Box<dyn TimestampSource>) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }

    pub fn transform(&self, request: &TransformRequest) -> Result<TransformOutput> {
        let (config, collection) = self.resolve(request)?;
        let doc = doc_side(&config, &collection)
            .with_context(|| format!("collection `{collection}` has no document side"))?;

        let (raw, body) = split_frontmatter(request.source);
        let frontmatter = parse_frontmatter(raw).map_err(|issues| BuildError::Validation {
            path: request.path.to_path_buf(),
            issues,
        })?;

        let mut frontmatter = match &doc.schema {
            Some(schema) => {
                let validator = self
                    .validators
                    .get(schema)
                    .with_context(|| format!("unknown schema `{schema}`"))?;
                validator
                    .validate(&frontmatter)
                    .map_err(|issues| BuildError::Validation {
                        path: request.path.to_path_buf(),
                        issues,
                    })?
            }
            None => frontmatter,
        };

        if config.global.timestamp == TimestampMode::Git
            && let Some(stamp) = self.timestamps.last_modified(request.path)?
            && let Value::Object(map) = &mut frontmatter
        {
            map.insert("lastModified".to_string(), Value::String(stamp));
        }

        let options = if doc.options.is_empty() {
            &config.global.compiler_options
        } else {
            &doc.options
        };
        let compiled = self
            .compiler
            .compile(request.path, body, options)
            .with_context(|| format!("failed to compile `{}`", request.path.display()))?;

        Ok(TransformOutput {
            compiled,
            frontmatter,
            collection,
        })
    }

    /// Declaration and collection name for the requested file.
    ///
    /// Registry descriptors carry both; a file imported before any
    /// generation pass in this process falls back to hashing the declaration
    /// source and matching the path against collection directories.
    fn resolve(&self, request: &TransformRequest) -> Result<(Arc<LoadedConfig>, String)> {
        if let Some(descriptor) = TRANSFORM_REGISTRY.lookup(request.path) {
            let config =
                CONFIG_CACHE.load(request.config_path, request.root, &descriptor.hash)?;
            return Ok((config, descriptor.collection));
        }

        let hash = ConfigCache::hash(request.config_path)?;
        let config = CONFIG_CACHE.load(request.config_path, request.root, &hash)?;
        let collection = collection_for_path(&config, request.path).with_context(|| {
            format!("`{}` does not belong to any collection", request.path.display())
        })?;
        Ok((config, collection))
    }
}

fn doc_side<'a>(config: &'a LoadedConfig, collection: &str) -> Option<&'a DocCollection> {
    config.collections.get(collection)?.as_doc()
}

fn collection_for_path(config: &LoadedConfig, path: &Path) -> Option<String> {
    config
        .collections
        .iter()
        .find(|(_, decl)| {
            decl.as_doc()
                .is_some_and(|doc| doc.dirs.iter().any(|dir| path.starts_with(dir)))
        })
        .map(|(name, _)| name.clone())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TransformDescriptor;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    // The process-global config cache is keyed by content hash, so every
    // test uses a distinct declaration text.

    /// Compiler that echoes the body and records the options it saw.
    struct EchoCompiler;

    impl Compile for EchoCompiler {
        fn compile(
            &self,
            _path: &Path,
            body: &str,
            options: &BTreeMap<String, toml::Value>,
        ) -> Result<CompiledOutput> {
            Ok(CompiledOutput {
                value: format!("compiled({} options):{body}", options.len()),
                map: None,
            })
        }
    }

    struct FixedTimestamps(&'static str);

    impl TimestampSource for FixedTimestamps {
        fn last_modified(&self, _path: &Path) -> Result<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn project(declaration: &str) -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("source.toml");
        fs::write(&config_path, declaration).unwrap();
        let doc_dir = tmp.path().join("content/docs");
        fs::create_dir_all(&doc_dir).unwrap();
        let root = tmp.path().to_path_buf();
        (tmp, config_path, root)
    }

    fn request<'a>(
        path: &'a Path,
        source: &'a str,
        config_path: &'a Path,
        root: &'a Path,
    ) -> TransformRequest<'a> {
        TransformRequest {
            path,
            source,
            config_path,
            root,
        }
    }

    #[test]
    fn test_transform_compiles_body() {
        let (_tmp, config_path, root) = project(
            r#"
            # compile-body
            [collections.docs]
            type = "doc"
            dir = "content/docs"
            "#,
        );
        let doc = root.join("content/docs/page.mdx");
        fs::write(&doc, "---\ntitle: Page\n---\n# Heading\n").unwrap();

        let transformer = Transformer::new(Box::new(EchoCompiler));
        let output = transformer
            .transform(&request(&doc, "---\ntitle: Page\n---\n# Heading\n", &config_path, &root))
            .unwrap();

        assert_eq!(output.collection, "docs");
        assert_eq!(output.compiled.value, "compiled(0 options):# Heading\n");
        assert_eq!(output.frontmatter["title"], "Page");
    }

    #[test]
    fn test_registry_descriptor_wins() {
        let (_tmp, config_path, root) = project(
            r#"
            # registry-descriptor
            [collections.docs]
            type = "doc"
            dir = "content/docs"
            "#,
        );
        let doc = root.join("content/docs/registered.mdx");
        fs::write(&doc, "body").unwrap();
        let hash = ConfigCache::hash(&config_path).unwrap();
        TRANSFORM_REGISTRY.insert(
            doc.clone(),
            TransformDescriptor {
                collection: "docs".into(),
                hash,
            },
        );

        let transformer = Transformer::new(Box::new(EchoCompiler));
        let output = transformer
            .transform(&request(&doc, "body", &config_path, &root))
            .unwrap();
        assert_eq!(output.collection, "docs");
    }

    #[test]
    fn test_schema_validation_reports_issues() {
        let (_tmp, config_path, root) = project(
            r#"
            [collections.docs]
            type = "doc"
            dir = "content/docs"
            schema = "frontmatter"
            "#,
        );
        let doc = root.join("content/docs/bad.mdx");
        let source = "---\ntitle: 42\n---\nbody\n";
        fs::write(&doc, source).unwrap();

        let transformer = Transformer::new(Box::new(EchoCompiler));
        let err = transformer
            .transform(&request(&doc, source, &config_path, &root))
            .unwrap_err();

        let build_err = err.downcast_ref::<BuildError>().unwrap();
        let BuildError::Validation { issues, .. } = build_err else {
            panic!("expected validation error");
        };
        assert_eq!(issues[0].field.as_deref(), Some("title"));
    }

    #[test]
    fn test_unknown_file_rejected() {
        let (_tmp, config_path, root) = project(
            r#"
            # unknown-file
            [collections.docs]
            type = "doc"
            dir = "content/docs"
            "#,
        );
        let stray = root.join("elsewhere/stray.mdx");

        let transformer = Transformer::new(Box::new(EchoCompiler));
        let err = transformer
            .transform(&request(&stray, "body", &config_path, &root))
            .unwrap_err();
        assert!(err.to_string().contains("does not belong"));
    }

    #[test]
    fn test_collection_options_override_global() {
        let (_tmp, config_path, root) = project(
            r#"
            [global.compiler_options]
            a = 1
            b = 2

            [collections.docs]
            type = "doc"
            dir = "content/docs"

            [collections.docs.options]
            only = "this"
            "#,
        );
        let doc = root.join("content/docs/opts.mdx");
        fs::write(&doc, "body").unwrap();

        let transformer = Transformer::new(Box::new(EchoCompiler));
        let output = transformer
            .transform(&request(&doc, "body", &config_path, &root))
            .unwrap();
        assert_eq!(output.compiled.value, "compiled(1 options):body");
    }

    #[test]
    fn test_git_timestamp_added_to_frontmatter() {
        let (_tmp, config_path, root) = project(
            r#"
            [global]
            timestamp = "git"

            [collections.docs]
            type = "doc"
            dir = "content/docs"
            "#,
        );
        let doc = root.join("content/docs/dated.mdx");
        let source = "---\ntitle: Dated\n---\nbody\n";
        fs::write(&doc, source).unwrap();

        let transformer = Transformer::new(Box::new(EchoCompiler))
            .with_timestamps(Box::new(FixedTimestamps("2024-01-02T03:04:05Z")));
        let output = transformer
            .transform(&request(&doc, source, &config_path, &root))
            .unwrap();
        assert_eq!(output.frontmatter["lastModified"], "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_validation_error_mentions_every_issue() {
        let issues = FrontmatterSchema
            .validate(&serde_json::json!({ "description": 5 }))
            .unwrap_err();
        assert_eq!(issues.len(), 2);
    }
}
