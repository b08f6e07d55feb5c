//! Declaration source handling for `source.toml`.
//!
//! The declaration source names every content collection the engine
//! resolves. Collections form a tagged union (`doc` / `meta` / `docs`) and
//! are matched exhaustively by every consumer.
//!
//! # Example
//!
//! ```toml
//! [global]
//! generate_manifest = true
//! timestamp = "git"
//!
//! [collections.blog]
//! type = "doc"
//! dir = "content/blog"
//! files = ["**/*.mdx"]
//! async = true
//!
//! [collections.docs]
//! type = "docs"
//! dir = ["content/docs"]
//! output = "docs"
//! localized = true
//!
//! [collections.docs.doc]
//! async = true
//! schema = "frontmatter"
//! ```

pub mod cache;
mod error;

pub use cache::{CONFIG_CACHE, ConfigCache, ConfigHash, DeclarationLoader};
pub use error::ConfigError;

use educe::Educe;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Output-group name used by collections with no explicit `output`.
pub const DEFAULT_OUTPUT_GROUP: &str = "index";

// ============================================================================
// Defaults
// ============================================================================

mod defaults {
    pub fn runtime_module() -> String {
        "mdxmap".into()
    }
}

// ============================================================================
// Global options
// ============================================================================

/// Timestamp source for the per-file transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// No last-modified lookup.
    #[default]
    None,
    /// Resolve last-modified times through the git timestamp collaborator.
    Git,
}

/// `[global]` section of the declaration source.
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalOptions {
    /// Module specifier the generated code imports runtime helpers from.
    #[serde(default = "defaults::runtime_module")]
    #[educe(Default = defaults::runtime_module())]
    pub runtime_module: String,

    /// Runtime companion module imported as `_source` by generated code.
    /// Defaults to the declaration path with a `.js` extension.
    pub source_module: Option<String>,

    /// Write a `manifest.json` inventory at the end of non-watch builds.
    pub generate_manifest: bool,

    /// Last-modified source consulted by the per-file transform.
    pub timestamp: TimestampMode,

    /// Default compiler options for collections without their own.
    pub compiler_options: BTreeMap<String, toml::Value>,
}

// ============================================================================
// Raw declaration shapes (serde mirror of the TOML)
// ============================================================================

/// `dir = "a"` or `dir = ["a", "b"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(dir) => vec![dir],
            Self::Many(dirs) => dirs,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawDocOverrides {
    dir: Option<OneOrMany>,
    files: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    localized: Option<bool>,
    r#async: bool,
    schema: Option<String>,
    options: Option<BTreeMap<String, toml::Value>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawMetaOverrides {
    dir: Option<OneOrMany>,
    files: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    localized: Option<bool>,
    schema: Option<String>,
}

/// One `[collections.<name>]` table.
///
/// `deny_unknown_fields` cannot be combined with an internal tag, so the
/// sub-tables carry it instead and the resolver validates shapes explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawCollection {
    Doc {
        dir: OneOrMany,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
        output: Option<String>,
        #[serde(default)]
        localized: bool,
        #[serde(default)]
        r#async: bool,
        schema: Option<String>,
        #[serde(default)]
        options: BTreeMap<String, toml::Value>,
    },
    Meta {
        dir: OneOrMany,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
        output: Option<String>,
        #[serde(default)]
        localized: bool,
        schema: Option<String>,
    },
    Docs {
        dir: OneOrMany,
        output: Option<String>,
        #[serde(default)]
        localized: bool,
        #[serde(default)]
        doc: RawDocOverrides,
        #[serde(default)]
        meta: RawMetaOverrides,
    },
}

/// Whole-file shape of the declaration source.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DeclarationFile {
    global: GlobalOptions,
    collections: BTreeMap<String, RawCollection>,
}

// ============================================================================
// Resolved declarations
// ============================================================================

/// A resolved `doc` declaration (content documents).
#[derive(Debug, Clone)]
pub struct DocCollection {
    /// Absolute scan directories.
    pub dirs: Vec<PathBuf>,
    /// Declared directory strings, kept for generated-code path tokens.
    pub raw_dirs: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub output: Option<String>,
    pub localized: bool,
    /// Defer document bodies to first access instead of importing eagerly.
    pub async_load: bool,
    /// Named schema resolved through the validator set.
    pub schema: Option<String>,
    /// Per-document compiler options; global defaults apply when empty.
    pub options: BTreeMap<String, toml::Value>,
}

/// A resolved `meta` declaration (sidecar metadata files). Always eager.
#[derive(Debug, Clone)]
pub struct MetaCollection {
    pub dirs: Vec<PathBuf>,
    pub raw_dirs: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub output: Option<String>,
    pub localized: bool,
    pub schema: Option<String>,
}

/// A paired `doc` + `meta` declaration under one logical name.
#[derive(Debug, Clone)]
pub struct DocsCollection {
    pub doc: DocCollection,
    pub meta: MetaCollection,
}

/// Tagged union over the three declaration variants.
#[derive(Debug, Clone)]
pub enum CollectionDecl {
    Doc(DocCollection),
    Meta(MetaCollection),
    Docs(DocsCollection),
}

impl CollectionDecl {
    /// Output-group name this collection belongs to.
    pub fn output_group(&self) -> &str {
        let output = match self {
            Self::Doc(doc) => &doc.output,
            Self::Meta(meta) => &meta.output,
            Self::Docs(pair) => &pair.doc.output,
        };
        output.as_deref().unwrap_or(DEFAULT_OUTPUT_GROUP)
    }

    /// The `doc` side of this declaration, if it has one.
    pub fn as_doc(&self) -> Option<&DocCollection> {
        match self {
            Self::Doc(doc) => Some(doc),
            Self::Docs(pair) => Some(&pair.doc),
            Self::Meta(_) => None,
        }
    }
}

// ============================================================================
// Loaded config
// ============================================================================

/// The resolved declaration set. Immutable once built; rebuilt only when the
/// declaration source's content hash changes.
#[derive(Debug)]
pub struct LoadedConfig {
    /// Absolute path of the declaration source.
    pub path: PathBuf,
    /// Project root all relative directories resolve against.
    pub root: PathBuf,
    /// Content fingerprint of the declaration source.
    pub hash: ConfigHash,
    pub collections: BTreeMap<String, CollectionDecl>,
    pub global: GlobalOptions,
}

impl LoadedConfig {
    /// Resolve a declaration source from its TOML text.
    pub fn from_str(
        content: &str,
        path: &Path,
        root: &Path,
        hash: ConfigHash,
    ) -> Result<Self, ConfigError> {
        let raw: DeclarationFile = toml::from_str(content)?;

        let mut collections = BTreeMap::new();
        for (name, decl) in raw.collections {
            validate_name(&name)?;
            let resolved = resolve_collection(decl, root).map_err(|e| match e {
                ConfigError::Invalid(msg) => {
                    ConfigError::Invalid(format!("collection `{name}`: {msg}"))
                }
                other => other,
            })?;
            collections.insert(name, resolved);
        }

        Ok(Self {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
            hash,
            collections,
            global: raw.global,
        })
    }

}

// ============================================================================
// Resolution helpers
// ============================================================================

/// Collection names become export bindings in generated modules.
fn validate_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Invalid(format!(
            "collection `{name}` is not a valid export name"
        )));
    }
    Ok(())
}

/// Output names become file names of generated modules.
fn validate_output(output: &Option<String>) -> Result<(), ConfigError> {
    if let Some(output) = output
        && (output.is_empty()
            || !output
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-')))
    {
        return Err(ConfigError::Invalid(format!(
            "output group `{output}` is not a valid module name"
        )));
    }
    Ok(())
}

fn validate_patterns(patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        glob::Pattern::new(pattern)
            .map_err(|e| ConfigError::Pattern(pattern.clone(), e))?;
    }
    Ok(())
}

fn resolve_dirs(raw: OneOrMany, root: &Path) -> Result<(Vec<PathBuf>, Vec<String>), ConfigError> {
    let raw_dirs = raw.into_vec();
    if raw_dirs.is_empty() {
        return Err(ConfigError::Invalid(
            "collection must declare at least one directory".into(),
        ));
    }

    let dirs = raw_dirs
        .iter()
        .map(|dir| {
            let path = Path::new(dir);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        })
        .collect();
    Ok((dirs, raw_dirs))
}

fn resolve_collection(raw: RawCollection, root: &Path) -> Result<CollectionDecl, ConfigError> {
    match raw {
        RawCollection::Doc {
            dir,
            files,
            exclude,
            output,
            localized,
            r#async,
            schema,
            options,
        } => {
            validate_output(&output)?;
            validate_patterns(&files)?;
            validate_patterns(&exclude)?;
            let (dirs, raw_dirs) = resolve_dirs(dir, root)?;
            // Deferred loading reconstructs absolute paths from one base
            // directory, so async doc collections cannot span several.
            if r#async && dirs.len() > 1 {
                return Err(ConfigError::Invalid(
                    "async collections support a single directory".into(),
                ));
            }
            Ok(CollectionDecl::Doc(DocCollection {
                dirs,
                raw_dirs,
                include: files,
                exclude,
                output,
                localized,
                async_load: r#async,
                schema,
                options,
            }))
        }
        RawCollection::Meta {
            dir,
            files,
            exclude,
            output,
            localized,
            schema,
        } => {
            validate_output(&output)?;
            validate_patterns(&files)?;
            validate_patterns(&exclude)?;
            let (dirs, raw_dirs) = resolve_dirs(dir, root)?;
            Ok(CollectionDecl::Meta(MetaCollection {
                dirs,
                raw_dirs,
                include: files,
                exclude,
                output,
                localized,
                schema,
            }))
        }
        RawCollection::Docs {
            dir,
            output,
            localized,
            doc,
            meta,
        } => {
            validate_output(&output)?;

            // Decompose into one doc and one meta sub-declaration sharing
            // dir/output/localized unless overridden.
            let (doc_dirs, doc_raw) = resolve_dirs(doc.dir.unwrap_or_else(|| dir.clone()), root)?;
            let (meta_dirs, meta_raw) = resolve_dirs(meta.dir.unwrap_or(dir), root)?;

            let doc_include = doc.files.unwrap_or_default();
            let doc_exclude = doc.exclude.unwrap_or_default();
            let meta_include = meta.files.unwrap_or_default();
            let meta_exclude = meta.exclude.unwrap_or_default();
            validate_patterns(&doc_include)?;
            validate_patterns(&doc_exclude)?;
            validate_patterns(&meta_include)?;
            validate_patterns(&meta_exclude)?;

            Ok(CollectionDecl::Docs(DocsCollection {
                doc: DocCollection {
                    dirs: doc_dirs,
                    raw_dirs: doc_raw,
                    include: doc_include,
                    exclude: doc_exclude,
                    output: output.clone(),
                    localized: doc.localized.unwrap_or(localized),
                    async_load: doc.r#async,
                    schema: doc.schema,
                    options: doc.options.unwrap_or_default(),
                },
                meta: MetaCollection {
                    dirs: meta_dirs,
                    raw_dirs: meta_raw,
                    include: meta_include,
                    exclude: meta_exclude,
                    output,
                    localized: meta.localized.unwrap_or(localized),
                    schema: meta.schema,
                },
            }))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
