//! Config-hash–keyed caching of the declaration source.
//!
//! The declaration source is hashed by content (blake3) and resolved at most
//! once per hash. Repeated `load` calls for the same hash return the same
//! `Arc<LoadedConfig>` without touching the declaration source again; the
//! cache mutex is held across a load, so concurrent callers requesting the
//! same hash share a single in-flight resolution.

use super::{ConfigError, LoadedConfig};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{
    fmt, fs,
    path::Path,
    sync::{Arc, LazyLock},
};

// ============================================================================
// Config hash
// ============================================================================

/// Content fingerprint of the declaration source.
///
/// Used as the cache key for [`ConfigCache::load`] and embedded into
/// generated modules so downstream transform caches can key on the
/// declaration version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigHash(String);

impl ConfigHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Declaration loader seam
// ============================================================================

/// Pluggable boundary that turns the declaration source into a
/// [`LoadedConfig`]. The default implementation parses TOML; tests inject
/// counting or canned loaders.
pub trait DeclarationLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
        root: &Path,
        hash: &ConfigHash,
    ) -> Result<LoadedConfig, ConfigError>;
}

/// Default loader: read the declaration source and parse it as TOML.
pub struct TomlLoader;

impl DeclarationLoader for TomlLoader {
    fn load(
        &self,
        path: &Path,
        root: &Path,
        hash: &ConfigHash,
    ) -> Result<LoadedConfig, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        LoadedConfig::from_str(&content, path, root, hash.clone())
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Process-global config cache used by the build, the watcher and the
/// per-file transform hook.
pub static CONFIG_CACHE: LazyLock<ConfigCache> = LazyLock::new(ConfigCache::new);

/// Hash-keyed cache of resolved declaration sources.
pub struct ConfigCache {
    loader: Box<dyn DeclarationLoader>,
    entries: Mutex<FxHashMap<ConfigHash, Arc<LoadedConfig>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::with_loader(Box::new(TomlLoader))
    }

    pub fn with_loader(loader: Box<dyn DeclarationLoader>) -> Self {
        Self {
            loader,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Fingerprint the declaration source by content.
    pub fn hash(path: &Path) -> Result<ConfigHash, ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(ConfigHash(blake3::hash(&bytes).to_hex().to_string()))
    }

    /// Resolve the declaration source for `hash`, reusing the cached result
    /// when present.
    ///
    /// Holding the entry lock across the load guarantees the declaration
    /// source is resolved at most once per hash even under concurrent calls.
    pub fn load(
        &self,
        path: &Path,
        root: &Path,
        hash: &ConfigHash,
    ) -> Result<Arc<LoadedConfig>, ConfigError> {
        let mut entries = self.entries.lock();
        if let Some(config) = entries.get(hash) {
            return Ok(config.clone());
        }

        let config = Arc::new(self.loader.load(path, root, hash)?);
        entries.insert(hash.clone(), config.clone());
        Ok(config)
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
