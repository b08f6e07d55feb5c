//! Transform registry.
//!
//! The generator knows which collection and declaration version every
//! imported file belongs to, but the per-file transform hook only sees an
//! absolute path. Generation records a descriptor per file here; the
//! transform looks it up instead of decoding metadata out of import
//! specifiers.

use crate::config::ConfigHash;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

pub static TRANSFORM_REGISTRY: LazyLock<TransformRegistry> =
    LazyLock::new(TransformRegistry::new);

/// What the transform hook needs to know about one imported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformDescriptor {
    /// Name of the collection the file was resolved under.
    pub collection: String,
    /// Declaration version the file was generated against.
    pub hash: ConfigHash,
}

/// Absolute-path keyed map from imported file to its descriptor.
pub struct TransformRegistry {
    entries: RwLock<FxHashMap<PathBuf, TransformDescriptor>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn insert(&self, path: PathBuf, descriptor: TransformDescriptor) {
        self.entries.write().insert(path, descriptor);
    }

    pub fn lookup(&self, path: &Path) -> Option<TransformDescriptor> {
        self.entries.read().get(path).cloned()
    }

    /// Drop all descriptors, ahead of a full regeneration.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}
