//! Frontmatter sidecar generation (`<group>.fm.js`).
//!
//! Every standalone doc collection exports one `<name>Data` object keyed by
//! logical path, with the original relative path kept under `_part` so
//! consumers can rebuild absolute paths without re-scanning. Async
//! collections load their deferred bodies through it; eager consumers get a
//! header index without importing document modules.

use super::ResolvedGroup;
use crate::{
    config::{CollectionDecl, LoadedConfig},
    discover::FileInfo,
    error::BuildError,
    frontmatter::FRONTMATTER_CACHE,
};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Generate the sidecar of one group, or `None` when the group has no
/// standalone doc collection.
pub(crate) fn generate_fm(
    config: &LoadedConfig,
    group: &ResolvedGroup,
) -> Result<Option<String>, BuildError> {
    let mut out = String::new();

    for entry in &group.entries {
        if !matches!(entry.decl, CollectionDecl::Doc(_)) {
            continue;
        }
        if out.is_empty() {
            let _ = writeln!(out, "// config-hash: {}", config.hash);
        }

        let data = header_map(&entry.docs)?;
        let json = serde_json::to_string(&Value::Object(data)).map_err(|e| {
            BuildError::GenerationIo {
                path: config.path.clone(),
                source: std::io::Error::other(e),
            }
        })?;
        let _ = writeln!(out, "export const {}Data = {json};", entry.name);
    }

    Ok((!out.is_empty()).then_some(out))
}

/// Logical path keyed headers, each augmented with `_part`.
fn header_map(files: &[FileInfo]) -> Result<Map<String, Value>, BuildError> {
    let entries: Vec<(String, Value)> = files
        .par_iter()
        .map(|file| {
            let fm = FRONTMATTER_CACHE.get(&file.absolute_path).map_err(|e| {
                BuildError::Frontmatter {
                    path: file.absolute_path.clone(),
                    source: e,
                }
            })?;
            let mut value = fm.as_ref().clone();
            if let Value::Object(map) = &mut value {
                map.insert("_part".to_string(), Value::String(file.part.clone()));
            }
            Ok((file.path.clone(), value))
        })
        .collect::<Result<_, BuildError>>()?;

    Ok(entries.into_iter().collect())
}
