//! Build manifest (`manifest.json`).
//!
//! An inventory of every resolved file per collection, written at the end of
//! non-watch builds when `global.generate_manifest` is set. Deployment
//! tooling consumes it to know which content files a build depended on.

use crate::{
    config::{CollectionDecl, LoadedConfig},
    discover::{FileInfo, ScanSpec, resolve_files},
    error::BuildError,
    log,
};
use serde_json::{Map, Value, json};
use std::{fs, path::Path};

/// Resolve every collection and write `manifest.json` into `out_dir`.
pub fn write_manifest(config: &LoadedConfig, out_dir: &Path) -> Result<(), BuildError> {
    let mut collections = Map::new();
    for (name, decl) in &config.collections {
        let mut files = match decl {
            CollectionDecl::Doc(doc) => resolve_files(&ScanSpec::doc(doc))?,
            CollectionDecl::Meta(meta) => resolve_files(&ScanSpec::meta(meta))?,
            CollectionDecl::Docs(pair) => {
                let mut files = resolve_files(&ScanSpec::doc(&pair.doc))?;
                files.extend(resolve_files(&ScanSpec::meta(&pair.meta))?);
                files
            }
        };
        files.sort_by(|a, b| a.path.cmp(&b.path));
        collections.insert(name.clone(), file_list(&files));
    }

    let manifest = json!({
        "hash": config.hash.as_str(),
        "collections": collections,
    });

    let path = out_dir.join("manifest.json");
    let content = serde_json::to_string_pretty(&manifest).map_err(|e| {
        BuildError::GenerationIo {
            path: path.clone(),
            source: std::io::Error::other(e),
        }
    })?;
    fs::write(&path, content).map_err(|e| BuildError::GenerationIo {
        path: path.clone(),
        source: e,
    })?;

    log!("build"; "wrote manifest {}", path.display());
    Ok(())
}

fn file_list(files: &[FileInfo]) -> Value {
    Value::Array(
        files
            .iter()
            .map(|f| serde_json::to_value(f).unwrap_or(Value::Null))
            .collect(),
    )
}
