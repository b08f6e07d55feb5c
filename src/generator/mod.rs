//! Code generation.
//!
//! Collections are partitioned into output groups by their `output` name
//! (default `index`). Each group produces one module, `<group>.js`, a type
//! declaration companion, `<group>.d.ts`, plus a sidecar `<group>.fm.js`
//! when the group contains standalone doc collections. Groups are written
//! concurrently; within a group every file list is sorted by logical path,
//! so regenerating without changes is byte-identical.

mod fm;
mod manifest;
mod module;
mod types;

pub use manifest::write_manifest;

use crate::{
    config::{CollectionDecl, LoadedConfig},
    discover::{FileInfo, ScanSpec, resolve_files},
    error::BuildError,
    log,
};
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Output groups
// ============================================================================

/// Collections that share one generated module.
#[derive(Debug)]
pub struct OutputGroup<'a> {
    pub name: &'a str,
    /// Alphabetical by collection name.
    pub collections: Vec<(&'a str, &'a CollectionDecl)>,
}

impl OutputGroup<'_> {
    /// Whether `path` lives under any directory of this group.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.dirs().any(|dir| path.starts_with(dir))
    }

    fn dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.collections
            .iter()
            .flat_map(|(_, decl)| match decl {
                CollectionDecl::Doc(doc) => vec![&doc.dirs],
                CollectionDecl::Meta(meta) => vec![&meta.dirs],
                CollectionDecl::Docs(pair) => vec![&pair.doc.dirs, &pair.meta.dirs],
            })
            .flatten()
    }
}

/// Partition the resolved collections into output groups.
///
/// Groups and the collections inside them are ordered alphabetically, which
/// fixes both module file names and export order across runs.
pub fn to_output_groups(config: &LoadedConfig) -> Vec<OutputGroup<'_>> {
    let mut groups: BTreeMap<&str, Vec<(&str, &CollectionDecl)>> = BTreeMap::new();
    for (name, decl) in &config.collections {
        groups
            .entry(decl.output_group())
            .or_default()
            .push((name.as_str(), decl));
    }

    groups
        .into_iter()
        .map(|(name, collections)| OutputGroup { name, collections })
        .collect()
}

// ============================================================================
// Resolved groups
// ============================================================================

/// One collection of a group with its discovered file sets.
pub(crate) struct ResolvedEntry<'a> {
    pub name: &'a str,
    pub decl: &'a CollectionDecl,
    /// Sorted by logical path.
    pub docs: Vec<FileInfo>,
    /// Sorted by logical path.
    pub metas: Vec<FileInfo>,
}

/// An output group with discovery already performed.
pub(crate) struct ResolvedGroup<'a> {
    pub name: &'a str,
    pub entries: Vec<ResolvedEntry<'a>>,
}

pub(crate) fn resolve_group<'a>(
    group: &OutputGroup<'a>,
) -> Result<ResolvedGroup<'a>, BuildError> {
    let entries = group
        .collections
        .iter()
        .map(|&(name, decl)| {
            let (docs, metas) = match decl {
                CollectionDecl::Doc(doc) => (resolve_files(&ScanSpec::doc(doc))?, Vec::new()),
                CollectionDecl::Meta(meta) => (Vec::new(), resolve_files(&ScanSpec::meta(meta))?),
                CollectionDecl::Docs(pair) => (
                    resolve_files(&ScanSpec::doc(&pair.doc))?,
                    resolve_files(&ScanSpec::meta(&pair.meta))?,
                ),
            };
            let mut docs = docs;
            let mut metas = metas;
            docs.sort_by(|a, b| a.path.cmp(&b.path));
            metas.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(ResolvedEntry {
                name,
                decl,
                docs,
                metas,
            })
        })
        .collect::<Result<_, BuildError>>()?;

    Ok(ResolvedGroup {
        name: group.name,
        entries,
    })
}

// ============================================================================
// Writing
// ============================================================================

/// Generate and write every output group of `config` into `out_dir`.
pub fn write_groups(config: &LoadedConfig, out_dir: &Path) -> Result<(), BuildError> {
    let groups = to_output_groups(config);
    write_selected_groups(config, &groups, out_dir)
}

/// Generate and write the given groups concurrently.
pub fn write_selected_groups(
    config: &LoadedConfig,
    groups: &[OutputGroup],
    out_dir: &Path,
) -> Result<(), BuildError> {
    fs::create_dir_all(out_dir).map_err(|e| BuildError::GenerationIo {
        path: out_dir.to_path_buf(),
        source: e,
    })?;

    groups
        .par_iter()
        .try_for_each(|group| write_group(config, group, out_dir))
}

/// Generate and write one output group.
pub fn write_group(
    config: &LoadedConfig,
    group: &OutputGroup,
    out_dir: &Path,
) -> Result<(), BuildError> {
    let resolved = resolve_group(group)?;

    let module_path = out_dir.join(format!("{}.js", group.name));
    let module_src = module::generate_module(config, &resolved, out_dir)?;
    write_file(&module_path, &module_src)?;

    let fm_path = out_dir.join(format!("{}.fm.js", group.name));
    match fm::generate_fm(config, &resolved)? {
        Some(fm_src) => write_file(&fm_path, &fm_src)?,
        // Stale sidecars from a previous declaration version are removed.
        None => {
            let _ = fs::remove_file(&fm_path);
        }
    }

    let types_path = out_dir.join(format!("{}.d.ts", group.name));
    write_file(&types_path, &types::generate_types(config, group, out_dir))?;

    log!("build"; "generated {}", module_path.display());
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), BuildError> {
    fs::write(path, content).map_err(|e| BuildError::GenerationIo {
        path: path.to_path_buf(),
        source: e,
    })
}

// ============================================================================
// Tests
// ============================================================================
