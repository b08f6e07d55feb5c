//! Full build pass.
//!
//! One pass hashes the declaration source, resolves it through the config
//! cache, regenerates every output group and, for plain builds, writes the
//! manifest. Watch mode reuses the same pass and keeps the process alive.

use crate::{
    config::{CONFIG_CACHE, ConfigCache, LoadedConfig},
    frontmatter::FRONTMATTER_CACHE,
    generator::{to_output_groups, write_groups, write_manifest},
    log,
};
use anyhow::{Context, Result};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

/// Run one build pass and return the resolved declaration set.
pub fn run_build(
    config_path: &Path,
    root: &Path,
    out_dir: &Path,
    watch: bool,
) -> Result<Arc<LoadedConfig>> {
    let start = Instant::now();
    let out_dir = absolute_out_dir(root, out_dir);

    let hash = ConfigCache::hash(config_path)?;
    let config = CONFIG_CACHE
        .load(config_path, root, &hash)
        .with_context(|| format!("failed to load `{}`", config_path.display()))?;

    FRONTMATTER_CACHE.begin_pass();
    write_groups(&config, &out_dir)?;

    if config.global.generate_manifest && !watch {
        write_manifest(&config, &out_dir)?;
    }

    log!(
        "build";
        "{} collections, {} modules in {}ms",
        config.collections.len(),
        to_output_groups(&config).len(),
        start.elapsed().as_millis()
    );
    Ok(config)
}

/// Generated modules import content by path relative to the output
/// directory, so it must be anchored to the project root.
pub fn absolute_out_dir(root: &Path, out_dir: &Path) -> PathBuf {
    if out_dir.is_absolute() {
        out_dir.to_path_buf()
    } else {
        root.join(out_dir)
    }
}
