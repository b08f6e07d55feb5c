//! mdxmap - collection resolution and module generation for content trees.

use anyhow::{Result, bail};
use clap::Parser;
use mdxmap::{
    build::run_build,
    cli::{Cli, Commands},
    watch::run_watch,
};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));

    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path: PathBuf = root.join(&cli.config);
    if !config_path.exists() {
        bail!("declaration file not found: {}", config_path.display());
    }

    match &cli.command {
        Commands::Build => run_build(&config_path, root, &cli.out_dir, false).map(|_| ()),
        Commands::Watch => run_watch(&config_path, root, &cli.out_dir),
    }
}
