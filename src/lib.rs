//! Content collection resolver and incremental codegen engine.
//!
//! A declaration file (`source.toml`) names collections of documents and
//! metadata files. Each build resolves the declaration through a
//! content-hash keyed cache, scans the declared directories, and emits one
//! JavaScript module per output group wiring every resolved file to runtime
//! helpers. Watch mode keeps those modules current incrementally.
//!
//! The library surface exists for bundler integrations: the per-file
//! transform hook in [`loader`] consumes the registry and caches populated
//! by generation.

pub mod build;
pub mod cli;
pub mod config;
pub mod discover;
pub mod error;
pub mod frontmatter;
pub mod generator;
pub mod loader;
pub mod registry;
pub mod utils;
pub mod watch;
