//! File system watcher for incremental regeneration.
//!
//! # Rebuild strategy
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│     handle_batch()     │  │
//! │  │ events   │    │ (300ms)  │    │                        │  │
//! │  └──────────┘    └──────────┘    │  declaration change →  │  │
//! │                                  │  re-resolve + full     │  │
//! │                                  │  regeneration          │  │
//! │                                  │                        │  │
//! │                                  │  content change →      │  │
//! │                                  │  affected groups only  │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Content edits that only touch document bodies are skipped entirely when
//! the previous pass never consulted a document header, since generated
//! modules cannot depend on them.

use crate::{
    build::{absolute_out_dir, run_build},
    config::{CONFIG_CACHE, ConfigCache, LoadedConfig},
    frontmatter::{FRONTMATTER_CACHE, FrontmatterCache},
    generator::{to_output_groups, write_groups, write_selected_groups},
    log,
    registry::TRANSFORM_REGISTRY,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind};
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError, Sender, channel},
    },
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;
const IDLE_TIMEOUT_MS: u64 = 500;

// =============================================================================
// Events
// =============================================================================

/// Normalized file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEvent {
    Add,
    Change,
    Unlink,
}

/// Map a notify event kind onto [`FsEvent`]. Renames count as structural.
fn classify_event(kind: &EventKind) -> Option<FsEvent> {
    match kind {
        EventKind::Create(_) => Some(FsEvent::Add),
        EventKind::Remove(_) => Some(FsEvent::Unlink),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FsEvent::Add),
        EventKind::Modify(_) => Some(FsEvent::Change),
        EventKind::Any | EventKind::Other => Some(FsEvent::Change),
        EventKind::Access(_) => None,
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events, keeping one merged event per path.
struct Debouncer {
    pending: FxHashMap<PathBuf, FsEvent>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashMap::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        let Some(kind) = classify_event(&event.kind) else {
            return;
        };
        for path in event.paths {
            if is_temp_file(&path) {
                continue;
            }
            self.pending
                .entry(path)
                .and_modify(|existing| *existing = merge(*existing, kind))
                .or_insert(kind);
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<(PathBuf, FsEvent)> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_millis(IDLE_TIMEOUT_MS)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

/// A structural event on a path is never downgraded by a later write.
fn merge(existing: FsEvent, incoming: FsEvent) -> FsEvent {
    match incoming {
        FsEvent::Change => existing,
        other => other,
    }
}

// =============================================================================
// Watch Session
// =============================================================================

struct WatchSession {
    config_path: PathBuf,
    root: PathBuf,
    out_dir: PathBuf,
    config: Arc<LoadedConfig>,
    watcher: RecommendedWatcher,
    tx: Sender<notify::Result<Event>>,
    /// Header cache consulted for invalidation and the skip decision.
    headers: &'static FrontmatterCache,
}

impl WatchSession {
    fn start(
        config_path: &Path,
        root: &Path,
        out_dir: &Path,
        tx: Sender<notify::Result<Event>>,
    ) -> Result<Self> {
        let config = run_build(config_path, root, out_dir, true)?;
        let watcher =
            notify::recommended_watcher(tx.clone()).context("failed to create file watcher")?;

        let mut session = Self {
            config_path: config_path.to_path_buf(),
            root: root.to_path_buf(),
            out_dir: out_dir.to_path_buf(),
            config,
            watcher,
            tx,
            headers: &FRONTMATTER_CACHE,
        };
        session.setup_watchers()?;
        Ok(session)
    }

    fn setup_watchers(&mut self) -> Result<()> {
        // The declaration is watched through its parent: editors replace
        // files by rename, which drops watches on the file itself.
        if let Some(parent) = self.config_path.parent()
            && parent.exists()
        {
            self.watcher
                .watch(parent, RecursiveMode::NonRecursive)
                .with_context(|| format!("failed to watch {}", parent.display()))?;
        }

        let dirs = collection_dirs(&self.config);
        for dir in &dirs {
            if !dir.exists() {
                continue;
            }
            self.watcher
                .watch(dir, RecursiveMode::Recursive)
                .with_context(|| format!("failed to watch {}", dir.display()))?;
        }

        let watched: Vec<_> = dirs
            .iter()
            .filter(|d| d.exists())
            .map(|d| format!("{}/", d.strip_prefix(&self.root).unwrap_or(d).display()))
            .collect();
        if !watched.is_empty() {
            log!("watch"; "watching: {}", watched.join(", "));
        }
        Ok(())
    }

    fn handle_batch(&mut self, batch: Vec<(PathBuf, FsEvent)>) {
        let (declaration, content): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|(path, _)| *path == self.config_path);

        // Cached headers go stale only when file content changes.
        for (path, event) in &content {
            if *event == FsEvent::Change {
                self.headers.invalidate(path);
            }
        }

        if !declaration.is_empty() {
            match self.reload_declaration() {
                // A hash change regenerated every group, which already
                // covers sibling content events in this batch.
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => log!("error"; "declaration reload failed: {e:#}"),
            }
        }

        if content.is_empty() {
            return;
        }
        let structural = content.iter().any(|(_, event)| *event != FsEvent::Change);

        // Body-only edits regenerate nothing unless the previous pass read
        // document headers.
        if !structural && !self.headers.frontmatter_used() {
            return;
        }

        let groups = to_output_groups(&self.config);
        let affected: Vec<_> = groups
            .into_iter()
            .filter(|group| content.iter().any(|(path, _)| group.contains_path(path)))
            .collect();
        if affected.is_empty() {
            return;
        }

        self.headers.begin_pass();
        if let Err(e) = write_selected_groups(&self.config, &affected, &self.out_dir) {
            log!("error"; "regeneration failed: {e:#}");
        }
    }

    /// Re-resolve the declaration source and regenerate everything.
    ///
    /// Returns whether a full regeneration took place; a save that leaves
    /// the content hash unchanged is a no-op.
    fn reload_declaration(&mut self) -> Result<bool> {
        let hash = ConfigCache::hash(&self.config_path)?;
        if hash == self.config.hash {
            return Ok(false);
        }

        log!("watch"; "declaration changed, resolving...");
        TRANSFORM_REGISTRY.clear();
        self.config = CONFIG_CACHE.load(&self.config_path, &self.root, &hash)?;

        // New collection directories may have appeared; start from a fresh
        // watcher instead of unwatching one path at a time.
        self.watcher = notify::recommended_watcher(self.tx.clone())
            .context("failed to recreate file watcher")?;
        self.setup_watchers()?;

        self.headers.begin_pass();
        write_groups(&self.config, &self.out_dir)?;
        Ok(true)
    }

    #[cfg(test)]
    fn hash(&self) -> &crate::config::ConfigHash {
        &self.config.hash
    }
}

/// All declared directories of every collection, deduplicated.
fn collection_dirs(config: &LoadedConfig) -> FxHashSet<PathBuf> {
    use crate::config::CollectionDecl;

    let mut dirs = FxHashSet::default();
    for decl in config.collections.values() {
        match decl {
            CollectionDecl::Doc(doc) => dirs.extend(doc.dirs.iter().cloned()),
            CollectionDecl::Meta(meta) => dirs.extend(meta.dirs.iter().cloned()),
            CollectionDecl::Docs(pair) => {
                dirs.extend(pair.doc.dirs.iter().cloned());
                dirs.extend(pair.meta.dirs.iter().cloned());
            }
        }
    }
    dirs
}

// =============================================================================
// Public API
// =============================================================================

/// Build once, then watch for changes until interrupted.
pub fn run_watch(config_path: &Path, root: &Path, out_dir: &Path) -> Result<()> {
    let out_dir = absolute_out_dir(root, out_dir);
    let (tx, rx) = channel();
    let mut session = WatchSession::start(config_path, root, &out_dir, tx)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install shutdown handler")?;

    log!("watch"; "ready");
    watch_loop(&mut session, &rx, &running);
    log!("watch"; "stopped");
    Ok(())
}

fn watch_loop(
    session: &mut WatchSession,
    rx: &Receiver<notify::Result<Event>>,
    running: &AtomicBool,
) {
    let mut debouncer = Debouncer::new();
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                session.handle_batch(debouncer.take());
            }
            Err(RecvTimeoutError::Disconnected) => break,
            _ => {}
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
