//! File system watcher for live rebuilds.
//!
//! Monitors the content, layout, static and theme directories plus
//! `config.toml`, and runs one full build per batch of changes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌─────────────────────────────┐
//! │  notify  │───▶│ Debouncer │───▶│ WatchSession::handle_batch  │
//! │  events  │    │  (300ms)  │    │  config.toml? reload config │
//! └──────────┘    └───────────┘    │  full build                 │
//!                                  └─────────────────────────────┘
//! ```
//!
//! Builds run on the watching thread, so two never overlap: events that arrive
//! during a build wait in the channel and form the next batch. A failed build
//! is logged and the watch carries on.

use crate::build::{BuildError, BuildReport, Builder};
use crate::config::{self, SitePaths};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;

const DEBOUNCE_MS: u64 = 300;

/// How long to block when nothing is pending.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Editor artifacts that never trigger a rebuild.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Debounce State
// =============================================================================

/// Collects changed paths until no event has arrived for one window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEBOUNCE_MS))
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashSet::new(),
            last_event: None,
        }
    }

    /// Record changed paths; temp files are dropped.
    pub fn add(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.pending
            .extend(paths.into_iter().filter(|p| !is_temp_file(p)));
        self.last_event = Some(Instant::now());
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// A batch is ready once the window has passed since the last event.
    pub fn ready(&self) -> bool {
        self.is_pending() && self.last_event.is_some_and(|t| t.elapsed() >= self.window)
    }

    /// Take the pending batch, sorted.
    pub fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut batch: Vec<PathBuf> = self.pending.drain().collect();
        batch.sort();
        batch
    }

    /// How long the event loop may block before checking [`ready`](Self::ready).
    pub fn timeout(&self) -> Duration {
        if self.is_pending() { self.window } else { IDLE_TIMEOUT }
    }
}

// =============================================================================
// Session
// =============================================================================

/// A site being watched: its builder plus what counts as a source change.
#[derive(Debug)]
pub struct WatchSession {
    site_root: PathBuf,
    caching: bool,
    builder: Builder,
}

impl WatchSession {
    pub fn open(site_root: &Path, caching: bool) -> Result<Self, WatchError> {
        let builder = Builder::open(site_root)?;
        builder.set_caching(caching);
        Ok(Self {
            site_root: site_root.to_path_buf(),
            caching,
            builder,
        })
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    fn paths(&self) -> &SitePaths {
        self.builder.paths()
    }

    /// Whether a changed path should trigger a rebuild.
    ///
    /// Anything under the output directory is ignored.
    pub fn is_source(&self, path: &Path) -> bool {
        let paths = self.paths();
        if path.starts_with(&paths.output) || is_temp_file(path) {
            return false;
        }
        path == paths.config_file
            || [&paths.content, &paths.layouts, &paths.static_files, &paths.themes]
                .iter()
                .any(|dir| path.starts_with(dir))
    }

    /// Rebuild once for a batch of changes.
    ///
    /// A changed `config.toml` is reloaded first; a config that no longer
    /// parses fails the batch and keeps the previous builder.
    pub fn handle_batch(&mut self, changed: &[PathBuf]) -> Result<BuildReport, BuildError> {
        if changed.iter().any(|p| p == &self.paths().config_file) {
            tracing::info!("config.toml changed, reloading");
            let config = config::load_config(&self.site_root)?;
            let builder = Builder::new(&self.site_root, config);
            builder.set_caching(self.caching);
            self.builder = builder;
        }
        self.builder.build()
    }

    fn watch_targets(&self) -> Vec<(PathBuf, RecursiveMode)> {
        let paths = self.paths();
        let mut targets: Vec<(PathBuf, RecursiveMode)> =
            [&paths.content, &paths.layouts, &paths.static_files, &paths.themes]
                .into_iter()
                .filter(|dir| dir.is_dir())
                .map(|dir| (dir.clone(), RecursiveMode::Recursive))
                .collect();
        // The root itself, for config.toml being replaced or created
        targets.push((self.site_root.clone(), RecursiveMode::NonRecursive));
        targets
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Build once, then rebuild on every batch of source changes until the
/// watcher shuts down.
///
/// `on_build` sees every successful build, the initial one included.
pub fn watch(
    site_root: &Path,
    caching: bool,
    mut on_build: impl FnMut(&BuildReport),
) -> Result<(), WatchError> {
    let site_root = site_root.canonicalize()?;
    let mut session = WatchSession::open(&site_root, caching)?;

    match session.builder().build() {
        Ok(report) => on_build(&report),
        Err(e) => tracing::error!("initial build failed: {e}"),
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;
    for (path, mode) in session.watch_targets() {
        watcher.watch(&path, mode)?;
        tracing::debug!(path = %path.display(), "watching");
    }
    tracing::info!(site = %site_root.display(), "watching for changes");

    let mut debouncer = Debouncer::default();
    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => {
                let sources: Vec<PathBuf> = event
                    .paths
                    .into_iter()
                    .filter(|p| session.is_source(p))
                    .collect();
                if !sources.is_empty() {
                    debouncer.add(sources);
                }
            }
            Ok(Err(e)) => tracing::warn!("watch error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                let batch = debouncer.take();
                tracing::info!(changed = batch.len(), "rebuilding");
                match session.handle_batch(&batch) {
                    Ok(report) => on_build(&report),
                    Err(e) => tracing::error!("rebuild failed: {e}"),
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
            _ => {}
        }
    }

    Ok(())
}
