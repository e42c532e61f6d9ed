//! Code-graph seams — provider, dirty tracking, incremental refresh
//!
//! The graph service itself is an external collaborator. The engine only
//! initializes it, tracks which files tools have dirtied, and triggers a
//! deferred refresh right before a graph-backed tool runs.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::GraphError;

/// Graph service lifecycle
#[async_trait]
pub trait GraphProvider: Send + Sync {
    /// Initialize the graph for a project; returns the graph id
    async fn initialize(
        &self,
        cancel: &CancellationToken,
        project_root: &std::path::Path,
    ) -> Result<String, GraphError>;

    /// Whether the service is reachable
    fn is_available(&self) -> bool;
}

/// Outcome of an incremental refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshResult {
    pub nodes_added: usize,
    pub nodes_removed: usize,
    pub files_refreshed: usize,
    pub duration: Duration,
}

/// Incremental refresh of dirty files
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh_files(
        &self,
        cancel: &CancellationToken,
        paths: &[PathBuf],
    ) -> Result<RefreshResult, GraphError>;
}

/// Tracks files modified by tools since the last refresh
///
/// Mutations arrive from the dispatcher; the set drains atomically when
/// a refresh begins, so a refresh never loses concurrent marks.
pub struct DirtyTracker {
    dirty: Mutex<BTreeSet<PathBuf>>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self {
            dirty: Mutex::new(BTreeSet::new()),
        }
    }

    /// Mark files as modified
    pub fn mark_dirty(&self, paths: &[PathBuf]) {
        if paths.is_empty() {
            return;
        }
        let mut dirty = self.dirty.lock().unwrap();
        for path in paths {
            dirty.insert(path.clone());
        }
    }

    /// Whether any files await refresh
    pub fn has_dirty(&self) -> bool {
        !self.dirty.lock().unwrap().is_empty()
    }

    /// Drain the dirty set for refresh
    pub fn take_dirty(&self) -> Vec<PathBuf> {
        let mut dirty = self.dirty.lock().unwrap();
        std::mem::take(&mut *dirty).into_iter().collect()
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}
