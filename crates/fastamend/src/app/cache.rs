//! Session-scoped cache of available target listings.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::app::task::Task;
use crate::domain::address::Address;
use crate::infra::tool::TargetLister;
use crate::infra::workspace::WorkspaceEntry;

/// Memoizes the available-target query per directory.
///
/// The first lookup for a handle dispatches exactly one background query and
/// stores the task; every later lookup, pending or completed, gets a clone of
/// that same task. Failures stay cached for the session, so a directory whose
/// query failed keeps reporting the same failure until [`forget`] is called.
///
/// [`forget`]: TargetListCache::forget
pub struct TargetListCache {
    lister: Arc<dyn TargetLister>,
    build_file: String,
    entries: DashMap<PathBuf, Task<Vec<Address>>>,
}

impl TargetListCache {
    pub fn new(lister: Arc<dyn TargetLister>, build_file: impl Into<String>) -> Self {
        Self {
            lister,
            build_file: build_file.into(),
            entries: DashMap::new(),
        }
    }

    /// The target listing for `entry`, dispatching the query on first use.
    pub fn get(&self, entry: &dyn WorkspaceEntry) -> Task<Vec<Address>> {
        self.entries
            .entry(entry.path().to_path_buf())
            .or_insert_with(|| self.dispatch(entry))
            .clone()
    }

    /// Drop a cached listing so the next lookup queries again. Returns
    /// whether anything was cached for the path.
    pub fn forget(&self, entry: &dyn WorkspaceEntry) -> bool {
        self.entries.remove(entry.path()).is_some()
    }

    fn dispatch(&self, entry: &dyn WorkspaceEntry) -> Task<Vec<Address>> {
        match self.build_file_of(entry) {
            Some(build_file) => {
                let lister = Arc::clone(&self.lister);
                Task::spawn("list-targets", move || lister.list_targets(&build_file))
            }
            // Nothing can define targets here; skip the external call.
            None => Task::ready(Ok(Vec::new())),
        }
    }

    /// The build-description file governing `entry`: the entry itself when
    /// it is such a file, or the one directly inside it when it is a
    /// directory.
    fn build_file_of(&self, entry: &dyn WorkspaceEntry) -> Option<PathBuf> {
        if entry.is_dir() {
            return entry
                .child(&self.build_file)
                .filter(|child| !child.is_dir())
                .map(|child| child.path().to_path_buf());
        }
        let name = entry.path().file_name()?;
        (name == self.build_file.as_str()).then(|| entry.path().to_path_buf())
    }
}
