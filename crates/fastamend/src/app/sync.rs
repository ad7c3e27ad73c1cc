//! Fetch, diff and amend the externally recorded selection.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use thiserror::Error;

use crate::app::task::Task;
use crate::domain::selection::Selection;
use crate::infra::tool::ImportTool;
use crate::infra::workspace::WorkspaceImport;

/// Result of one synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The user cancelled the edit; nothing was compared or written.
    Cancelled,
    /// Edited and recorded selections were set-equal; nothing was written.
    Unchanged,
    /// The recorded selection was rewritten and a project refresh requested.
    Amended,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("an amend is already in flight for `{import}`")]
pub struct AmendInFlight {
    pub import: String,
}

/// Collaborator notified after a successful amend so the host can re-import
/// the project.
pub trait ProjectRefresher: Send + Sync {
    fn refresh(&self);
}

/// Refresher that only records the request in the log; used by drivers with
/// no project-import subsystem attached.
pub struct LogRefresher;

impl ProjectRefresher for LogRefresher {
    fn refresh(&self) {
        tracing::info!("import configuration changed; project refresh requested");
    }
}

/// Drives the diff → amend → refresh workflow against the external tool.
///
/// All external invocations run on worker tasks; one engine serves one
/// interactive session. Amends are mutually exclusive per import: a second
/// synchronize for an import whose amend is still running fails fast instead
/// of racing the first.
pub struct SyncEngine {
    tool: Arc<dyn ImportTool>,
    refresher: Arc<dyn ProjectRefresher>,
    amending: Arc<Mutex<HashSet<PathBuf>>>,
}

impl SyncEngine {
    pub fn new(tool: Arc<dyn ImportTool>, refresher: Arc<dyn ProjectRefresher>) -> Self {
        Self {
            tool,
            refresher,
            amending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The selection currently recorded by the external tool.
    pub fn fetch_selection(&self, import: &WorkspaceImport) -> Task<Selection> {
        let tool = Arc::clone(&self.tool);
        let import = import.clone();
        Task::spawn("fetch-selection", move || {
            let stdout = tool
                .query_selection(&import)
                .with_context(|| format!("querying selection for {}", import.config_name()))?;
            let selection = Selection::parse_lines(&stdout)
                .with_context(|| format!("bad address in selection for {}", import.config_name()))?;
            Ok(selection)
        })
    }

    /// Rewrite the recorded selection to exactly `selection`.
    pub fn amend(&self, import: &WorkspaceImport, selection: &Selection) -> anyhow::Result<()> {
        self.tool
            .amend(import, &selection.serialized())
            .with_context(|| format!("amending {}", import.config_name()))
    }

    /// Compare the recorded selection with the user's edit and amend when
    /// they differ.
    ///
    /// `edited` is `None` when the user cancelled. The comparison is set
    /// equality; an amend failure is surfaced through the task and the
    /// refresh notification is skipped.
    pub fn synchronize(
        &self,
        import: &WorkspaceImport,
        recorded: Task<Selection>,
        edited: Option<Selection>,
    ) -> Task<SyncOutcome> {
        let Some(edited) = edited else {
            tracing::debug!(import = import.config_name(), "selection edit cancelled");
            return Task::ready(Ok(SyncOutcome::Cancelled));
        };

        let tool = Arc::clone(&self.tool);
        let refresher = Arc::clone(&self.refresher);
        let amending = Arc::clone(&self.amending);
        let import = import.clone();

        Task::spawn("synchronize", move || {
            let recorded = recorded
                .wait()
                .context("fetching the recorded selection")?;

            tracing::debug!(import = import.config_name(), "diffing selections");
            if recorded == edited {
                tracing::debug!(import = import.config_name(), "selection unchanged");
                return Ok(SyncOutcome::Unchanged);
            }

            if !amending.lock().insert(import.bsp_config().to_path_buf()) {
                return Err(AmendInFlight {
                    import: import.config_name().to_owned(),
                }
                .into());
            }
            tracing::debug!(import = import.config_name(), "amending selection");
            let amended = tool.amend(&import, &edited.serialized());
            amending.lock().remove(import.bsp_config());

            match amended {
                Ok(()) => {
                    tracing::debug!(import = import.config_name(), "refreshing project");
                    refresher.refresh();
                    Ok(SyncOutcome::Amended)
                }
                Err(err) => {
                    tracing::error!(
                        import = import.config_name(),
                        error = %err,
                        "amend failed; project refresh skipped"
                    );
                    Err(err).context("amending the recorded selection")
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::address::Address;
    use crate::infra::tool::ProcessError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[derive(Default)]
    struct ToolCalls {
        queries: AtomicUsize,
        amends: Mutex<Vec<Vec<String>>>,
    }

    /// Scriptable in-memory tool double.
    struct FakeTool {
        calls: Arc<ToolCalls>,
        stdout: String,
        amend_error: Option<String>,
        amend_gate: Option<Mutex<mpsc::Receiver<()>>>,
    }

    impl FakeTool {
        fn recording(stdout: &str) -> (Arc<Self>, Arc<ToolCalls>) {
            let calls = Arc::new(ToolCalls::default());
            let tool = Arc::new(Self {
                calls: Arc::clone(&calls),
                stdout: stdout.to_owned(),
                amend_error: None,
                amend_gate: None,
            });
            (tool, calls)
        }

        fn failing_amend(stdout: &str, stderr: &str) -> (Arc<Self>, Arc<ToolCalls>) {
            let calls = Arc::new(ToolCalls::default());
            let tool = Arc::new(Self {
                calls: Arc::clone(&calls),
                stdout: stdout.to_owned(),
                amend_error: Some(stderr.to_owned()),
                amend_gate: None,
            });
            (tool, calls)
        }
    }

    impl ImportTool for FakeTool {
        fn query_selection(&self, _import: &WorkspaceImport) -> Result<String, ProcessError> {
            self.calls.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.stdout.clone())
        }

        fn amend(&self, _import: &WorkspaceImport, targets: &[String]) -> Result<(), ProcessError> {
            if let Some(gate) = &self.amend_gate {
                let _ = gate.lock().recv();
            }
            self.calls.amends.lock().push(targets.to_vec());
            match &self.amend_error {
                Some(stderr) => Err(ProcessError::Failed {
                    command: "amend".into(),
                    code: 1,
                    stderr: stderr.clone(),
                }),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct CountingRefresher {
        refreshes: AtomicUsize,
    }

    impl ProjectRefresher for CountingRefresher {
        fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn import() -> WorkspaceImport {
        WorkspaceImport::new("/ws/.bsp/demo.json", "/ws").unwrap()
    }

    fn selection(entries: &[Address]) -> Selection {
        entries.iter().cloned().collect()
    }

    #[test]
    fn fetch_parses_query_output() {
        let (tool, _) = FakeTool::recording("a:b\nc::\n");
        let engine = SyncEngine::new(tool, Arc::new(LogRefresher));

        let fetched = engine.fetch_selection(&import()).wait().unwrap();
        assert_eq!(
            fetched,
            selection(&[Address::single("a", "b"), Address::all_deep("c")])
        );
    }

    #[test]
    fn fetch_of_blank_output_is_empty() {
        let (tool, _) = FakeTool::recording("");
        let engine = SyncEngine::new(tool, Arc::new(LogRefresher));
        assert!(engine.fetch_selection(&import()).wait().unwrap().is_empty());
    }

    #[test]
    fn fetch_fails_on_bad_address() {
        let (tool, _) = FakeTool::recording("a:b\ngarbage\n");
        let engine = SyncEngine::new(tool, Arc::new(LogRefresher));
        let err = engine.fetch_selection(&import()).wait().unwrap_err();
        assert!(err.to_string().contains("garbage"));
    }

    #[test]
    fn amend_serializes_the_selection_in_address_order() {
        let (tool, calls) = FakeTool::recording("");
        let engine = SyncEngine::new(tool, Arc::new(LogRefresher));

        let edited = selection(&[Address::all_deep("b"), Address::single("a", "t")]);
        engine.amend(&import(), &edited).unwrap();

        assert_eq!(
            *calls.amends.lock(),
            vec![vec!["a:t".to_owned(), "b::".to_owned()]]
        );
    }

    #[test]
    fn equal_sets_skip_the_amend() {
        let (tool, calls) = FakeTool::recording("a:x\nb:y\n");
        let refresher = Arc::new(CountingRefresher::default());
        let engine = SyncEngine::new(tool, refresher.clone());
        let import = import();

        // Same entries, different construction order.
        let edited = selection(&[Address::single("b", "y"), Address::single("a", "x")]);
        let recorded = engine.fetch_selection(&import);
        let outcome = engine
            .synchronize(&import, recorded, Some(edited))
            .wait()
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert!(calls.amends.lock().is_empty());
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn changed_selection_is_amended_then_refreshed() {
        let (tool, calls) = FakeTool::recording("a:x\n");
        let refresher = Arc::new(CountingRefresher::default());
        let engine = SyncEngine::new(tool, refresher.clone());
        let import = import();

        let edited = selection(&[Address::single("a", "x"), Address::single("c", "z")]);
        let recorded = engine.fetch_selection(&import);
        let outcome = engine
            .synchronize(&import, recorded, Some(edited))
            .wait()
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Amended);
        assert_eq!(*calls.amends.lock(), vec![vec![
            "a:x".to_owned(),
            "c:z".to_owned()
        ]]);
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_edit_touches_nothing() {
        let (tool, calls) = FakeTool::recording("a:x\n");
        let refresher = Arc::new(CountingRefresher::default());
        let engine = SyncEngine::new(tool, refresher.clone());
        let import = import();

        let recorded = engine.fetch_selection(&import);
        let outcome = engine.synchronize(&import, recorded, None).wait().unwrap();

        assert_eq!(outcome, SyncOutcome::Cancelled);
        assert!(calls.amends.lock().is_empty());
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn amend_failure_skips_refresh_and_surfaces_stderr() {
        let (tool, calls) = FakeTool::failing_amend("a:x\n", "no such target");
        let refresher = Arc::new(CountingRefresher::default());
        let engine = SyncEngine::new(tool, refresher.clone());
        let import = import();

        let edited = selection(&[Address::single("c", "z")]);
        let recorded = engine.fetch_selection(&import);
        let err = engine
            .synchronize(&import, recorded, Some(edited))
            .wait()
            .unwrap_err();

        assert!(err.to_string().contains("no such target"));
        assert_eq!(calls.amends.lock().len(), 1);
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn second_amend_for_same_import_fails_fast() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let calls = Arc::new(ToolCalls::default());
        let tool = Arc::new(FakeTool {
            calls: Arc::clone(&calls),
            stdout: "a:x\n".to_owned(),
            amend_error: None,
            amend_gate: Some(Mutex::new(gate_rx)),
        });
        let engine = SyncEngine::new(tool, Arc::new(LogRefresher));
        let import = import();
        let edited = selection(&[Address::single("c", "z")]);

        let first = engine.synchronize(
            &import,
            engine.fetch_selection(&import),
            Some(edited.clone()),
        );
        // Wait until the first pass holds the amend slot.
        while !engine.amending.lock().contains(import.bsp_config()) {
            std::thread::yield_now();
        }

        let second = engine
            .synchronize(&import, engine.fetch_selection(&import), Some(edited))
            .wait();
        assert!(second.unwrap_err().to_string().contains("already in flight"));

        gate_tx.send(()).unwrap();
        assert_eq!(first.wait().unwrap(), SyncOutcome::Amended);
        assert_eq!(calls.amends.lock().len(), 1);
    }
}
