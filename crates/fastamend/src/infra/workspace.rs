//! Workspace discovery and host file-system handles.
//!
//! The selection engine and the target-list cache never touch the host file
//! system directly; they see it through [`WorkspaceEntry`], a capability
//! handle exposing a path, directory-ness, and child lookup. [`FsEntry`] is
//! the real implementation; tests substitute in-memory fakes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Executable that marks the root of an importable workspace.
const WORKSPACE_MARKER: &str = "pants";
/// Directory holding one build-config file per workspace import.
const BSP_DIR: &str = ".bsp";

/// Narrow handle over a host directory or file.
pub trait WorkspaceEntry: Send + Sync {
    fn path(&self) -> &Path;
    fn is_dir(&self) -> bool;
    /// Direct child by name, if it exists.
    fn child(&self, name: &str) -> Option<Box<dyn WorkspaceEntry>>;
    /// All direct children, in name order.
    fn children(&self) -> Vec<Box<dyn WorkspaceEntry>>;
}

/// [`WorkspaceEntry`] backed by `std::fs`.
#[derive(Debug, Clone)]
pub struct FsEntry {
    path: PathBuf,
}

impl FsEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkspaceEntry for FsEntry {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_dir(&self) -> bool {
        self.path.is_dir()
    }

    fn child(&self, name: &str) -> Option<Box<dyn WorkspaceEntry>> {
        let child = self.path.join(name);
        child
            .exists()
            .then(|| Box::new(FsEntry::new(child)) as Box<dyn WorkspaceEntry>)
    }

    fn children(&self) -> Vec<Box<dyn WorkspaceEntry>> {
        let Ok(entries) = fs::read_dir(&self.path) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        paths
            .into_iter()
            .map(|path| Box::new(FsEntry::new(path)) as Box<dyn WorkspaceEntry>)
            .collect()
    }
}

/// Errors locating the workspace import to synchronize.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no workspace import found under {}", root.display())]
    NotFound { root: PathBuf },
    #[error("found {count} workspace imports under {}; exactly one is supported", root.display())]
    Multiple { root: PathBuf, count: usize },
    #[error("build-config path {} has no file name or parent directory", path.display())]
    InvalidConfig { path: PathBuf },
    #[error("failed to inspect workspace")]
    Io(#[from] io::Error),
}

/// One binding between a workspace root and the external tool's
/// per-import build-config file. The unit of synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceImport {
    bsp_config: PathBuf,
    home: PathBuf,
    name: String,
    workspace_root: PathBuf,
}

impl WorkspaceImport {
    pub fn new(
        bsp_config: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
    ) -> Result<Self, ImportError> {
        let bsp_config = bsp_config.into();
        let (name, home) = match (bsp_config.file_name(), bsp_config.parent()) {
            (Some(name), Some(home)) => (
                name.to_string_lossy().into_owned(),
                home.to_path_buf(),
            ),
            _ => {
                return Err(ImportError::InvalidConfig { path: bsp_config });
            }
        };
        Ok(Self {
            bsp_config,
            home,
            name,
            workspace_root: workspace_root.into(),
        })
    }

    pub fn bsp_config(&self) -> &Path {
        &self.bsp_config
    }

    /// File name of the build-config file, as passed to the external tool.
    pub fn config_name(&self) -> &str {
        &self.name
    }

    /// Directory containing the build-config file; exported to the external
    /// tool as `FASTPASS_HOME`.
    pub fn fastpass_home(&self) -> &Path {
        &self.home
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

/// Ascend from `start` to the nearest directory carrying the workspace
/// marker executable.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(WORKSPACE_MARKER).is_file() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

/// Every import bound to the workspace: one per build-config file under
/// `.bsp/`.
pub fn discover_imports(workspace_root: &Path) -> Result<Vec<WorkspaceImport>, ImportError> {
    let bsp_dir = workspace_root.join(BSP_DIR);
    if !bsp_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut configs: Vec<PathBuf> = fs::read_dir(&bsp_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    configs.sort();
    configs
        .into_iter()
        .map(|config| WorkspaceImport::new(config, workspace_root))
        .collect()
}

/// The single import this workspace is bound to. Zero or several bound
/// imports is a user-facing error, not a crash.
pub fn locate_import(workspace_root: &Path) -> Result<WorkspaceImport, ImportError> {
    let mut imports = discover_imports(workspace_root)?;
    match imports.len() {
        1 => Ok(imports.remove(0)),
        0 => Err(ImportError::NotFound {
            root: workspace_root.to_path_buf(),
        }),
        count => Err(ImportError::Multiple {
            root: workspace_root.to_path_buf(),
            count,
        }),
    }
}
