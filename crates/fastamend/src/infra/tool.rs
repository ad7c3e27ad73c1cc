//! Subprocess client for the external build-graph tool.
//!
//! Both commands share a configurable launcher prefix and run from the
//! workspace root with `FASTPASS_HOME` pointing at the directory holding the
//! import's build-config file. Available-target listings go through the
//! workspace's own build tool executable.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use thiserror::Error;

use crate::domain::address::Address;
use crate::domain::selection::Selection;
use crate::infra::config::Config;
use crate::infra::workspace::WorkspaceImport;

const HOME_ENV: &str = "FASTPASS_HOME";

/// External tool invocation failures, surfaced to the user and never
/// retried automatically.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with status {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Query and amend operations on the external tool's recorded selection.
pub trait ImportTool: Send + Sync {
    /// Raw stdout of the query command: one address per line.
    fn query_selection(&self, import: &WorkspaceImport) -> Result<String, ProcessError>;

    /// Rewrite the recorded selection to exactly `targets`.
    fn amend(&self, import: &WorkspaceImport, targets: &[String]) -> Result<(), ProcessError>;
}

/// Collaborator listing the addresses available under one build file.
pub trait TargetLister: Send + Sync {
    fn list_targets(&self, build_file: &Path) -> anyhow::Result<Vec<Address>>;
}

/// Real client shelling out to the configured launcher and build tool.
pub struct FastpassCli {
    launcher: Vec<String>,
    build_tool: PathBuf,
    workspace_root: PathBuf,
}

impl FastpassCli {
    pub fn new(config: &Config, workspace_root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let launcher = config.tool.launcher.clone();
        anyhow::ensure!(
            !launcher.is_empty(),
            "tool.launcher must name an executable"
        );
        Ok(Self {
            launcher,
            build_tool: PathBuf::from(&config.tool.build_tool),
            workspace_root: workspace_root.into(),
        })
    }

    fn launcher_command(&self, import: &WorkspaceImport) -> Command {
        let mut command = Command::new(&self.launcher[0]);
        command
            .args(&self.launcher[1..])
            .current_dir(import.workspace_root())
            .env(HOME_ENV, import.fastpass_home());
        command
    }

    fn run(mut command: Command, description: &str) -> Result<String, ProcessError> {
        tracing::debug!(command = description, "running external tool");
        let output = command.output().map_err(|source| ProcessError::Spawn {
            command: description.to_owned(),
            source,
        })?;
        if !output.status.success() {
            return Err(ProcessError::Failed {
                command: description.to_owned(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ImportTool for FastpassCli {
    fn query_selection(&self, import: &WorkspaceImport) -> Result<String, ProcessError> {
        let mut command = self.launcher_command(import);
        command.args(["info", import.config_name()]);
        Self::run(command, &format!("info {}", import.config_name()))
    }

    fn amend(&self, import: &WorkspaceImport, targets: &[String]) -> Result<(), ProcessError> {
        let mut command = self.launcher_command(import);
        command
            .args(["amend", import.config_name(), "--targets-list"])
            .arg(targets.join(","));
        Self::run(command, &format!("amend {}", import.config_name()))?;
        Ok(())
    }
}

impl TargetLister for FastpassCli {
    fn list_targets(&self, build_file: &Path) -> anyhow::Result<Vec<Address>> {
        let dir = build_file.parent().unwrap_or(build_file);
        let rel = dir.strip_prefix(&self.workspace_root).unwrap_or(dir);
        let spec = format!("{}:", rel.display());

        let mut command = Command::new(&self.build_tool);
        command
            .args(["list", &spec])
            .current_dir(&self.workspace_root);
        let stdout = Self::run(command, &format!("list {spec}"))
            .with_context(|| format!("listing targets under {}", rel.display()))?;

        let selection = Selection::parse_lines(&stdout)
            .with_context(|| format!("bad address in target listing for {}", rel.display()))?;
        Ok(selection.iter().cloned().collect())
    }
}
