//! Configuration management utilities.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::infra::workspace::find_workspace_root;

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".fastamend/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub tool: Tool,
    #[serde(default)]
    pub ignore: Ignore,
}

/// External tool invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    /// Launcher prefix for the query/amend commands.
    #[serde(default = "Tool::default_launcher")]
    pub launcher: Vec<String>,
    /// Workspace build tool executable used for target listings.
    #[serde(default = "Tool::default_build_tool")]
    pub build_tool: String,
    /// File name marking a directory as holding target definitions.
    #[serde(default = "Tool::default_build_file")]
    pub build_file: String,
}

impl Tool {
    fn default_launcher() -> Vec<String> {
        [
            "coursier",
            "launch",
            "org.scalameta:metals_2.12:0.8.5",
            "-r",
            "ivy2local",
            "--main",
            "scala.meta.internal.pantsbuild.BloopPants",
            "--",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect()
    }

    fn default_build_tool() -> String {
        "./pants".into()
    }

    fn default_build_file() -> String {
        "BUILD".into()
    }
}

impl Default for Tool {
    fn default() -> Self {
        Self {
            launcher: Self::default_launcher(),
            build_tool: Self::default_build_tool(),
            build_file: Self::default_build_file(),
        }
    }
}

/// Paths and globs excluded from workspace scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ignore {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub globs: Vec<String>,
}

impl Default for Ignore {
    fn default() -> Self {
        Self {
            paths: vec![
                ".git/".into(),
                ".bsp/".into(),
                "dist/".into(),
                ".pants.d/".into(),
            ],
            globs: Vec::new(),
        }
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    build_tool: Option<String>,
    build_file: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            build_tool: env::var("FASTAMEND_BUILD_TOOL").ok(),
            build_file: env::var("FASTAMEND_BUILD_FILE").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(build_tool: &str, build_file: &str) -> Self {
        Self {
            build_tool: Some(build_tool.to_owned()),
            build_file: Some(build_file.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace
    /// config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            tool: merge_tool(self.tool, other.tool),
            ignore: merge_ignore(self.ignore, other.ignore),
        }
    }
}

fn merge_tool(base: Tool, overlay: Tool) -> Tool {
    Tool {
        launcher: if overlay.launcher != Tool::default_launcher() {
            overlay.launcher
        } else {
            base.launcher
        },
        build_tool: if overlay.build_tool != Tool::default_build_tool() {
            overlay.build_tool
        } else {
            base.build_tool
        },
        build_file: if overlay.build_file != Tool::default_build_file() {
            overlay.build_file
        } else {
            base.build_file
        },
    }
}

fn merge_ignore(base: Ignore, overlay: Ignore) -> Ignore {
    let mut paths: BTreeSet<String> = base.paths.into_iter().collect();
    paths.extend(overlay.paths);

    let mut globs: BTreeSet<String> = base.globs.into_iter().collect();
    globs.extend(overlay.globs);

    Ignore {
        paths: paths.into_iter().collect(),
        globs: globs.into_iter().collect(),
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("fastamend/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_workspace_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(build_tool) = env.build_tool {
        config.tool.build_tool = build_tool;
    }
    if let Some(build_file) = env.build_file {
        config.tool.build_file = build_file;
    }
    config
}
