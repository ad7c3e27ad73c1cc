//! Workspace scanning for target-defining directories.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{WalkBuilder, WalkState};

use crate::infra::config::Config;

/// Result of scanning a workspace root for build-description files.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Workspace-relative directories holding a build-description file,
    /// in path order.
    pub dirs: Vec<PathBuf>,
    pub root: PathBuf,
}

/// Scanner walking the workspace respecting ignore rules and collecting the
/// directories eligible for target queries.
#[derive(Debug, Default)]
pub struct Scanner;

impl Scanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, root: &Path, config: &Config) -> Result<ScanResult> {
        let matcher = Arc::new(build_ignore_matcher(config)?);
        let build_file = config.tool.build_file.clone();

        let mut builder = WalkBuilder::new(root);
        builder.git_ignore(true).hidden(true);

        let root_buf = root.to_path_buf();
        builder.filter_entry({
            let matcher = matcher.clone();
            let root = root_buf.clone();
            move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                !matcher.should_skip(rel)
            }
        });

        let dirs = Mutex::new(Vec::new());

        builder.build_parallel().run(|| {
            let dirs = &dirs;
            let root = root_buf.clone();
            let build_file = build_file.clone();
            Box::new(move |result| match result {
                Ok(entry) => {
                    if entry.file_name() == build_file.as_str()
                        && entry.file_type().is_some_and(|kind| kind.is_file())
                        && let Some(parent) = entry.path().parent()
                        && let Ok(mut guard) = dirs.lock()
                    {
                        let rel = parent.strip_prefix(&root).unwrap_or(parent);
                        guard.push(rel.to_path_buf());
                    }
                    WalkState::Continue
                }
                Err(err) => {
                    tracing::warn!(error = %err, "scanner error");
                    WalkState::Continue
                }
            })
        });

        let mut dirs = dirs.into_inner().unwrap_or_default();
        dirs.sort();

        Ok(ScanResult {
            dirs,
            root: root_buf,
        })
    }
}

#[derive(Debug, Clone)]
struct IgnoreMatcher {
    globs: Option<GlobSet>,
}

impl IgnoreMatcher {
    fn should_skip(&self, rel: &Path) -> bool {
        self.globs.as_ref().is_some_and(|set| set.is_match(rel))
    }
}

fn build_ignore_matcher(config: &Config) -> Result<IgnoreMatcher> {
    let mut builder = GlobSetBuilder::new();

    for pattern in &config.ignore.paths {
        for expanded in expand_dir_pattern(pattern) {
            let glob = Glob::new(&expanded).context("invalid ignore path pattern")?;
            builder.add(glob);
        }
    }

    for glob in &config.ignore.globs {
        let glob = Glob::new(glob).context("invalid ignore glob")?;
        builder.add(glob);
    }

    let globs = builder.build().context("failed to build ignore matcher")?;

    Ok(IgnoreMatcher { globs: Some(globs) })
}

fn expand_dir_pattern(raw: &str) -> Vec<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    vec![
        trimmed.to_owned(),
        format!("{trimmed}/**"),
        format!("**/{trimmed}"),
        format!("**/{trimmed}/**"),
    ]
}
