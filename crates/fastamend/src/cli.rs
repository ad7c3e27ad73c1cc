//! Command-line driver for the synchronization workflow.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use crate::app::cache::TargetListCache;
use crate::app::reconcile::{self, DirectoryChoice, DirectoryState};
use crate::app::scan::Scanner;
use crate::app::sync::{LogRefresher, SyncEngine, SyncOutcome};
use crate::app::task::Task;
use crate::domain::address::Address;
use crate::domain::selection::Selection;
use crate::infra::config::Config;
use crate::infra::tool::FastpassCli;
use crate::infra::workspace::{self, FsEntry, WorkspaceImport};

#[derive(Parser)]
#[command(
    name = "fastamend",
    version,
    about = "Amend which build targets are imported into the workspace"
)]
struct Cli {
    /// Workspace root; discovered from the current directory when omitted.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the recorded target selection.
    Status {
        /// Emit the selection as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Show the selection state of one directory.
    Show { dir: String },
    /// List target-defining directories, or the targets available in one.
    Targets { dir: Option<String> },
    /// Rewrite the recorded selection and request a project refresh.
    Amend {
        /// Addresses forming the new selection (`path:target`, `path:`,
        /// `path::`).
        addresses: Vec<String>,
        /// Add to the recorded selection instead of replacing it.
        #[arg(long)]
        add: bool,
    },
    /// Edit one directory's selection and synchronize the result.
    Select {
        dir: String,
        /// Whole-directory mode to apply.
        #[arg(long, conflicts_with = "target")]
        mode: Option<Mode>,
        /// Toggle a single named target instead.
        #[arg(long)]
        target: Option<String>,
        /// Uncheck the named target.
        #[arg(long, requires = "target")]
        off: bool,
    },
    /// Decode a packaged-artifact path back to a target address.
    Decode { path: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Drop the whole-directory entry; individual targets stay editable.
    None,
    /// Import every target directly in the directory.
    Flat,
    /// Import every target in the directory and below.
    Deep,
}

impl From<Mode> for DirectoryChoice {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::None => DirectoryChoice::None,
            Mode::Flat => DirectoryChoice::Flat,
            Mode::Deep => DirectoryChoice::Deep,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { path } => decode(&path),
        Commands::Status { json } => Session::open(cli.workspace)?.status(json),
        Commands::Show { dir } => Session::open(cli.workspace)?.show(&dir),
        Commands::Targets { dir } => {
            let session = Session::open(cli.workspace)?;
            match dir {
                Some(dir) => session.targets_in(&dir),
                None => session.target_dirs(),
            }
        }
        Commands::Amend { addresses, add } => {
            Session::open(cli.workspace)?.amend(&addresses, add)
        }
        Commands::Select {
            dir,
            mode,
            target,
            off,
        } => Session::open(cli.workspace)?.select(&dir, mode, target.as_deref(), off),
    }
}

/// One interactive session: resolved workspace, its single import, and the
/// engine and cache working against it.
struct Session {
    config: Config,
    root: PathBuf,
    import: WorkspaceImport,
    engine: SyncEngine,
    cache: TargetListCache,
}

impl Session {
    fn open(workspace: Option<PathBuf>) -> Result<Self> {
        let config = Config::load()?;
        let root = match workspace {
            Some(root) => root,
            None => {
                let cwd = env::current_dir().context("unable to determine working directory")?;
                match workspace::find_workspace_root(&cwd) {
                    Some(root) => root,
                    None => bail!(
                        "no workspace root found above {}; pass --workspace",
                        cwd.display()
                    ),
                }
            }
        };
        let import = workspace::locate_import(&root)?;

        let tool = Arc::new(FastpassCli::new(&config, &root)?);
        let engine = SyncEngine::new(tool.clone(), Arc::new(LogRefresher));
        let cache = TargetListCache::new(tool, config.tool.build_file.clone());

        Ok(Self {
            config,
            root,
            import,
            engine,
            cache,
        })
    }

    fn status(&self, json: bool) -> Result<()> {
        let selection = self.engine.fetch_selection(&self.import).wait()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&selection.serialized())?);
            return Ok(());
        }
        if selection.is_empty() {
            println!("no targets imported for {}", self.import.config_name());
            return Ok(());
        }
        for address in selection.serialized() {
            println!("{address}");
        }
        Ok(())
    }

    fn show(&self, dir: &str) -> Result<()> {
        let selection = self.engine.fetch_selection(&self.import).wait()?;
        let panel = reconcile::view(dir, &selection);

        if panel.blocked {
            println!("{dir}: blocked (an ancestor imports recursively)");
            return Ok(());
        }
        match panel.state {
            DirectoryState::Flat => println!("{dir}: all targets in directory ({dir}:)"),
            DirectoryState::Deep => println!("{dir}: all targets recursively ({dir}::)"),
            DirectoryState::Targets => {
                let available = self.cache.get(&FsEntry::new(self.root.join(dir))).wait()?;
                if available.is_empty() {
                    println!("{dir}: no targets defined");
                    return Ok(());
                }
                for address in available {
                    let mark = address
                        .target()
                        .is_some_and(|target| panel.checked.contains(target));
                    println!("[{}] {address}", if mark { "x" } else { " " });
                }
            }
        }
        Ok(())
    }

    fn target_dirs(&self) -> Result<()> {
        let result = Scanner::new().scan(&self.root, &self.config)?;
        for dir in result.dirs {
            let dir = dir.to_string_lossy();
            if dir.is_empty() {
                println!(".");
            } else {
                println!("{dir}");
            }
        }
        Ok(())
    }

    fn targets_in(&self, dir: &str) -> Result<()> {
        let available = self.cache.get(&FsEntry::new(self.root.join(dir))).wait()?;
        for address in available {
            println!("{address}");
        }
        Ok(())
    }

    fn amend(&self, addresses: &[String], add: bool) -> Result<()> {
        let parsed = addresses
            .iter()
            .map(|raw| Address::parse(raw))
            .collect::<Result<Selection, _>>()?;

        let recorded = self.engine.fetch_selection(&self.import);
        let edited = if add {
            let mut merged = recorded.wait()?;
            merged.extend(parsed.iter().cloned());
            merged
        } else {
            parsed
        };

        self.synchronize_and_report(recorded, edited)
    }

    fn select(
        &self,
        dir: &str,
        mode: Option<Mode>,
        target: Option<&str>,
        off: bool,
    ) -> Result<()> {
        let recorded = self.engine.fetch_selection(&self.import);
        let current = recorded.wait()?;

        let edited = match (mode, target) {
            (Some(mode), None) => reconcile::apply(&current, dir, mode.into()),
            (None, Some(target)) => reconcile::toggle_target(&current, dir, target, !off)?,
            _ => bail!("pass exactly one of --mode or --target"),
        };
        self.synchronize_and_report(recorded, edited)
    }

    fn synchronize_and_report(&self, recorded: Task<Selection>, edited: Selection) -> Result<()> {
        let entries = edited.len();
        let outcome = self
            .engine
            .synchronize(&self.import, recorded, Some(edited))
            .wait()?;
        match outcome {
            SyncOutcome::Unchanged => {
                println!("selection unchanged ({entries} entries)");
            }
            SyncOutcome::Amended => {
                println!(
                    "amended {}: {entries} entries now imported",
                    self.import.config_name()
                );
            }
            SyncOutcome::Cancelled => {}
        }
        Ok(())
    }
}

fn decode(path: &Path) -> Result<()> {
    match Address::decode_artifact_path(path) {
        Some(address) => {
            println!("{address}");
            Ok(())
        }
        None => bail!("no target address encoded in {}", path.display()),
    }
}
