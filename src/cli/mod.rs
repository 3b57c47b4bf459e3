//! Command-line interface for embedstage.
//!
//! Provides commands for extracting a bundle, running a loader against the
//! extracted entry file, resolving identifiers, cleaning up retained roots
//! and showing the resolved configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{self, ResolvedConfig};
use crate::core::resolver::{self, KnownPaths};
use crate::core::session::bundle_name;
use crate::core::{
    CleanupHandle, FailurePolicy, ImageHandling, MaterializationSession, Materialized,
    SessionFailure, SessionOptions,
};
use crate::domain::{SourceMode, DEFAULT_MANIFEST};
use crate::source::directory::IdentifierStyle;
use crate::source::{DirectorySource, ResourceSource};

pub mod launch;

use launch::{LaunchOutcome, Launcher};

/// embedstage - Materialize embedded bundle resources onto disk
#[derive(Parser, Debug)]
#[command(name = "embedstage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that build a session
#[derive(clap::Args, Debug, Clone)]
pub struct BundleArgs {
    /// Directory holding the bundle's resources
    pub bundle_dir: PathBuf,

    /// Treat the bundle as a culture-aware resource set
    #[arg(long)]
    pub culture_aware: bool,

    /// Manifest identifier for culture-aware sets
    #[arg(long, default_value = DEFAULT_MANIFEST)]
    pub manifest: String,

    /// Override the bundle group name (defaults to the directory name)
    #[arg(long)]
    pub group: Option<String>,
}

impl BundleArgs {
    fn mode(&self) -> SourceMode {
        if self.culture_aware {
            SourceMode::CultureAware {
                manifest: self.manifest.clone(),
            }
        } else {
            SourceMode::Plain
        }
    }

    fn open_source(&self) -> Result<DirectorySource> {
        let style = if self.culture_aware {
            IdentifierStyle::Slashed
        } else {
            IdentifierStyle::Dotted
        };

        match &self.group {
            Some(group) => DirectorySource::open_with_group(&self.bundle_dir, group.clone(), style),
            None => DirectorySource::open(&self.bundle_dir, style),
        }
    }
}

/// Flags that override configured session behavior
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SessionFlags {
    /// Retain materialized files on exit
    #[arg(long)]
    pub keep: bool,

    /// Fail on resources whose stream is unavailable
    #[arg(long)]
    pub strict: bool,

    /// Remove already-written files when materialization fails
    #[arg(long)]
    pub rollback: bool,

    /// Copy image bytes instead of re-encoding them
    #[arg(long)]
    pub verbatim_images: bool,

    /// Number of resources written concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl SessionFlags {
    fn apply(&self, config: &ResolvedConfig) -> SessionOptions {
        let mut options = config.session_options();
        options.keep |= self.keep;
        options.materializer.strict_missing |= self.strict;
        if self.rollback {
            options.failure_policy = FailurePolicy::Rollback;
        }
        if self.verbatim_images {
            options.materializer.image_handling = ImageHandling::Verbatim;
        }
        if let Some(jobs) = self.jobs {
            options.concurrency = jobs.max(1);
        }
        options
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Materialize a bundle and leave the files in place
    Extract {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Entry file name
        #[arg(short, long, default_value = "Main.qml")]
        entry: String,

        /// Print the materialization report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        flags: SessionFlags,
    },

    /// Materialize a bundle, run a loader on the entry file, then clean up
    Run {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Entry file name
        #[arg(short, long, default_value = "Main.qml")]
        entry: String,

        #[command(flatten)]
        flags: SessionFlags,

        /// Loader command; the entry path is appended as its last argument
        #[arg(last = true, required = true)]
        launcher: Vec<String>,
    },

    /// Print the relative path each identifier resolves to
    Resolve {
        /// Raw resource identifiers
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Bundle root stripped from plain identifiers
        #[arg(long, default_value = "")]
        root: String,

        /// Manifest file; enables culture-aware resolution
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Remove a bundle's materialized root directory
    Clean {
        #[command(flatten)]
        bundle: BundleArgs,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Extract {
                bundle,
                entry,
                json,
                flags,
            } => extract(&bundle, &entry, json, &flags).await,
            Commands::Run {
                bundle,
                entry,
                flags,
                launcher,
            } => run(&bundle, &entry, &flags, &launcher).await,
            Commands::Resolve {
                identifiers,
                root,
                manifest,
            } => resolve(&identifiers, &root, manifest.as_deref()).await,
            Commands::Clean { bundle } => clean(&bundle).await,
            Commands::Config => show_config(),
        }
    }
}

fn build_session(bundle: &BundleArgs, flags: &SessionFlags) -> Result<MaterializationSession> {
    let config = config::config()?;
    let source = bundle.open_source()?;
    Ok(MaterializationSession::new(
        Arc::new(source),
        bundle.mode(),
        flags.apply(config),
    ))
}

/// Log where a failed build left its files and convert to anyhow
fn report_failure(failure: SessionFailure) -> anyhow::Error {
    if let Some(partial) = &failure.partial {
        warn!(
            root = %partial.root().display(),
            written = partial.items().len(),
            "Partial materialization left on disk"
        );
    }
    anyhow::Error::new(failure).context("Materialization failed")
}

/// Materialize and keep the result
async fn extract(bundle: &BundleArgs, entry: &str, json: bool, flags: &SessionFlags) -> Result<()> {
    let session = build_session(bundle, flags)?;
    let args: Vec<String> = std::env::args().collect();

    let mut materialized = session
        .build(entry, args.as_slice())
        .await
        .map_err(report_failure)?;

    // Extraction outlives this process
    materialized.cleanup.set_keep_files(true);

    if json {
        let report = serde_json::to_string_pretty(&materialized.report())
            .context("Failed to serialize materialization report")?;
        println!("{}", report);
    } else {
        println!("{}", materialized.entry_path_string());
        eprintln!(
            "[{} files written to {}]",
            materialized.cleanup.items().len(),
            materialized.cleanup.root().display()
        );
    }

    Ok(())
}

/// Materialize in the background, hand the entry path to a loader, then tear down
async fn run(bundle: &BundleArgs, entry: &str, flags: &SessionFlags, command: &[String]) -> Result<()> {
    let launcher = Launcher::from_command_line(command)?;
    let session = build_session(bundle, flags)?;
    let args: Vec<String> = std::env::args().collect();

    let pending = session.spawn(entry.to_string(), args);
    let Materialized {
        entry_path,
        mut cleanup,
        ..
    } = pending
        .await
        .context("Materialization task panicked")?
        .map_err(report_failure)?;

    let outcome = launcher.run(&entry_path.to_string_lossy()).await;

    // Loader is gone (or never started) before the files are removed
    let teardown = cleanup.teardown();

    let outcome = outcome?;
    teardown.context("Failed to remove materialized resources")?;

    match outcome {
        LaunchOutcome::Exited(status) if status.success() => Ok(()),
        LaunchOutcome::Exited(status) => {
            anyhow::bail!("Loader '{}' exited with {}", launcher.program(), status)
        }
        LaunchOutcome::Interrupted => {
            info!("Interrupted");
            Ok(())
        }
    }
}

async fn resolve(identifiers: &[String], root: &str, manifest: Option<&Path>) -> Result<()> {
    let known = match manifest {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
            Some(KnownPaths::from_manifest(&text))
        }
        None => None,
    };

    for identifier in identifiers {
        println!(
            "{}\t{}",
            identifier,
            resolver::resolve(identifier, root, known.as_ref())
        );
    }

    Ok(())
}

/// Remove the root a previous `extract` (or `--keep` run) left behind
async fn clean(bundle: &BundleArgs) -> Result<()> {
    let config = config::config()?;
    let source = bundle.open_source()?;
    let identifiers = source.list_identifiers().await?;
    let first = identifiers
        .first()
        .with_context(|| format!("No resources in bundle: {}", bundle.bundle_dir.display()))?;

    let name = bundle_name(&bundle.mode(), source.group_name().as_deref(), first);
    let root = config.base_dir.join(format!("{}{}", config.hidden_prefix, name));

    let mut handle = CleanupHandle::new(Vec::new(), root.clone(), false);
    let report = handle.teardown()?;
    if report.root_removed {
        println!("Removed {}", root.display());
    } else {
        println!("Nothing to remove at {}", root.display());
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("embedstage configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Session:");
    println!("  Base directory:  {}", cfg.base_dir.display());
    println!("  Hidden prefix:   {}", cfg.hidden_prefix);
    println!("  Keep flag:       {}", cfg.keep_flag);
    println!("  Always keep:     {}", cfg.keep);
    println!("  Failure policy:  {:?}", cfg.failure_policy);
    println!("  Concurrency:     {}", cfg.concurrency);
    println!();
    println!("Materializer:");
    println!("  Images:          {:?}", cfg.materializer.image_handling);
    println!("  Strict missing:  {}", cfg.materializer.strict_missing);

    Ok(())
}
