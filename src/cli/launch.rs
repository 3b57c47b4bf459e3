//! External loader launched against the materialized entry file.
//!
//! The loader (a QML runtime, a browser, a viewer) is an ordinary process
//! that receives the entry path as its last argument.

use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

/// A program that opens the entry file
#[derive(Debug, Clone)]
pub struct Launcher {
    program: String,
    args: Vec<String>,
}

/// How the loader stopped
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The loader exited on its own
    Exited(ExitStatus),

    /// Ctrl-C arrived first and the loader was killed
    Interrupted,
}

impl Launcher {
    /// Build from a command line: program followed by its leading arguments
    pub fn from_command_line(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("No launcher command given after `--`")?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the loader, entry path last
    pub fn arguments(&self, entry_path: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(entry_path.to_string());
        args
    }

    /// Run the loader to completion, killing it on Ctrl-C
    pub async fn run(&self, entry_path: &str) -> Result<LaunchOutcome> {
        let mut child = Command::new(&self.program)
            .args(self.arguments(entry_path))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn loader '{}'", self.program))?;

        info!(program = %self.program, entry = entry_path, "Loader started");

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .with_context(|| format!("Failed to wait for loader '{}'", self.program))?;
                info!(%status, "Loader exited");
                Ok(LaunchOutcome::Exited(status))
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping loader");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill loader");
                }
                Ok(LaunchOutcome::Interrupted)
            }
        }
    }
}
