//! CliBackend - IRemoteBackend implementation driving an object-store CLI
//!
//! Every port operation spawns one process of the configured program
//! (`gdrive` by default) and captures its combined output.
//!
//! ## Design Notes
//!
//! - Arguments are passed as an argv vector, never through a shell, so file
//!   names with spaces or shell metacharacters reach the CLI unchanged.
//! - Create and update run with the working directory set to the local
//!   object's parent and pass only the base name, so the remote object is
//!   named after the local one.
//! - Creation uses `--print-only-id`; the trimmed output is the new id.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use treemirror_core::ports::{IRemoteBackend, RemoteParent};

use crate::RemoteError;

/// Default program used when none is configured
pub const DEFAULT_PROGRAM: &str = "gdrive";

/// Remote backend that shells out to an object-store CLI
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
}

impl CliBackend {
    /// Creates a backend invoking `program` for every operation
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The program this backend invokes
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the program with `args`, optionally inside `cwd`.
    ///
    /// Returns the trimmed combined stdout and stderr on success.
    async fn run(&self, cwd: Option<&Path>, args: Vec<OsString>) -> Result<String, RemoteError> {
        let mut command = Command::new(&self.program);
        command.args(&args).kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        debug!(program = %self.program, ?args, cwd = ?cwd, "Running remote command");

        let output = command.output().await.map_err(|source| RemoteError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let text = combined_output(&output);

        if !output.status.success() {
            warn!(
                program = %self.program,
                status = %output.status,
                output = %text,
                "Remote command failed"
            );
            return Err(RemoteError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                output: text,
            });
        }

        Ok(text)
    }

    async fn create(&self, op: &str, local: &Path, parent: RemoteParent<'_>) -> Result<String> {
        let (dir, name) = split_local(local)?;
        let id = self
            .run(Some(dir), create_args(op, name, parent))
            .await
            .with_context(|| format!("{op} {}", local.display()))?;
        if id.is_empty() {
            return Err(RemoteError::EmptyId {
                program: self.program.clone(),
            }
            .into());
        }
        Ok(id)
    }
}

impl Default for CliBackend {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

#[async_trait]
impl IRemoteBackend for CliBackend {
    async fn create_directory(&self, local: &Path, parent: RemoteParent<'_>) -> Result<String> {
        self.create("mkdir", local, parent).await
    }

    async fn upload_file(&self, local: &Path, parent: RemoteParent<'_>) -> Result<String> {
        self.create("upload", local, parent).await
    }

    async fn update_file(&self, local: &Path, remote_id: &str) -> Result<()> {
        let (dir, name) = split_local(local)?;
        self.run(Some(dir), update_args(remote_id, name))
            .await
            .with_context(|| format!("update {}", local.display()))?;
        Ok(())
    }

    async fn delete_recursive(&self, remote_id: &str) -> Result<()> {
        self.run(None, delete_args(remote_id))
            .await
            .with_context(|| format!("delete {remote_id}"))?;
        Ok(())
    }

    async fn switch_account(&self, account: &str) -> Result<()> {
        let output = self
            .run(None, switch_account_args(account))
            .await
            .with_context(|| format!("switch account to {account}"))?;
        debug!(account, output = %output, "Switched remote account");
        Ok(())
    }
}

// ============================================================================
// Argument building
// ============================================================================

/// `files <op> <name> [--parent <id>] --print-only-id`
pub fn create_args(op: &str, name: &OsStr, parent: RemoteParent<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["files".into(), op.into(), name.to_os_string()];
    if let RemoteParent::Folder(id) = parent {
        args.push("--parent".into());
        args.push(id.into());
    }
    args.push("--print-only-id".into());
    args
}

/// `files update <id> <name>`
pub fn update_args(remote_id: &str, name: &OsStr) -> Vec<OsString> {
    vec![
        "files".into(),
        "update".into(),
        remote_id.into(),
        name.to_os_string(),
    ]
}

/// `files delete <id> --recursive`
pub fn delete_args(remote_id: &str) -> Vec<OsString> {
    vec![
        "files".into(),
        "delete".into(),
        remote_id.into(),
        "--recursive".into(),
    ]
}

/// `account switch <name>`
pub fn switch_account_args(account: &str) -> Vec<OsString> {
    vec!["account".into(), "switch".into(), account.into()]
}

fn split_local(local: &Path) -> Result<(&Path, &OsStr), RemoteError> {
    match (local.parent(), local.file_name()) {
        (Some(dir), Some(name)) => Ok((dir, name)),
        _ => Err(RemoteError::InvalidPath(local.display().to_string())),
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim().to_string()
}
