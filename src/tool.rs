// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command line tools.
//!
//! Launchd-me leans on the tools macOS already ships to validate and activate
//! plist files:
//!
//! - `plutil -lint <path>` checks plist syntax.
//! - `launchctl load <path>` and `launchctl unload <path>` hand a job to, or
//!   take it away from, launchd.
//!
//! All of them are invoked in the same `<tool> <command> <path>` shape, and
//! only their exit status matters. Captured output is kept for diagnosis when
//! they fail.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Layer of indirection for running external tools.
pub trait ToolRunner {
    /// Run `<tool> <command> <path>` to completion.
    ///
    /// # Errors
    ///
    /// - Return [`ToolError::Spawn`] if tool cannot be started.
    /// - Return [`ToolError::Failed`] if tool exits with non-zero status.
    fn run(&self, tool: &str, command: &str, path: &Path) -> Result<()>;
}

/// Run tools as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTools;

impl ToolRunner for SystemTools {
    #[instrument(skip(self), level = "debug")]
    fn run(&self, tool: &str, command: &str, path: &Path) -> Result<()> {
        let output = syscall_non_interactive(tool, [OsStr::new(command), path.as_os_str()])
            .map_err(|err| ToolError::Spawn {
                source: err,
                tool: tool.into(),
            })?;
        let stdout = chomp(String::from_utf8_lossy(&output.stdout).into_owned());
        let stderr = chomp(String::from_utf8_lossy(&output.stderr).into_owned());

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: tool.into(),
                command: command.into(),
                path: path.to_path_buf(),
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        if !stdout.is_empty() {
            debug!("stdout: {stdout}");
        }

        Ok(())
    }
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> std::io::Result<std::process::Output> {
    Command::new(cmd.as_ref()).args(args).output()
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// External tool error types.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool could not be started at all.
    #[error("failed to run {tool:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        tool: String,
    },

    /// Tool ran, but exited with non-zero status.
    #[error(
        "command {tool:?} {command:?} {:?} failed with exit code {}:\nstdout: {stdout}\nstderr: {stderr}",
        .path.display(),
        .code.map(|c| c.to_string()).unwrap_or_else(|| "<signal>".into())
    )]
    Failed {
        tool: String,
        command: String,
        path: PathBuf,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ToolError> = std::result::Result<T, E>;
