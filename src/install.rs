// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Plist installation management.
//!
//! Launchd only looks at plist files inside `~/Library/LaunchAgents`. Rather
//! than moving generated plist files there, launchd-me __installs__ a plist
//! file by placing a symlink to it inside the launch agents directory, and
//! asking launchd to load the symlink. The generated plist file itself never
//! leaves launchd-me's plist directory.
//!
//! # Partial Failure
//!
//! Installation does not roll back the symlink if launchd refuses to load it.
//! The tracked state stays `inactive`, and the dangling symlink is simply
//! replaced the next time installation is attempted.

use crate::{
    config::UserConfig,
    db::{EventType, PlistDb},
    tool::{SystemTools, ToolRunner},
};

use std::{
    fs::{remove_file, symlink_metadata},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Install and uninstall plist files into launchd.
#[derive(Debug)]
pub struct PlistInstaller<'a, R = SystemTools>
where
    R: ToolRunner,
{
    config: &'a UserConfig,
    db: PlistDb,
    runner: &'a R,
}

impl<'a, R> PlistInstaller<'a, R>
where
    R: ToolRunner,
{
    /// Construct new installer.
    pub fn new(config: &'a UserConfig, runner: &'a R) -> Self {
        Self {
            config,
            db: PlistDb::new(config),
            runner,
        }
    }

    /// Path of the symlink that installs a plist file with given name.
    pub fn symlink_path(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.config.launch_agents_dir().join(file_name)
    }

    /// Install plist file of tracked id into launchd.
    ///
    /// Symlinks plist file into launch agents directory, validates it with
    /// `plutil -lint`, loads it with `launchctl load`, and finally marks the
    /// tracked file as running. Nothing is written to the database unless
    /// every previous step succeeded.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Db`] if id is not tracked. Nothing else runs.
    /// - Return [`InstallError::FileNotFound`] if plist file or launch agents
    ///   directory does not exist.
    /// - Return [`InstallError::Symlink`] if symlink cannot be created.
    /// - Return [`InstallError::Tool`] if validation or loading fails.
    /// - Return [`InstallError::Db`] if tracked state cannot be updated.
    #[instrument(skip(self, plist_file), level = "debug")]
    pub fn install(&self, id: i64, plist_file: impl AsRef<Path>) -> Result<PathBuf> {
        let plist_file = plist_file.as_ref();
        info!("install plist file {:?}", plist_file.display());

        // INVARIANT: Verify id before touching the filesystem or launchd.
        self.db.verify_id_exists(id)?;

        if !plist_file.is_file() {
            return Err(InstallError::FileNotFound(plist_file.to_path_buf()));
        }

        // INVARIANT: Never create the launch agents directory.
        //   - It is owned by the operating system.
        let launch_agents_dir = self.config.launch_agents_dir();
        if !launch_agents_dir.is_dir() {
            return Err(InstallError::FileNotFound(launch_agents_dir.to_path_buf()));
        }

        let symlink = self.create_symlink(plist_file)?;
        self.runner.run("plutil", "-lint", &symlink)?;
        self.runner.run("launchctl", "load", &symlink)?;
        self.db.complete_installation_event(id, EventType::Install)?;
        info!("plist file {id} is now running");

        Ok(symlink)
    }

    /// Uninstall plist file of tracked id from launchd.
    ///
    /// Unloads the symlink with `launchctl unload`, removes the symlink, and
    /// marks the tracked file as inactive.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Db`] if id is not tracked. Nothing else runs.
    /// - Return [`InstallError::Tool`] if unloading fails.
    /// - Return [`InstallError::RemoveSymlink`] if symlink cannot be removed.
    /// - Return [`InstallError::Db`] if tracked state cannot be updated.
    #[instrument(skip(self, symlink), level = "debug")]
    pub fn uninstall(&self, id: i64, symlink: impl AsRef<Path>) -> Result<()> {
        let symlink = symlink.as_ref();
        info!("uninstall plist file {:?}", symlink.display());

        self.db.verify_id_exists(id)?;
        self.runner.run("launchctl", "unload", symlink)?;
        remove_file(symlink).map_err(|err| InstallError::RemoveSymlink {
            source: err,
            symlink: symlink.to_path_buf(),
        })?;
        self.db.complete_installation_event(id, EventType::Uninstall)?;
        info!("plist file {id} is now inactive");

        Ok(())
    }

    fn create_symlink(&self, plist_file: &Path) -> Result<PathBuf> {
        let file_name = plist_file
            .file_name()
            .ok_or_else(|| InstallError::FileNotFound(plist_file.to_path_buf()))?;
        let symlink_path = self.symlink_path(file_name);

        // INVARIANT: Replace leftover symlink from a failed installation.
        if let Ok(metadata) = symlink_metadata(&symlink_path) {
            if !metadata.file_type().is_symlink() {
                return Err(InstallError::Occupied(symlink_path));
            }
            warn!("replace existing symlink {:?}", symlink_path.display());
            remove_file(&symlink_path).map_err(|err| InstallError::RemoveSymlink {
                source: err,
                symlink: symlink_path.clone(),
            })?;
        }

        symlink(plist_file, &symlink_path).map_err(|err| InstallError::Symlink {
            source: err,
            symlink: symlink_path.clone(),
        })?;

        Ok(symlink_path)
    }
}

/// Installation error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// File or directory needed for installation does not exist.
    #[error("{:?} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// Non-symlink file already sits where the symlink should go.
    #[error("{:?} exists and is not a symlink, refusing to replace it", .0.display())]
    Occupied(PathBuf),

    /// Symlink cannot be created.
    #[error("failed to create symlink at {:?}", symlink.display())]
    Symlink {
        #[source]
        source: std::io::Error,
        symlink: PathBuf,
    },

    /// Symlink cannot be removed.
    #[error("failed to remove symlink at {:?}", symlink.display())]
    RemoveSymlink {
        #[source]
        source: std::io::Error,
        symlink: PathBuf,
    },

    /// External tool fails.
    #[error(transparent)]
    Tool(#[from] crate::tool::ToolError),

    /// Tracked state cannot be updated.
    #[error(transparent)]
    Db(#[from] crate::db::DbError),
}

/// Friendly result alias :3
pub type Result<T, E = InstallError> = std::result::Result<T, E>;
