// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem layout of launchd-me.
//!
//! Every path that launchd-me reads from or writes to is derived from a single
//! user directory, which is the user's home directory unless overridden:
//!
//! ```text
//! <user_dir>/
//! ├── launchd-me/
//! │   ├── launchd-me.db
//! │   ├── plist_template.xml
//! │   ├── logs/
//! │   └── plist_files/
//! └── Library/LaunchAgents/
//! ```
//!
//! Only the `launchd-me` directory belongs to us. `Library/LaunchAgents` is
//! owned by the operating system, and is never created by launchd-me.

use crate::path::{current_user_name, home_dir, PathError};

use std::path::{Path, PathBuf};

/// Name of launchd-me's project directory inside the user directory.
pub const PROJECT_DIR_NAME: &str = "launchd-me";

/// Default plist template packaged with launchd-me.
pub const DEFAULT_PLIST_TEMPLATE: &str = include_str!("../templates/plist_template.xml");

/// Resolved filesystem layout for the current user.
///
/// Constructed once, and handed to every component by reference. There are no
/// mutators, so a different layout requires a fresh instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    user_name: String,
    user_dir: PathBuf,
    project_dir: PathBuf,
    plist_dir: PathBuf,
    logs_dir: PathBuf,
    ldm_db_file: PathBuf,
    plist_template_path: PathBuf,
    launch_agents_dir: PathBuf,
}

impl UserConfig {
    /// Construct layout rooted at an explicit user directory.
    pub fn new(user_dir: impl Into<PathBuf>, user_name: impl Into<String>) -> Self {
        let user_dir = user_dir.into();
        let project_dir = user_dir.join(PROJECT_DIR_NAME);

        Self {
            user_name: user_name.into(),
            plist_dir: project_dir.join("plist_files"),
            logs_dir: project_dir.join("logs"),
            ldm_db_file: project_dir.join("launchd-me.db"),
            plist_template_path: project_dir.join("plist_template.xml"),
            launch_agents_dir: user_dir.join("Library").join("LaunchAgents"),
            project_dir,
            user_dir,
        }
    }

    /// Construct layout rooted at the current user's home directory.
    ///
    /// # Errors
    ///
    /// - Return [`PathError`] if home directory or user name cannot be
    ///   determined.
    pub fn try_default() -> Result<Self, PathError> {
        Ok(Self::new(home_dir()?, current_user_name()?))
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Directory that generated plist files are written to.
    pub fn plist_dir(&self) -> &Path {
        &self.plist_dir
    }

    /// Directory scheduled jobs send their stdout and stderr to.
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn ldm_db_file(&self) -> &Path {
        &self.ldm_db_file
    }

    pub fn plist_template_path(&self) -> &Path {
        &self.plist_template_path
    }

    /// Directory launchd loads user agents from.
    pub fn launch_agents_dir(&self) -> &Path {
        &self.launch_agents_dir
    }
}
