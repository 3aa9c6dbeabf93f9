// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Schedule scripts with launchd without writing plist files by hand.
//!
//! Launchd-me generates launchd plist files from a script and a schedule,
//! keeps track of every file it generates in a SQLite database, and installs
//! or uninstalls them by symlinking into `~/Library/LaunchAgents` and asking
//! `launchctl` to load or unload them.
//!
//! All state lives below `~/launchd-me`:
//!
//! ```text
//! ~/launchd-me/
//! ├── launchd-me.db
//! ├── plist_template.xml
//! ├── plist_files/
//! └── logs/
//! ```

pub mod config;
pub mod db;
pub mod init;
pub mod install;
pub mod path;
pub mod plist;
pub mod schedule;
pub mod tool;

pub use config::UserConfig;
pub use db::{CurrentState, PlistDb, PlistFileRecord};
pub use init::LaunchdMeInit;
pub use install::PlistInstaller;
pub use plist::{PlistCreator, PlistRequest};
pub use schedule::{Schedule, ScheduleType};
pub use tool::{SystemTools, ToolRunner};
