// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine the user information that every other path in launchd-me is
//! derived from.

use std::{env, path::PathBuf};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine name of the user running the current process.
///
/// Checks `USER`, then `LOGNAME`, and finally falls back to the last component
/// of the user's home directory.
///
/// # Errors
///
/// - Return [`PathError::NoUserName`] if no source yields a user name.
pub fn current_user_name() -> Result<String> {
    for var in ["USER", "LOGNAME"] {
        if let Ok(name) = env::var(var) {
            if !name.trim().is_empty() {
                return Ok(name);
            }
        }
    }

    home_dir()?
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or(PathError::NoUserName)
}

/// User information cannot be determined.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// No way to determine the user's login name.
    #[error("cannot determine name of current user")]
    NoUserName,
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
