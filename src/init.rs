// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project directory setup.

use crate::{
    config::{UserConfig, DEFAULT_PLIST_TEMPLATE},
    db::PlistDb,
};

use std::{fs::write, path::PathBuf};
use tracing::{debug, info, instrument};

/// Prepare launchd-me's project directory for use.
#[derive(Debug)]
pub struct LaunchdMeInit<'a> {
    config: &'a UserConfig,
}

impl<'a> LaunchdMeInit<'a> {
    /// Construct new initializer.
    pub fn new(config: &'a UserConfig) -> Self {
        Self { config }
    }

    /// Create project layout, plist template, and database schema.
    ///
    /// Safe to call any number of times. Directories that exist are kept, an
    /// existing plist template is never overwritten, and an existing database
    /// keeps its rows.
    ///
    /// # Errors
    ///
    /// - Return [`InitError::CreateDir`] if a directory cannot be created.
    /// - Return [`InitError::WriteTemplate`] if template cannot be written.
    /// - Return [`InitError::Db`] if schema cannot be created.
    #[instrument(skip(self), level = "debug")]
    pub fn initialise_launchd_me(&self) -> Result<()> {
        // INVARIANT: Never create the launch agents directory.
        for dir in [
            self.config.project_dir(),
            self.config.plist_dir(),
            self.config.logs_dir(),
        ] {
            mkdirp::mkdirp(dir).map_err(|err| InitError::CreateDir {
                source: err,
                path: dir.to_path_buf(),
            })?;
            debug!("ensured directory {:?}", dir.display());
        }

        let template_path = self.config.plist_template_path();
        if !template_path.exists() {
            write(template_path, DEFAULT_PLIST_TEMPLATE).map_err(|err| {
                InitError::WriteTemplate {
                    source: err,
                    path: template_path.to_path_buf(),
                }
            })?;
            info!("wrote plist template to {:?}", template_path.display());
        }

        PlistDb::new(self.config).create_schema()?;
        info!(
            "launchd-me initialised at {:?}",
            self.config.project_dir().display()
        );

        Ok(())
    }
}

/// Initialization error types.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to write plist template to {:?}", path.display())]
    WriteTemplate {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Db(#[from] crate::db::DbError),
}

/// Friendly result alias :3
pub type Result<T, E = InitError> = std::result::Result<T, E>;
