// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Plist file generation.
//!
//! Turns a script and a schedule into a launchd plist file that runs the
//! script on that schedule. Generated plist files live in launchd-me's plist
//! directory, and each of them is tracked in the database.
//!
//! # File Naming
//!
//! Plist files are named `local.<user>.<script>_<NNNN>.plist`, where `<script>`
//! is the script's file name without extension, and `<NNNN>` is the number of
//! tracked plist files plus one, zero padded to four digits. Tracked rows are
//! never deleted, so the sequence number matches the id the new row receives.
//! Two launchd-me processes generating at the same time can still pick the
//! same number, because counting and inserting happen in separate
//! transactions.

use crate::{
    config::UserConfig,
    db::{NewPlistFile, PlistDb},
    install::PlistInstaller,
    schedule::{build_schedule_block, Schedule},
    tool::{SystemTools, ToolRunner},
};

use std::{
    fs::{metadata, read_to_string, set_permissions, write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Everything needed to generate one plist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlistRequest {
    /// Script that launchd should run.
    pub script_path: PathBuf,

    /// When launchd should run the script.
    pub schedule: Schedule,

    /// Free-text note stored with the tracked file.
    pub description: String,

    /// Set executable bits on the script.
    pub make_executable: bool,

    /// Install the plist file right after generating it.
    pub auto_install: bool,
}

/// Generate and track plist files.
#[derive(Debug)]
pub struct PlistCreator<'a, R = SystemTools>
where
    R: ToolRunner,
{
    config: &'a UserConfig,
    db: PlistDb,
    runner: R,
}

impl<'a> PlistCreator<'a, SystemTools> {
    /// Construct new plist creator that calls the real system tools.
    pub fn new(config: &'a UserConfig) -> Self {
        Self::with_runner(config, SystemTools)
    }
}

impl<'a, R> PlistCreator<'a, R>
where
    R: ToolRunner,
{
    /// Construct new plist creator with a custom tool runner.
    pub fn with_runner(config: &'a UserConfig, runner: R) -> Self {
        Self {
            config,
            db: PlistDb::new(config),
            runner,
        }
    }

    /// Generate, write, and track a plist file.
    ///
    /// Steps happen in this order, and a failing step stops everything after
    /// it:
    ///
    /// 1. Validate schedule.
    /// 2. Name plist file.
    /// 3. Render plist content from template.
    /// 4. Write plist file, replacing any existing file of the same name.
    /// 5. Track plist file as `inactive`.
    /// 6. Make script executable, if requested.
    /// 7. Install plist file, if requested.
    ///
    /// Earlier steps are never undone. A plist file that failed to install is
    /// left written and tracked as `inactive`, so it can be installed later.
    ///
    /// Returns path to the written plist file.
    ///
    /// # Errors
    ///
    /// - Return [`PlistError::Schedule`] if schedule is invalid.
    /// - Return [`PlistError::InvalidScriptPath`] if script path has no file
    ///   name.
    /// - Return [`PlistError::ReadTemplate`] if template cannot be read.
    /// - Return [`PlistError::WriteFile`] if plist file cannot be written.
    /// - Return [`PlistError::MakeExecutable`] if script permissions cannot
    ///   be changed.
    /// - Return [`PlistError::Db`] if database operations fail.
    /// - Return [`PlistError::Install`] if installation fails.
    #[instrument(skip(self, request), level = "debug")]
    pub fn generate(&self, request: &PlistRequest) -> Result<PathBuf> {
        request.schedule.validate()?;

        let script_path = request.script_path.as_path();
        let script_name = script_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| PlistError::InvalidScriptPath(script_path.to_path_buf()))?;
        let file_name = self.generate_file_name(script_path)?;

        let template_path = self.config.plist_template_path();
        let template = read_to_string(template_path).map_err(|err| PlistError::ReadTemplate {
            source: err,
            template_path: template_path.to_path_buf(),
        })?;
        let content = self.render_plist(
            &template,
            &file_name,
            &script_name,
            working_dir(script_path),
            &request.schedule,
        );

        let plist_path = self.config.plist_dir().join(&file_name);
        write(&plist_path, &content).map_err(|err| PlistError::WriteFile {
            source: err,
            plist_path: plist_path.clone(),
        })?;
        info!("plist file created at {:?}", plist_path.display());

        let id = self.db.insert_tracked_file(&NewPlistFile {
            file_name: &file_name,
            script_name: &script_name,
            schedule: &request.schedule,
            description: &request.description,
            plist_content: Some(&content),
        })?;

        if request.make_executable {
            make_script_executable(script_path)?;
        }

        if request.auto_install {
            PlistInstaller::new(self.config, &self.runner).install(id, &plist_path)?;
        }

        Ok(plist_path)
    }

    /// Name the next plist file generated for given script.
    ///
    /// # Errors
    ///
    /// - Return [`PlistError::InvalidScriptPath`] if script path has no file
    ///   name.
    /// - Return [`PlistError::Db`] if tracked files cannot be counted.
    pub fn generate_file_name(&self, script_path: impl AsRef<Path>) -> Result<String> {
        let script_path = script_path.as_ref();
        let stem = script_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| PlistError::InvalidScriptPath(script_path.to_path_buf()))?;
        let sequence = self.db.count_tracked_files()? + 1;
        let file_name = format!(
            "local.{}.{stem}_{sequence:04}.plist",
            self.config.user_name()
        );
        debug!("next plist file name is {file_name:?}");

        Ok(file_name)
    }

    /// Fill placeholders of plist template.
    ///
    /// Substituted names and paths are XML escaped. The schedule block is
    /// inserted as is.
    pub fn render_plist(
        &self,
        template: &str,
        file_name: &str,
        script_name: &str,
        working_dir: &Path,
        schedule: &Schedule,
    ) -> String {
        template
            .replace("{{NAME_OF_PLIST_FILE}}", &escape_xml(file_name))
            .replace("{{NAME_OF_SCRIPT}}", &escape_xml(script_name))
            .replace(
                "{{WORKING_DIRECTORY}}",
                &escape_xml(&working_dir.to_string_lossy()),
            )
            .replace(
                "{{PROJECT_DIRECTORY}}",
                &escape_xml(&self.config.project_dir().to_string_lossy()),
            )
            .replace("{{SCHEDULE_BLOCK}}", &build_schedule_block(schedule))
    }
}

// INVARIANT: Escape `&` first, so inserted entities are not escaped twice.
fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn working_dir(script_path: &Path) -> &Path {
    script_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

/// Add execute permission for user, group, and others.
fn make_script_executable(script_path: &Path) -> Result<()> {
    let map_err = |err| PlistError::MakeExecutable {
        source: err,
        script_path: script_path.to_path_buf(),
    };
    let mut permissions = metadata(script_path).map_err(map_err)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    set_permissions(script_path, permissions).map_err(map_err)?;
    debug!("made {:?} executable", script_path.display());

    Ok(())
}

/// Plist generation error types.
#[derive(Debug, thiserror::Error)]
pub enum PlistError {
    /// Schedule is not valid.
    #[error(transparent)]
    Schedule(#[from] crate::schedule::ScheduleError),

    /// Script path does not name a file.
    #[error("script path {:?} does not name a file", .0.display())]
    InvalidScriptPath(PathBuf),

    /// Plist template cannot be read.
    #[error("failed to read plist template at {:?}", template_path.display())]
    ReadTemplate {
        #[source]
        source: std::io::Error,
        template_path: PathBuf,
    },

    /// Plist file cannot be written.
    #[error("failed to write plist file at {:?}", plist_path.display())]
    WriteFile {
        #[source]
        source: std::io::Error,
        plist_path: PathBuf,
    },

    /// Script cannot be made executable.
    #[error("failed to make script {:?} executable", script_path.display())]
    MakeExecutable {
        #[source]
        source: std::io::Error,
        script_path: PathBuf,
    },

    /// Database operations fail.
    #[error(transparent)]
    Db(#[from] crate::db::DbError),

    /// Installation fails.
    #[error(transparent)]
    Install(#[from] crate::install::InstallError),
}

/// Friendly result alias :3
pub type Result<T, E = PlistError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::CurrentState,
        init::LaunchdMeInit,
        install::{tests::RecordingRunner, InstallError},
        schedule::{ScheduleError, ScheduleType},
    };

    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::{env::current_dir, fs::File};

    fn mock_env() -> anyhow::Result<(UserConfig, PathBuf)> {
        let config = UserConfig::new(current_dir()?, "mock_user_name");
        LaunchdMeInit::new(&config).initialise_launchd_me()?;
        let script = config.user_dir().join("interval_task.py");
        write(&script, "print('hello')\n")?;
        Ok((config, script))
    }

    fn request(script: &Path, schedule: Schedule) -> PlistRequest {
        PlistRequest {
            script_path: script.to_path_buf(),
            schedule,
            description: "A description".into(),
            make_executable: false,
            auto_install: false,
        }
    }

    #[sealed_test]
    fn generate_file_name_uses_row_count() -> anyhow::Result<()> {
        let (config, script) = mock_env()?;
        let creator = PlistCreator::with_runner(&config, RecordingRunner::default());

        assert_eq!(
            creator.generate_file_name(&script)?,
            "local.mock_user_name.interval_task_0001.plist"
        );

        creator.generate(&request(&script, Schedule::Interval(300)))?;
        assert_eq!(
            creator.generate_file_name("other/daily_task.sh")?,
            "local.mock_user_name.daily_task_0002.plist"
        );

        Ok(())
    }

    #[sealed_test]
    fn generate_interval_plist() -> anyhow::Result<()> {
        let (config, script) = mock_env()?;
        let runner = RecordingRunner::default();
        let creator = PlistCreator::with_runner(&config, runner);

        let plist_path = creator.generate(&request(&script, Schedule::Interval(300)))?;
        assert_eq!(
            plist_path,
            config
                .plist_dir()
                .join("local.mock_user_name.interval_task_0001.plist")
        );

        let content = read_to_string(&plist_path)?;
        assert!(content.contains("<key>StartInterval</key>\n    <integer>300</integer>"));
        assert!(!content.contains("StartCalendarInterval"));
        assert!(!content.contains("{{"));

        let lines = content.lines().map(str::trim).collect::<Vec<_>>();
        let project = config.project_dir().display().to_string();
        let user_dir = config.user_dir().display().to_string();
        assert_eq!(lines[0], r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        assert_eq!(lines[5], "<string>local.mock_user_name.interval_task_0001.plist</string>");
        assert_eq!(lines[8], format!("<string>{user_dir}/interval_task.py</string>"));
        assert_eq!(lines[11], format!("<string>{user_dir}</string>"));
        let log = format!("{project}/logs/local.mock_user_name.interval_task_0001.plist");
        assert_eq!(lines[13], format!("<string>{log}_std_out.log</string>"));
        assert_eq!(lines[15], format!("<string>{log}_err.log</string>"));

        let record = PlistDb::new(&config).get_tracked_file(1)?;
        assert_eq!(record.file_name, "local.mock_user_name.interval_task_0001.plist");
        assert_eq!(record.script_name, "interval_task.py");
        assert_eq!(record.schedule_type, ScheduleType::Interval);
        assert_eq!(record.schedule_value, "300");
        assert_eq!(record.current_state, CurrentState::Inactive);
        assert_eq!(record.plist_content.as_deref(), Some(content.as_str()));
        assert!(creator.runner.calls.borrow().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn generate_calendar_plist() -> anyhow::Result<()> {
        let (config, script) = mock_env()?;
        let creator = PlistCreator::with_runner(&config, RecordingRunner::default());

        let schedule = Schedule::calendar([("Day", 15), ("Hour", 15)]);
        let plist_path = creator.generate(&request(&script, schedule))?;

        let content = read_to_string(plist_path)?;
        let block = concat!(
            "<key>StartCalendarInterval</key>\n",
            "    <dict>\n",
            "        <key>Day</key>\n",
            "        <integer>15</integer>\n",
            "        <key>Hour</key>\n",
            "        <integer>15</integer>\n",
            "    </dict>"
        );
        assert!(content.contains(block));
        assert!(!content.contains("StartInterval<"));

        let record = PlistDb::new(&config).get_tracked_file(1)?;
        assert_eq!(record.schedule_type, ScheduleType::Calendar);
        assert_eq!(record.schedule_value, r#"{"Day":15,"Hour":15}"#);

        Ok(())
    }

    #[sealed_test]
    fn generate_rejects_invalid_calendar_before_writing() -> anyhow::Result<()> {
        let (config, script) = mock_env()?;
        let creator = PlistCreator::with_runner(&config, RecordingRunner::default());

        let schedule = Schedule::calendar([("Hour", 25)]);
        let result = creator.generate(&request(&script, schedule));
        assert!(matches!(
            result,
            Err(PlistError::Schedule(ScheduleError::InvalidScheduleValue { .. }))
        ));

        let schedule = Schedule::calendar([("Fortnight", 1)]);
        let result = creator.generate(&request(&script, schedule));
        assert!(matches!(
            result,
            Err(PlistError::Schedule(ScheduleError::InvalidScheduleField(_)))
        ));

        assert_eq!(std::fs::read_dir(config.plist_dir())?.count(), 0);
        assert_eq!(PlistDb::new(&config).count_tracked_files()?, 0);

        Ok(())
    }

    #[sealed_test]
    fn generate_with_auto_install() -> anyhow::Result<()> {
        let (config, script) = mock_env()?;
        std::fs::create_dir_all(config.launch_agents_dir())?;
        let creator = PlistCreator::with_runner(&config, RecordingRunner::default());

        let mut request = request(&script, Schedule::Interval(300));
        request.make_executable = true;
        request.auto_install = true;
        let plist_path = creator.generate(&request)?;

        let symlink = config
            .launch_agents_dir()
            .join("local.mock_user_name.interval_task_0001.plist");
        assert!(std::fs::symlink_metadata(&symlink)?.file_type().is_symlink());
        assert_eq!(std::fs::read_link(&symlink)?, plist_path);
        assert_eq!(
            creator.runner.commands().last(),
            Some(&("launchctl".to_string(), "load".to_string()))
        );
        assert_eq!(metadata(&script)?.permissions().mode() & 0o111, 0o111);

        let record = PlistDb::new(&config).get_tracked_file(1)?;
        assert_eq!(record.schedule_value, "300");
        assert_eq!(record.current_state, CurrentState::Running);

        Ok(())
    }

    #[sealed_test]
    fn generate_keeps_partial_state_when_install_fails() -> anyhow::Result<()> {
        let (config, script) = mock_env()?;
        let creator = PlistCreator::with_runner(&config, RecordingRunner::default());

        // No launch agents directory.
        let mut request = request(&script, Schedule::Interval(60));
        request.auto_install = true;
        let result = creator.generate(&request);
        assert!(matches!(
            result,
            Err(PlistError::Install(InstallError::FileNotFound(_)))
        ));

        assert!(config
            .plist_dir()
            .join("local.mock_user_name.interval_task_0001.plist")
            .exists());
        let record = PlistDb::new(&config).get_tracked_file(1)?;
        assert_eq!(record.current_state, CurrentState::Inactive);

        Ok(())
    }

    #[sealed_test]
    fn generate_fails_without_template() -> anyhow::Result<()> {
        let (config, script) = mock_env()?;
        std::fs::remove_file(config.plist_template_path())?;
        let creator = PlistCreator::with_runner(&config, RecordingRunner::default());

        let result = creator.generate(&request(&script, Schedule::Interval(300)));
        assert!(matches!(result, Err(PlistError::ReadTemplate { .. })));
        assert_eq!(PlistDb::new(&config).count_tracked_files()?, 0);

        Ok(())
    }

    #[sealed_test]
    fn generate_escapes_markup_in_names_and_paths() -> anyhow::Result<()> {
        let (config, _) = mock_env()?;
        let script_dir = config.user_dir().join("R&D <x>");
        std::fs::create_dir_all(&script_dir)?;
        let script = script_dir.join("a&b.py");
        write(&script, "print('hello')\n")?;
        let creator = PlistCreator::with_runner(&config, RecordingRunner::default());

        let plist_path = creator.generate(&request(&script, Schedule::Interval(300)))?;
        assert_eq!(
            plist_path,
            config.plist_dir().join("local.mock_user_name.a&b_0001.plist")
        );

        let content = read_to_string(&plist_path)?;
        let lines = content.lines().map(str::trim).collect::<Vec<_>>();
        let user_dir = escape_xml(&config.user_dir().display().to_string());
        assert_eq!(lines[5], "<string>local.mock_user_name.a&amp;b_0001.plist</string>");
        assert_eq!(
            lines[8],
            format!("<string>{user_dir}/R&amp;D &lt;x&gt;/a&amp;b.py</string>")
        );
        assert_eq!(lines[11], format!("<string>{user_dir}/R&amp;D &lt;x&gt;</string>"));
        assert!(!content.contains("a&b"));
        assert!(!content.contains("<x>"));

        let record = PlistDb::new(&config).get_tracked_file(1)?;
        assert_eq!(record.script_name, "a&b.py");

        Ok(())
    }

    #[test_case("plain", "plain"; "nothing to escape")]
    #[test_case("R&D", "R&amp;D"; "ampersand")]
    #[test_case("<x>", "&lt;x&gt;"; "angle brackets")]
    #[test_case(r#"say "hi" 'there'"#, "say &quot;hi&quot; &apos;there&apos;"; "quotes")]
    #[test_case("&lt;", "&amp;lt;"; "existing entity")]
    #[test]
    fn escape_xml_replaces_markup(input: &str, expect: &str) {
        pretty_assertions::assert_eq!(escape_xml(input), expect);
    }

    #[sealed_test]
    fn make_script_executable_sets_execute_bits() -> anyhow::Result<()> {
        let script = current_dir()?.join("script.sh");
        File::create(&script)?;
        set_permissions(&script, std::fs::Permissions::from_mode(0o644))?;

        make_script_executable(&script)?;
        assert_eq!(metadata(&script)?.permissions().mode() & 0o777, 0o755);

        let result = make_script_executable(&current_dir()?.join("missing.sh"));
        assert!(matches!(result, Err(PlistError::MakeExecutable { .. })));

        Ok(())
    }
}
