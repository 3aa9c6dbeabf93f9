// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{FakeTools, LdmFixture};

use anyhow::Result;
use launchd_me::{
    db::{DbError, EventType},
    install::InstallError,
    plist::PlistError,
    CurrentState, PlistCreator, PlistDb, PlistInstaller, PlistRequest, Schedule, ScheduleType,
};
use pretty_assertions::assert_eq;
use rusqlite::types::Value;
use sealed_test::prelude::*;
use std::{
    fs::{read_link, read_to_string, symlink_metadata},
    path::PathBuf,
};

fn request(script_path: PathBuf, schedule: Schedule, auto_install: bool) -> PlistRequest {
    PlistRequest {
        script_path,
        schedule,
        description: "integration".into(),
        make_executable: true,
        auto_install,
    }
}

#[sealed_test]
fn generate_install_uninstall_lifecycle() -> Result<()> {
    let fixture = LdmFixture::new()?;
    let script = fixture.script("interval_task.py")?;
    let creator = PlistCreator::with_runner(&fixture.config, FakeTools::default());

    let plist_path = creator.generate(&request(script, Schedule::Interval(300), true))?;
    let symlink = fixture
        .config
        .launch_agents_dir()
        .join("local.mock_user_name.interval_task_0001.plist");
    assert_eq!(read_link(&symlink)?, plist_path);

    let db = PlistDb::new(&fixture.config);
    let record = db.get_tracked_file(1)?;
    assert_eq!(record.current_state, CurrentState::Running);

    let tools = FakeTools::default();
    let installer = PlistInstaller::new(&fixture.config, &tools);
    installer.uninstall(record.id, installer.symlink_path(&record.file_name))?;
    assert_eq!(tools.calls(), vec!["launchctl unload"]);
    assert!(symlink_metadata(&symlink).is_err());
    assert!(plist_path.is_file());

    let record = db.get_tracked_file(1)?;
    assert_eq!(record.current_state, CurrentState::Inactive);
    let events = db
        .get_installation_events(record.id)?
        .into_iter()
        .map(|event| (event.event_type, event.success))
        .collect::<Vec<_>>();
    assert_eq!(
        events,
        vec![(EventType::Install, true), (EventType::Uninstall, true)]
    );

    Ok(())
}

#[sealed_test]
fn generate_then_install_by_id() -> Result<()> {
    let fixture = LdmFixture::new()?;
    let script = fixture.script("calendar_task.sh")?;
    let schedule = Schedule::parse(ScheduleType::Calendar, "{'Hour': 9, 'Weekday': 1}")?;
    let creator = PlistCreator::with_runner(&fixture.config, FakeTools::default());
    creator.generate(&request(script, schedule, false))?;

    let db = PlistDb::new(&fixture.config);
    let record = db.get_tracked_file(1)?;
    assert_eq!(record.current_state, CurrentState::Inactive);
    assert_eq!(record.schedule_value, r#"{"Hour":9,"Weekday":1}"#);

    let tools = FakeTools::default();
    let plist_file = fixture.config.plist_dir().join(&record.file_name);
    PlistInstaller::new(&fixture.config, &tools).install(record.id, &plist_file)?;
    assert_eq!(tools.calls(), vec!["plutil -lint", "launchctl load"]);
    assert_eq!(db.get_tracked_file(1)?.current_state, CurrentState::Running);

    let content = read_to_string(plist_file)?;
    assert!(content.contains("<key>Weekday</key>\n        <integer>1</integer>"));

    Ok(())
}

#[sealed_test]
fn sequence_numbers_follow_tracked_rows() -> Result<()> {
    let fixture = LdmFixture::new()?;
    let creator = PlistCreator::with_runner(&fixture.config, FakeTools::default());

    let mut names = Vec::new();
    for script in ["backup.sh", "backup.sh", "sync.py"] {
        let script = fixture.script(script)?;
        let path = creator.generate(&request(script, Schedule::Interval(60), false))?;
        names.push(path.file_name().map(|name| name.to_string_lossy().into_owned()));
    }

    assert_eq!(
        names,
        vec![
            Some("local.mock_user_name.backup_0001.plist".to_string()),
            Some("local.mock_user_name.backup_0002.plist".to_string()),
            Some("local.mock_user_name.sync_0003.plist".to_string()),
        ]
    );
    let ids = PlistDb::new(&fixture.config)
        .get_all_tracked_files()?
        .into_iter()
        .map(|record| record.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 2, 3]);

    Ok(())
}

#[sealed_test]
fn failed_load_leaves_file_tracked_and_inactive() -> Result<()> {
    let fixture = LdmFixture::new()?;
    let script = fixture.script("flaky.sh")?;
    let creator = PlistCreator::with_runner(&fixture.config, FakeTools::failing_on("load"));

    let result = creator.generate(&request(script, Schedule::Interval(120), true));
    assert!(matches!(
        result,
        Err(PlistError::Install(InstallError::Tool(_)))
    ));

    let db = PlistDb::new(&fixture.config);
    let record = db.get_tracked_file(1)?;
    assert_eq!(record.current_state, CurrentState::Inactive);
    assert!(db.get_installation_events(1)?.is_empty());

    Ok(())
}

#[sealed_test]
fn unknown_id_is_reported() -> Result<()> {
    let fixture = LdmFixture::new()?;
    let db = PlistDb::new(&fixture.config);

    assert!(matches!(
        db.get_tracked_file(42),
        Err(DbError::PlistFileIdNotFound(42))
    ));
    assert!(matches!(
        db.get_single_file_details(42),
        Err(DbError::PlistFileIdNotFound(42))
    ));

    Ok(())
}

#[sealed_test]
fn single_file_details_match_generated_file() -> Result<()> {
    let fixture = LdmFixture::new()?;
    let script = fixture.script("report.py")?;
    let creator = PlistCreator::with_runner(&fixture.config, FakeTools::default());
    let plist_path = creator.generate(&request(script, Schedule::Interval(900), false))?;

    let details = PlistDb::new(&fixture.config).get_single_file_details(1)?;
    assert_eq!(details["PlistFileID"], Value::Integer(1));
    assert_eq!(
        details["PlistFileName"],
        Value::Text("local.mock_user_name.report_0001.plist".into())
    );
    assert_eq!(details["ScriptName"], Value::Text("report.py".into()));
    assert_eq!(details["ScheduleType"], Value::Text("interval".into()));
    assert_eq!(details["ScheduleValue"], Value::Text("900".into()));
    assert_eq!(details["CurrentState"], Value::Text("inactive".into()));
    assert_eq!(details["Description"], Value::Text("integration".into()));
    assert_eq!(
        details["PlistFileContent"],
        Value::Text(read_to_string(plist_path)?)
    );

    Ok(())
}
