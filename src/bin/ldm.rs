// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use launchd_me::{
    db::DbError, LaunchdMeInit, PlistCreator, PlistDb, PlistFileRecord, PlistInstaller,
    PlistRequest, Schedule, ScheduleType, SystemTools, UserConfig,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rusqlite::types::Value;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "ldm [options] <ldm-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = UserConfig::try_default()?;
        match self.command {
            Command::Init => run_init(&config),
            Command::Create(opts) => run_create(&config, opts),
            Command::List(opts) => run_list(&config, opts),
            Command::Install(opts) => run_install(&config, opts),
            Command::Uninstall(opts) => run_uninstall(&config, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Set up launchd-me's project directory and database.
    #[command(override_usage = "ldm init")]
    Init,

    /// Create a plist file from a given script.
    #[command(override_usage = "ldm create [options] <script> <schedule_type> <schedule_details>")]
    Create(CreateOptions),

    /// List all tracked plist files, or details of one of them.
    #[command(override_usage = "ldm list [options] [<plist_id>]")]
    List(ListOptions),

    /// Install tracked plist file into launchd.
    #[command(override_usage = "ldm install <plist_id>")]
    Install(IdOptions),

    /// Uninstall tracked plist file from launchd.
    #[command(override_usage = "ldm uninstall <plist_id>")]
    Uninstall(IdOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CreateOptions {
    /// Path to the script to automate.
    #[arg(value_name = "script")]
    pub script_path: String,

    /// Either "interval" (seconds) or "calendar" (time fields).
    #[arg(value_name = "schedule_type")]
    pub schedule_type: String,

    /// How often the script runs, e.g. `300` or `{"Hour": 9, "Weekday": 1}`.
    #[arg(value_name = "schedule_details")]
    pub schedule_details: String,

    /// Brief description of what the script does.
    #[arg(short, long, value_name = "summary", default_value = "")]
    pub description: String,

    /// Leave permissions of the script alone.
    #[arg(long)]
    pub no_executable: bool,

    /// Only generate the plist file, do not load it.
    #[arg(long)]
    pub no_install: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Show details of given plist file.
    #[arg(value_name = "plist_id")]
    pub plist_id: Option<i64>,

    /// Print tracked files as JSON.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct IdOptions {
    /// Id of tracked plist file.
    #[arg(required = true, value_name = "plist_id")]
    pub plist_id: i64,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        if let Some(DbError::PlistFileIdNotFound(id)) = error.downcast_ref::<DbError>() {
            eprintln!("No tracked plist file with id {id}. Run `ldm list` to see tracked files.");
        } else {
            error!("{error:?}");
        }
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_init(config: &UserConfig) -> Result<()> {
    LaunchdMeInit::new(config).initialise_launchd_me()?;
    Ok(())
}

fn run_create(config: &UserConfig, opts: CreateOptions) -> Result<()> {
    let expanded = shellexpand::full(&opts.script_path)?;
    let script_path = PathBuf::from(expanded.as_ref());
    if !script_path.is_file() {
        bail!("script {:?} does not exist", script_path.display());
    }
    let script_path = script_path.canonicalize()?;

    let schedule_type = opts.schedule_type.parse::<ScheduleType>()?;
    let schedule = Schedule::parse(schedule_type, &opts.schedule_details)?;

    let plist_path = PlistCreator::new(config).generate(&PlistRequest {
        script_path,
        schedule,
        description: opts.description,
        make_executable: !opts.no_executable,
        auto_install: !opts.no_install,
    })?;
    println!("{}", plist_path.display());

    Ok(())
}

fn run_list(config: &UserConfig, opts: ListOptions) -> Result<()> {
    let db = PlistDb::new(config);
    match (opts.plist_id, opts.json) {
        (Some(id), true) => {
            println!("{}", serde_json::to_string_pretty(&db.get_tracked_file(id)?)?);
        }
        (Some(id), false) => {
            for (column, value) in db.get_single_file_details(id)? {
                println!("{column}: {}", render_value(&value));
            }
        }
        (None, true) => {
            println!("{}", serde_json::to_string_pretty(&db.get_all_tracked_files()?)?);
        }
        (None, false) => print_table(&db.get_all_tracked_files()?),
    }

    Ok(())
}

fn run_install(config: &UserConfig, opts: IdOptions) -> Result<()> {
    let record = PlistDb::new(config).get_tracked_file(opts.plist_id)?;
    let plist_file = config.plist_dir().join(&record.file_name);
    let symlink = PlistInstaller::new(config, &SystemTools).install(record.id, plist_file)?;
    info!("installed {:?}", symlink.display());

    Ok(())
}

fn run_uninstall(config: &UserConfig, opts: IdOptions) -> Result<()> {
    let record = PlistDb::new(config).get_tracked_file(opts.plist_id)?;
    let installer = PlistInstaller::new(config, &SystemTools);
    installer.uninstall(record.id, installer.symlink_path(&record.file_name))?;

    Ok(())
}

fn print_table(records: &[PlistFileRecord]) {
    if records.is_empty() {
        println!("No tracked plist files.");
        return;
    }

    let name_width = records
        .iter()
        .map(|record| record.file_name.len())
        .max()
        .unwrap_or_default()
        .max("File Name".len());
    println!(
        "{:>4}  {:<name_width$}  {:<8}  {:<20}  {:<8}  Created",
        "ID", "File Name", "Type", "Schedule", "State"
    );
    for record in records {
        println!(
            "{:>4}  {:<name_width$}  {:<8}  {:<20}  {:<8}  {}",
            record.id,
            record.file_name,
            record.schedule_type.to_string(),
            record.schedule_value,
            record.current_state.to_string(),
            record.created_at
        );
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "-".into(),
        Value::Integer(int) => int.to_string(),
        Value::Real(real) => real.to_string(),
        Value::Text(text) => text.clone(),
        Value::Blob(blob) => format!("<{} bytes>", blob.len()),
    }
}
