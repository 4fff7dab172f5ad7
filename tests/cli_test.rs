// ABOUTME: End-to-end tests for the dept-sync binary
// ABOUTME: Runs export and sync through a config file pointing at a SQLite database

use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

/// Run the binary with an isolated home, config dir and working directory
fn run(workdir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dept-sync"))
        .args(args)
        .current_dir(workdir)
        .env("HOME", workdir)
        .env("XDG_CONFIG_HOME", workdir.join(".config"))
        .env_remove("DEPT_SYNC_CONFIG")
        .env_remove("DEPT_SYNC_DATABASE_URL")
        .env_remove("DEPT_SYNC_DB_PASSWORD")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn setup_database(dir: &TempDir) -> String {
    let path = dir.path().join("hr.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE departments (
             DepCode TEXT NOT NULL,
             DepJob TEXT NOT NULL,
             Description TEXT,
             PRIMARY KEY (DepCode, DepJob)
         );
         INSERT INTO departments VALUES ('A', '1', 'x');
         INSERT INTO departments VALUES ('B', '2', 'y');",
    )
    .unwrap();
    format!("sqlite:{}", path.display())
}

fn count_rows(dir: &TempDir) -> i64 {
    Connection::open(dir.path().join("hr.db"))
        .unwrap()
        .query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("export"));
    assert!(stdout.contains("sync"));
}

#[test]
fn test_help_command_lists_commands() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), &["help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("export"));
    assert!(stdout.contains("sync"));
}

#[test]
fn test_unknown_command_prints_usage() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), &["frobnicate"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"));
}

#[test]
fn test_missing_file_argument_is_usage_error() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), &["sync"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"));
}

#[test]
fn test_missing_configuration_fails() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), &["export", "out.xml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No configuration file found"));
    assert!(!dir.path().join("out.xml").exists());
}

#[test]
fn test_export_and_sync_through_config_file() {
    let dir = tempdir().unwrap();
    let url = setup_database(&dir);
    fs::write(
        dir.path().join("dept-sync.toml"),
        format!("[database]\nurl = \"{}\"\n", url),
    )
    .unwrap();

    let output = run(dir.path(), &["export", "departments.xml"]);
    assert!(
        output.status.success(),
        "export failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Exported 2 departments"));

    let xml = fs::read_to_string(dir.path().join("departments.xml")).unwrap();
    assert!(xml.contains("<DepCode>A</DepCode>"));
    assert!(xml.contains("<DepCode>B</DepCode>"));

    // Drop B/2 from the document and add C/3
    let edited = xml
        .replace("<DepCode>B</DepCode>", "<DepCode>C</DepCode>")
        .replace("<DepJob>2</DepJob>", "<DepJob>3</DepJob>");
    fs::write(dir.path().join("departments.xml"), edited).unwrap();

    let output = run(dir.path(), &["sync", "departments.xml", "--dry-run"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dry run"));
    assert!(stdout.contains("would delete 1"));

    let output = run(dir.path(), &["sync", "departments.xml", "--changed-only"]);
    assert!(
        output.status.success(),
        "sync failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 deleted, 0 updated, 1 inserted, 1 unchanged"));
    assert_eq!(count_rows(&dir), 2);
}

#[test]
fn test_database_url_flag_without_config_file() {
    let dir = tempdir().unwrap();
    let url = setup_database(&dir);

    let output = run(
        dir.path(),
        &["--database-url", &url, "export", "departments.xml"],
    );
    assert!(
        output.status.success(),
        "export failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(dir.path().join("departments.xml").exists());
}

#[test]
fn test_sync_failure_exits_non_zero_and_keeps_table() {
    let dir = tempdir().unwrap();
    let url = setup_database(&dir);
    fs::write(
        dir.path().join("dup.xml"),
        "<Departments>\
           <Department><DepCode>A</DepCode><DepJob>1</DepJob><Description>a</Description></Department>\
           <Department><DepCode>A</DepCode><DepJob>1</DepJob><Description>b</Description></Department>\
         </Departments>",
    )
    .unwrap();

    let output = run(dir.path(), &["--database-url", &url, "sync", "dup.xml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("duplicate record"));
    assert_eq!(count_rows(&dir), 2);
}

#[test]
fn test_failure_is_written_to_log_file() {
    let dir = tempdir().unwrap();
    let url = setup_database(&dir);
    fs::write(
        dir.path().join("dept-sync.toml"),
        format!("[database]\nurl = \"{}\"\n\n[log]\nfile = \"logs/dept-sync.log\"\n", url),
    )
    .unwrap();
    fs::write(
        dir.path().join("dup.xml"),
        "<Departments>\
           <Department><DepCode>A</DepCode><DepJob>1</DepJob><Description>a</Description></Department>\
           <Department><DepCode>A</DepCode><DepJob>1</DepJob><Description>b</Description></Department>\
         </Departments>",
    )
    .unwrap();

    let output = run(dir.path(), &["sync", "dup.xml"]);
    assert_eq!(output.status.code(), Some(1));

    let log = fs::read_to_string(dir.path().join("logs").join("dept-sync.log")).unwrap();
    assert!(log.contains("ERROR"));
    assert!(log.contains("duplicate record"));
}
