//! Integration tests for TaskNest CLI commands.
//!
//! Uses tempfile for testing file-based operations.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use std::path::PathBuf;
use tasknest::cli::{
    Cli, CliError, Command, TodoCommand, cmd_init, cmd_status, cmd_todo_add, cmd_todo_complete, cmd_todo_delete,
    cmd_todo_list, cmd_todo_show, cmd_todo_update, cmd_user_add, format_todo_list, run_todo,
};
use tasknest_core::password::MIN_ITERATIONS;
use tasknest_core::{
    NestError, NewTodo, TodoFilter, TodoPatch, TodoPriority, TodoStatus, TodoSummary,
};
use tempfile::TempDir;

const EMAIL: &str = "owner@example.com";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a temporary directory for tests.
fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Initialized database with one user.
fn seeded_db(temp: &TempDir) -> PathBuf {
    let db_path = temp.path().join("test.redb");
    cmd_init(&db_path, false).unwrap();
    cmd_user_add(&db_path, EMAIL, "password123", MIN_ITERATIONS).unwrap();
    db_path
}

// =============================================================================
// INIT COMMAND TESTS
// =============================================================================

#[test]
fn test_init_creates_database() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.redb");

    let result = cmd_init(&db_path, false);
    assert!(result.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_init_fails_if_exists_without_force() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.redb");

    cmd_init(&db_path, false).unwrap();

    let result = cmd_init(&db_path, false);
    assert!(matches!(result, Err(CliError::DatabaseExists(_))));
}

#[test]
fn test_init_with_force_starts_empty() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    cmd_init(&db_path, true).unwrap();
    assert_eq!(cmd_status(&db_path, false).unwrap().users, 0);
}

// =============================================================================
// STATUS COMMAND TESTS
// =============================================================================

#[test]
fn test_status_requires_database() {
    let temp = create_temp_dir();
    let result = cmd_status(&temp.path().join("missing.redb"), false);
    assert!(matches!(result, Err(CliError::NoDatabase(_))));
}

#[test]
fn test_status_counts_records() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);
    cmd_todo_add(&db_path, EMAIL, NewTodo::titled("one")).unwrap();

    let stats = cmd_status(&db_path, true).unwrap();
    assert_eq!(stats.users, 1);
    assert_eq!(stats.todos, 1);
    assert_eq!(stats.sessions, 0);
}

// =============================================================================
// USER COMMAND TESTS
// =============================================================================

#[test]
fn test_user_add_rejects_duplicates() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let result = cmd_user_add(&db_path, "OWNER@example.com", "password123", MIN_ITERATIONS);
    assert!(matches!(result, Err(CliError::Nest(NestError::Conflict(_)))));
}

#[test]
fn test_user_add_validates_input() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let result = cmd_user_add(&db_path, "nope", "short", MIN_ITERATIONS);
    assert!(matches!(result, Err(CliError::Nest(NestError::Validation(_)))));
}

// =============================================================================
// TODO COMMAND TESTS
// =============================================================================

#[test]
fn test_todo_workflow() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let todo = cmd_todo_add(
        &db_path,
        EMAIL,
        NewTodo {
            priority: TodoPriority::High,
            ..NewTodo::titled("Write report")
        },
    )
    .unwrap();
    let id = todo.id.to_string();

    let shown = cmd_todo_show(&db_path, EMAIL, &id).unwrap();
    assert_eq!(shown.title, "Write report");

    let patch = TodoPatch {
        description: Some(Some("quarterly".into())),
        ..TodoPatch::default()
    };
    let updated = cmd_todo_update(&db_path, EMAIL, &id, patch).unwrap();
    assert_eq!(updated.description.as_deref(), Some("quarterly"));

    let done = cmd_todo_complete(&db_path, EMAIL, &id).unwrap();
    assert_eq!(done.status, TodoStatus::Completed);

    cmd_todo_add(&db_path, EMAIL, NewTodo::titled("Second")).unwrap();
    let summary = cmd_todo_list(&db_path, EMAIL, &TodoFilter::default(), false).unwrap();
    assert_eq!(
        summary,
        TodoSummary {
            total: 2,
            completed: 1,
            open: 1
        }
    );

    assert_eq!(cmd_todo_delete(&db_path, EMAIL, &id).unwrap(), todo.id);
    let summary = cmd_todo_list(&db_path, EMAIL, &TodoFilter::default(), true).unwrap();
    assert_eq!(summary.total, 1);
}

/// Parse a `todo` subcommand acting as [`EMAIL`] on `db_path`.
fn parse_todo(db_path: &std::path::Path, args: &[&str]) -> TodoCommand {
    let db = db_path.display().to_string();
    let mut argv = vec!["tasknest", "todo"];
    argv.extend_from_slice(args);
    argv.extend_from_slice(&["--email", EMAIL, "--database", db.as_str()]);

    let Command::Todo { command } = Cli::try_parse_from(argv).unwrap().command else {
        panic!("not a todo command");
    };
    command
}

#[test]
fn test_todo_flags_set_and_clear_fields() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let TodoCommand::Add(add) = parse_todo(
        &db_path,
        &[
            "add", "Renew passport", "--description", "bring photos", "--category", "errands",
            "--status", "in_progress", "--due", "2026-06-01T12:00:00Z",
        ],
    ) else {
        panic!("not an add command");
    };
    let created = cmd_todo_add(&db_path, EMAIL, add.new_todo()).unwrap();
    assert_eq!(created.status, TodoStatus::InProgress);
    assert_eq!(created.category.as_deref(), Some("errands"));
    assert!(created.due_date.is_some());

    let id = created.id.to_string();
    let update = parse_todo(
        &db_path,
        &["update", &id, "--clear-description", "--clear-category", "--clear-due"],
    );
    run_todo(update).unwrap();

    let cleared = cmd_todo_show(&db_path, EMAIL, &id).unwrap();
    assert_eq!(cleared.description, None);
    assert_eq!(cleared.category, None);
    assert_eq!(cleared.due_date, None);
    assert_eq!(cleared.title, "Renew passport");
}

#[test]
fn test_todo_commands_need_known_user() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let result = cmd_todo_add(&db_path, "stranger@example.com", NewTodo::titled("x"));
    assert!(matches!(result, Err(CliError::Nest(NestError::NotFound(_)))));
}

#[test]
fn test_todo_invalid_id() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let result = cmd_todo_show(&db_path, EMAIL, "42");
    assert!(matches!(result, Err(CliError::InvalidId(_))));
}

#[test]
fn test_todo_of_other_user_is_not_found() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);
    cmd_user_add(&db_path, "other@example.com", "password123", MIN_ITERATIONS).unwrap();

    let todo = cmd_todo_add(&db_path, EMAIL, NewTodo::titled("mine")).unwrap();
    let result = cmd_todo_complete(&db_path, "other@example.com", &todo.id.to_string());
    assert!(matches!(result, Err(CliError::Nest(NestError::NotFound(_)))));
}

#[test]
fn test_todo_list_filter_validation() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let filter = TodoFilter {
        page_size: 0,
        ..TodoFilter::default()
    };
    let result = cmd_todo_list(&db_path, EMAIL, &filter, false);
    assert!(matches!(result, Err(CliError::Nest(NestError::Validation(_)))));
}

// =============================================================================
// FORMATTING TESTS
// =============================================================================

#[test]
fn test_list_format_has_summary_footer() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);
    let todo = cmd_todo_add(&db_path, EMAIL, NewTodo::titled("Format me")).unwrap();

    let out = format_todo_list(
        &[todo.clone()],
        &TodoSummary {
            total: 1,
            completed: 0,
            open: 1,
        },
    );
    assert!(out.contains(&format!("[ID: {}] Format me", todo.id)));
    assert!(out.contains("Status: pending"));
    assert!(out.ends_with("Total: 1 | Completed: 0 | Open: 1"));
}
