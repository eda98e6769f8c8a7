//! # CLI
//!
//! Command definitions and local administration commands.
//!
//! Everything except `serve` works directly on a redb file and never opens a
//! network socket. Todo commands act as the user named by `--email`.

use crate::config::ConfigError;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tasknest_core::{
    MemoryStore, Nest, NestConfig, NestError, NewTodo, RedbStore, Registration, Store, StoreStats,
    Todo, TodoFilter, TodoId, TodoPatch, TodoPriority, TodoStatus, TodoSummary, TokenCodec, User,
};
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Nest(#[from] NestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database already exists at {0} (use --force to recreate)")]
    DatabaseExists(PathBuf),

    #[error("no database at {0} (run `tasknest init` first)")]
    NoDatabase(PathBuf),

    #[error("'{0}' is not a valid todo id")]
    InvalidId(String),

    #[error("server error: {0}")]
    Server(String),
}

pub type CliResult<T> = Result<T, CliError>;

// =============================================================================
// COMMAND LINE
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "tasknest", version, about = "TaskNest todo server and console")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API server.
    Serve {
        #[arg(long, env = "TASKNEST_HOST")]
        host: Option<String>,
        #[arg(long, env = "TASKNEST_PORT")]
        port: Option<u16>,
        #[command(flatten)]
        db: DatabaseArg,
        #[arg(long, value_enum, default_value_t = Backend::Redb)]
        backend: Backend,
    },
    /// Create an empty database.
    Init {
        #[command(flatten)]
        db: DatabaseArg,
        /// Replace an existing database.
        #[arg(long)]
        force: bool,
    },
    /// Show record counts.
    Status {
        #[command(flatten)]
        db: DatabaseArg,
        #[arg(long)]
        json: bool,
    },
    /// Manage accounts.
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Manage a user's todos.
    Todo {
        #[command(subcommand)]
        command: TodoCommand,
    },
}

#[derive(Debug, Args)]
pub struct DatabaseArg {
    #[arg(long = "database", env = "TASKNEST_DATABASE", default_value = "tasknest.redb")]
    pub path: PathBuf,
}

/// Storage backend for `serve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Redb,
    Memory,
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create an account.
    Add {
        email: String,
        password: String,
        #[command(flatten)]
        db: DatabaseArg,
        #[arg(long, env = "TASKNEST_PASSWORD_ITERATIONS", default_value_t = tasknest_core::password::DEFAULT_ITERATIONS)]
        iterations: u32,
    },
}

#[derive(Debug, Args)]
pub struct Owner {
    /// Email of the account to act as.
    #[arg(long)]
    pub email: String,
    #[command(flatten)]
    pub db: DatabaseArg,
}

#[derive(Debug, Subcommand)]
pub enum TodoCommand {
    /// Add a todo.
    Add(AddArgs),
    /// List todos with a summary.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<TodoStatus>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TodoPriority>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = tasknest_core::query::DEFAULT_PAGE_SIZE)]
        page_size: u32,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        owner: Owner,
    },
    /// Show one todo.
    Show {
        id: String,
        #[command(flatten)]
        owner: Owner,
    },
    /// Change fields of a todo.
    Update(UpdateArgs),
    /// Mark a todo completed.
    Complete {
        id: String,
        #[command(flatten)]
        owner: Owner,
    },
    /// Delete a todo.
    Delete {
        id: String,
        #[command(flatten)]
        owner: Owner,
    },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TodoStatus>,
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<TodoPriority>,
    /// Due date in RFC 3339, e.g. 2026-01-31T17:00:00Z.
    #[arg(long, value_parser = parse_due)]
    pub due: Option<DateTime<Utc>>,
    #[arg(long)]
    pub category: Option<String>,
    #[command(flatten)]
    pub owner: Owner,
}

impl AddArgs {
    pub fn new_todo(&self) -> NewTodo {
        NewTodo {
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            due_date: self.due,
            category: self.category.clone(),
        }
    }
}

/// Flags of `todo update`. Each `--clear-*` flag empties its field.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub clear_description: bool,
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TodoStatus>,
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<TodoPriority>,
    /// Due date in RFC 3339, e.g. 2026-01-31T17:00:00Z.
    #[arg(long, value_parser = parse_due, conflicts_with = "clear_due")]
    pub due: Option<DateTime<Utc>>,
    #[arg(long)]
    pub clear_due: bool,
    #[arg(long, conflicts_with = "clear_category")]
    pub category: Option<String>,
    #[arg(long)]
    pub clear_category: bool,
    #[command(flatten)]
    pub owner: Owner,
}

impl UpdateArgs {
    pub fn patch(&self) -> TodoPatch {
        TodoPatch {
            title: self.title.clone(),
            description: change(self.description.clone(), self.clear_description),
            status: self.status,
            priority: self.priority,
            due_date: change(self.due, self.clear_due),
            category: change(self.category.clone(), self.clear_category),
        }
    }
}

fn change<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear { Some(None) } else { value.map(Some) }
}

fn parse_due(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|due| due.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 such as 2026-01-31T17:00:00Z ({})", e))
}

fn parse_status(raw: &str) -> Result<TodoStatus, String> {
    raw.parse()
}

fn parse_priority(raw: &str) -> Result<TodoPriority, String> {
    raw.parse()
}

// =============================================================================
// STORAGE HELPERS
// =============================================================================

/// Open a store for `serve`.
pub fn open_store(path: &Path, backend: Backend) -> CliResult<Box<dyn Store + Send>> {
    Ok(match backend {
        Backend::Redb => Box::new(RedbStore::open(path)?),
        Backend::Memory => Box::new(MemoryStore::new()),
    })
}

/// Engine over an existing local database.
///
/// Local commands never issue tokens, so the signing key is random.
fn local_nest(path: &Path, iterations: u32) -> CliResult<Nest> {
    if !path.exists() {
        return Err(CliError::NoDatabase(path.to_path_buf()));
    }
    let store = RedbStore::open(path)?;
    let config = NestConfig {
        password_iterations: iterations,
        ..NestConfig::default()
    };
    let secret = uuid::Uuid::new_v4().simple().to_string();
    Ok(Nest::new(Box::new(store), TokenCodec::new(&secret), config))
}

fn parse_id(raw: &str) -> CliResult<TodoId> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(raw.to_string()))
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Create an empty database file.
pub fn cmd_init(path: &Path, force: bool) -> CliResult<()> {
    if path.exists() {
        if !force {
            return Err(CliError::DatabaseExists(path.to_path_buf()));
        }
        std::fs::remove_file(path)?;
    }
    RedbStore::open(path)?;
    tracing::info!(path = %path.display(), "database initialized");
    println!("Initialized database at {}", path.display());
    Ok(())
}

/// Print record counts.
pub fn cmd_status(path: &Path, json: bool) -> CliResult<StoreStats> {
    let stats = local_nest(path, tasknest_core::password::MIN_ITERATIONS)?.stats()?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "database": path.display().to_string(),
                "users": stats.users,
                "todos": stats.todos,
                "sessions": stats.sessions,
            }))?
        );
    } else {
        println!("Database: {}", path.display());
        println!("Users:    {}", stats.users);
        println!("Todos:    {}", stats.todos);
        println!("Sessions: {}", stats.sessions);
    }
    Ok(stats)
}

pub fn cmd_user_add(path: &Path, email: &str, password: &str, iterations: u32) -> CliResult<User> {
    let mut nest = local_nest(path, iterations)?;
    let user = nest.create_user(Registration::new(email, password))?;
    println!("✓ Created user {} ({})", user.email, user.id);
    Ok(user)
}

pub fn cmd_todo_add(path: &Path, email: &str, input: NewTodo) -> CliResult<Todo> {
    let mut nest = local_nest(path, tasknest_core::password::MIN_ITERATIONS)?;
    let ctx = nest.impersonate(email)?;
    let todo = nest.create_todo(&ctx, input)?;
    println!("✓ Todo added\n\n{}", format_todo(&todo));
    Ok(todo)
}

/// Print one page of todos followed by the owner's totals.
pub fn cmd_todo_list(path: &Path, email: &str, filter: &TodoFilter, json: bool) -> CliResult<TodoSummary> {
    let nest = local_nest(path, tasknest_core::password::MIN_ITERATIONS)?;
    let ctx = nest.impersonate(email)?;
    let page = nest.list_todos(&ctx, filter)?;
    let summary = nest.todo_summary(&ctx)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        println!("{}", format_todo_list(&page.items, &summary));
        if page.total_pages > 1 {
            println!("Page {} of {} ({} matching)", page.page, page.total_pages, page.total);
        }
    }
    Ok(summary)
}

pub fn cmd_todo_show(path: &Path, email: &str, id: &str) -> CliResult<Todo> {
    let nest = local_nest(path, tasknest_core::password::MIN_ITERATIONS)?;
    let ctx = nest.impersonate(email)?;
    let todo = nest.get_todo(&ctx, parse_id(id)?)?;
    println!("{}", format_todo(&todo));
    Ok(todo)
}

pub fn cmd_todo_update(path: &Path, email: &str, id: &str, patch: TodoPatch) -> CliResult<Todo> {
    let mut nest = local_nest(path, tasknest_core::password::MIN_ITERATIONS)?;
    let ctx = nest.impersonate(email)?;
    let todo = nest.update_todo(&ctx, parse_id(id)?, patch)?;
    println!("✓ Todo updated\n\n{}", format_todo(&todo));
    Ok(todo)
}

pub fn cmd_todo_complete(path: &Path, email: &str, id: &str) -> CliResult<Todo> {
    let mut nest = local_nest(path, tasknest_core::password::MIN_ITERATIONS)?;
    let ctx = nest.impersonate(email)?;
    let todo = nest.complete_todo(&ctx, parse_id(id)?)?;
    println!("✓ Todo completed\n\n{}", format_todo(&todo));
    Ok(todo)
}

pub fn cmd_todo_delete(path: &Path, email: &str, id: &str) -> CliResult<TodoId> {
    let mut nest = local_nest(path, tasknest_core::password::MIN_ITERATIONS)?;
    let ctx = nest.impersonate(email)?;
    let id = nest.delete_todo(&ctx, parse_id(id)?)?;
    println!("✓ Todo {} deleted", id);
    Ok(id)
}

/// Run a parsed `todo` subcommand.
pub fn run_todo(command: TodoCommand) -> CliResult<()> {
    match command {
        TodoCommand::Add(args) => {
            cmd_todo_add(&args.owner.db.path, &args.owner.email, args.new_todo()).map(drop)
        }
        TodoCommand::List {
            search,
            status,
            priority,
            category,
            page,
            page_size,
            json,
            owner,
        } => {
            let filter = TodoFilter {
                page,
                page_size,
                search,
                status,
                priority,
                category,
            };
            cmd_todo_list(&owner.db.path, &owner.email, &filter, json).map(drop)
        }
        TodoCommand::Show { id, owner } => cmd_todo_show(&owner.db.path, &owner.email, &id).map(drop),
        TodoCommand::Update(args) => {
            cmd_todo_update(&args.owner.db.path, &args.owner.email, &args.id, args.patch()).map(drop)
        }
        TodoCommand::Complete { id, owner } => {
            cmd_todo_complete(&owner.db.path, &owner.email, &id).map(drop)
        }
        TodoCommand::Delete { id, owner } => {
            cmd_todo_delete(&owner.db.path, &owner.email, &id).map(drop)
        }
    }
}

// =============================================================================
// CONSOLE FORMATTING
// =============================================================================

const RULE: &str = "===========================================";

/// One todo as shown on the console.
pub fn format_todo(todo: &Todo) -> String {
    let mut out = format!(
        "[ID: {}] {}\nDescription: {}\nStatus: {}\nPriority: {}",
        todo.id,
        todo.title,
        todo.description.as_deref().unwrap_or(""),
        todo.status.as_str(),
        todo.priority.as_str(),
    );
    if let Some(category) = &todo.category {
        out.push_str(&format!("\nCategory: {}", category));
    }
    if let Some(due) = &todo.due_date {
        out.push_str(&format!("\nDue: {}", due.format("%Y-%m-%d %H:%M UTC")));
    }
    out
}

/// A list of todos with the `Total | Completed | Open` footer.
pub fn format_todo_list(todos: &[Todo], summary: &TodoSummary) -> String {
    let header = format!("{RULE}\n           YOUR TODOS\n{RULE}\n\n");
    if todos.is_empty() {
        return format!("{header}No todos found. Add a todo to get started!");
    }
    let body = todos.iter().map(format_todo).collect::<Vec<_>>().join("\n\n");
    format!(
        "{header}{body}\n\n-------------------------------------------\nTotal: {} | Completed: {} | Open: {}",
        summary.total, summary.completed, summary.open
    )
}
