//! # Storage Module
//!
//! Persistence backends for users, todos and refresh sessions.
//!
//! Two implementations of [`Store`]:
//! - [`MemoryStore`]: BTreeMap-backed, for tests and throwaway servers
//! - [`RedbStore`]: redb embedded database on disk (ACID, crash safe)
//!
//! Backends are dumb: they never filter by ownership or validate input.
//! The engine in [`crate::nest`] does both before anything reaches a store.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::error::NestResult;
use crate::model::{RefreshSession, Todo, TodoId, User, UserId};
use serde::{Deserialize, Serialize};

/// Record counts reported by `tasknest status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub users: u64,
    /// Todos that have not been deleted.
    pub todos: u64,
    /// Refresh sessions, including revoked ones.
    pub sessions: u64,
}

/// Operations every backend provides.
pub trait Store {
    /// Insert a new user. Fails with `Conflict` if the email is taken.
    fn insert_user(&mut self, user: &User) -> NestResult<()>;

    /// Look up a user by id.
    fn user(&self, id: UserId) -> NestResult<Option<User>>;

    /// Look up a user by normalized email.
    fn user_by_email(&self, email: &str) -> NestResult<Option<User>>;

    /// Insert or replace a todo.
    fn put_todo(&mut self, todo: &Todo) -> NestResult<()>;

    /// Look up a todo by id, regardless of owner or deletion.
    fn todo(&self, id: TodoId) -> NestResult<Option<Todo>>;

    /// Every todo owned by `owner`, including deleted ones.
    fn todos_of(&self, owner: UserId) -> NestResult<Vec<Todo>>;

    /// Insert or replace a refresh session.
    fn put_session(&mut self, session: &RefreshSession) -> NestResult<()>;

    /// Look up a refresh session by the hash of its token.
    fn session_by_hash(&self, token_hash: &str) -> NestResult<Option<RefreshSession>>;

    /// Every refresh session of `owner`.
    fn sessions_of(&self, owner: UserId) -> NestResult<Vec<RefreshSession>>;

    /// Record counts.
    fn stats(&self) -> NestResult<StoreStats>;
}

/// Error used by both backends for duplicate emails.
pub(crate) fn email_taken(email: &str) -> crate::NestError {
    crate::NestError::Conflict(format!("A user with email '{}' already exists", email))
}

// =============================================================================
// SHARED BACKEND TESTS
// =============================================================================
