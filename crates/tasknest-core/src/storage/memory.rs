//! In-memory backend.
//!
//! Uses BTreeMap everywhere so iteration order is stable between runs.

use super::{Store, StoreStats, email_taken};
use crate::error::NestResult;
use crate::model::{RefreshSession, Todo, TodoId, User, UserId};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Volatile store. Everything is lost when it is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: BTreeMap<UserId, User>,
    emails: BTreeMap<String, UserId>,
    todos: BTreeMap<TodoId, Todo>,
    todos_by_owner: BTreeSet<(UserId, TodoId)>,
    sessions: BTreeMap<Uuid, RefreshSession>,
    session_hashes: BTreeMap<String, Uuid>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert_user(&mut self, user: &User) -> NestResult<()> {
        if self.emails.contains_key(&user.email) {
            return Err(email_taken(&user.email));
        }
        self.emails.insert(user.email.clone(), user.id);
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    fn user(&self, id: UserId) -> NestResult<Option<User>> {
        Ok(self.users.get(&id).cloned())
    }

    fn user_by_email(&self, email: &str) -> NestResult<Option<User>> {
        Ok(self
            .emails
            .get(email)
            .and_then(|id| self.users.get(id))
            .cloned())
    }

    fn put_todo(&mut self, todo: &Todo) -> NestResult<()> {
        self.todos_by_owner.insert((todo.user_id, todo.id));
        self.todos.insert(todo.id, todo.clone());
        Ok(())
    }

    fn todo(&self, id: TodoId) -> NestResult<Option<Todo>> {
        Ok(self.todos.get(&id).cloned())
    }

    fn todos_of(&self, owner: UserId) -> NestResult<Vec<Todo>> {
        let start = (owner, TodoId::from_u128(0));
        let end = (owner, TodoId::from_u128(u128::MAX));
        Ok(self
            .todos_by_owner
            .range(start..=end)
            .filter_map(|(_, id)| self.todos.get(id).cloned())
            .collect())
    }

    fn put_session(&mut self, session: &RefreshSession) -> NestResult<()> {
        self.session_hashes
            .insert(session.token_hash.clone(), session.id);
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn session_by_hash(&self, token_hash: &str) -> NestResult<Option<RefreshSession>> {
        Ok(self
            .session_hashes
            .get(token_hash)
            .and_then(|id| self.sessions.get(id))
            .cloned())
    }

    fn sessions_of(&self, owner: UserId) -> NestResult<Vec<RefreshSession>> {
        Ok(self
            .sessions
            .values()
            .filter(|s| s.user_id == owner)
            .cloned()
            .collect())
    }

    fn stats(&self) -> NestResult<StoreStats> {
        Ok(StoreStats {
            users: self.users.len() as u64,
            todos: self.todos.values().filter(|t| t.is_live()).count() as u64,
            sessions: self.sessions.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;

    #[test]
    fn users_round_trip() {
        contract::users_round_trip(&mut MemoryStore::new());
    }

    #[test]
    fn duplicate_email_conflicts() {
        contract::duplicate_email_conflicts(&mut MemoryStore::new());
    }

    #[test]
    fn todos_are_indexed_by_owner() {
        contract::todos_are_indexed_by_owner(&mut MemoryStore::new());
    }

    #[test]
    fn put_todo_replaces() {
        contract::put_todo_replaces(&mut MemoryStore::new());
    }

    #[test]
    fn sessions_round_trip() {
        contract::sessions_round_trip(&mut MemoryStore::new());
    }
}
