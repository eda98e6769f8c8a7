//! redb-backed store.
//!
//! Records are postcard-encoded under their u128 id. Secondary indexes are
//! separate tables updated in the same write transaction as the record, so a
//! crash never leaves an index pointing at a missing row.
//!
//! | table            | key                 | value        |
//! |------------------|---------------------|--------------|
//! | `users`          | user id             | postcard     |
//! | `user_emails`    | normalized email    | user id      |
//! | `todos`          | todo id             | postcard     |
//! | `todo_owners`    | (user id, todo id)  | ()           |
//! | `sessions`       | session id          | postcard     |
//! | `session_hashes` | token hash (hex)    | session id   |
//! | `session_owners` | (user id, session)  | ()           |

use super::{Store, StoreStats, email_taken};
use crate::error::NestResult;
use crate::model::{RefreshSession, Todo, TodoId, User, UserId};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type Records = TableDefinition<'static, u128, &'static [u8]>;
type Lookup = TableDefinition<'static, &'static str, u128>;
type OwnerIndex = TableDefinition<'static, (u128, u128), ()>;

const USERS: Records = TableDefinition::new("users");
const USER_EMAILS: Lookup = TableDefinition::new("user_emails");
const TODOS: Records = TableDefinition::new("todos");
const TODO_OWNERS: OwnerIndex = TableDefinition::new("todo_owners");
const SESSIONS: Records = TableDefinition::new("sessions");
const SESSION_HASHES: Lookup = TableDefinition::new("session_hashes");
const SESSION_OWNERS: OwnerIndex = TableDefinition::new("session_owners");

/// Durable store in a single redb file.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open the database at `path`, creating it (and its tables) if needed.
    pub fn open(path: impl AsRef<Path>) -> NestResult<Self> {
        let db = Database::create(path)?;
        Self::with_tables(db)
    }

    /// A redb database that lives only in memory.
    pub fn in_memory() -> NestResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::with_tables(db)
    }

    fn with_tables(db: Database) -> NestResult<Self> {
        let txn = db.begin_write()?;
        txn.open_table(USERS)?;
        txn.open_table(USER_EMAILS)?;
        txn.open_table(TODOS)?;
        txn.open_table(TODO_OWNERS)?;
        txn.open_table(SESSIONS)?;
        txn.open_table(SESSION_HASHES)?;
        txn.open_table(SESSION_OWNERS)?;
        txn.commit()?;
        Ok(Self { db })
    }

    fn get_record<T: DeserializeOwned>(&self, table: Records, key: u128) -> NestResult<Option<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(postcard::from_bytes(guard.value())?)),
            None => Ok(None),
        }
    }

    fn lookup(&self, table: Lookup, key: &str) -> NestResult<Option<u128>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        Ok(table.get(key)?.map(|guard| guard.value()))
    }

    fn owned_records<T: DeserializeOwned>(
        &self,
        index: OwnerIndex,
        records: Records,
        owner: UserId,
    ) -> NestResult<Vec<T>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(index)?;
        let records = txn.open_table(records)?;

        let owner = owner.as_u128();
        let mut out = Vec::new();
        for entry in index.range((owner, 0u128)..=(owner, u128::MAX))? {
            let (key, _) = entry?;
            let (_, id) = key.value();
            if let Some(guard) = records.get(id)? {
                out.push(postcard::from_bytes(guard.value())?);
            }
        }
        Ok(out)
    }

    fn put_owned<T: Serialize>(
        &self,
        records: Records,
        index: OwnerIndex,
        id: u128,
        owner: UserId,
        record: &T,
        extra: Option<(Lookup, &str)>,
    ) -> NestResult<()> {
        let bytes = postcard::to_allocvec(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(records)?;
            table.insert(id, bytes.as_slice())?;
            let mut index = txn.open_table(index)?;
            index.insert((owner.as_u128(), id), ())?;
            if let Some((lookup, key)) = extra {
                let mut lookup = txn.open_table(lookup)?;
                lookup.insert(key, id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

impl Store for RedbStore {
    fn insert_user(&mut self, user: &User) -> NestResult<()> {
        let bytes = postcard::to_allocvec(user)?;
        let txn = self.db.begin_write()?;
        {
            let mut emails = txn.open_table(USER_EMAILS)?;
            if emails.get(user.email.as_str())?.is_some() {
                return Err(email_taken(&user.email));
            }
            emails.insert(user.email.as_str(), user.id.as_u128())?;
            let mut users = txn.open_table(USERS)?;
            users.insert(user.id.as_u128(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn user(&self, id: UserId) -> NestResult<Option<User>> {
        self.get_record(USERS, id.as_u128())
    }

    fn user_by_email(&self, email: &str) -> NestResult<Option<User>> {
        match self.lookup(USER_EMAILS, email)? {
            Some(id) => self.get_record(USERS, id),
            None => Ok(None),
        }
    }

    fn put_todo(&mut self, todo: &Todo) -> NestResult<()> {
        self.put_owned(TODOS, TODO_OWNERS, todo.id.as_u128(), todo.user_id, todo, None)
    }

    fn todo(&self, id: TodoId) -> NestResult<Option<Todo>> {
        self.get_record(TODOS, id.as_u128())
    }

    fn todos_of(&self, owner: UserId) -> NestResult<Vec<Todo>> {
        self.owned_records(TODO_OWNERS, TODOS, owner)
    }

    fn put_session(&mut self, session: &RefreshSession) -> NestResult<()> {
        self.put_owned(
            SESSIONS,
            SESSION_OWNERS,
            session.id.as_u128(),
            session.user_id,
            session,
            Some((SESSION_HASHES, session.token_hash.as_str())),
        )
    }

    fn session_by_hash(&self, token_hash: &str) -> NestResult<Option<RefreshSession>> {
        match self.lookup(SESSION_HASHES, token_hash)? {
            Some(id) => self.get_record(SESSIONS, id),
            None => Ok(None),
        }
    }

    fn sessions_of(&self, owner: UserId) -> NestResult<Vec<RefreshSession>> {
        self.owned_records(SESSION_OWNERS, SESSIONS, owner)
    }

    fn stats(&self) -> NestResult<StoreStats> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS)?.len()?;
        let sessions = txn.open_table(SESSIONS)?.len()?;

        let todos = txn.open_table(TODOS)?;
        let mut live = 0u64;
        for entry in todos.iter()? {
            let (_, value) = entry?;
            let todo: Todo = postcard::from_bytes(value.value())?;
            if todo.is_live() {
                live += 1;
            }
        }

        Ok(StoreStats {
            users,
            todos: live,
            sessions,
        })
    }
}
