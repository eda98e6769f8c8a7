//! # Nest Engine
//!
//! The entry point for every TaskNest operation.
//!
//! A [`Nest`] owns a storage backend, the token codec and the password
//! hasher. Auth operations issue and rotate tokens; todo operations take the
//! caller's [`AuthContext`] and never touch a record owned by someone else.
//! A todo that belongs to another user is reported exactly like a missing
//! one, so a caller cannot learn which ids exist.
//!
//! The engine is synchronous. The HTTP layer wraps it in a mutex.
//!
//! Password hashing is split out of the engine calls: [`Nest::begin_signup`]
//! and [`Nest::begin_login`] return values whose slow PBKDF2 step runs
//! without borrowing the engine, and the matching `finish_*` call stores the
//! result. [`Nest::register`] and [`Nest::login`] chain both halves.

use crate::error::{NestError, NestResult};
use crate::model::{RefreshSession, Todo, TodoId, TodoStatus, User, UserId, UserRole};
use crate::password::PasswordHasher;
use crate::query::{Page, TodoFilter};
use crate::storage::{MemoryStore, Store, StoreStats};
use crate::token::{Claims, TokenCodec, TokenError, TokenKind};
use crate::validate::{NewTodo, Registration, TodoPatch, normalize_email};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use std::sync::{Arc, OnceLock};

const BAD_CREDENTIALS: &str = "Invalid email or password";

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestConfig {
    /// Lifetime of access tokens.
    pub access_ttl: Duration,
    /// Lifetime of refresh tokens and their sessions.
    pub refresh_ttl: Duration,
    /// PBKDF2 iterations for new password hashes.
    pub password_iterations: u32,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            password_iterations: crate::password::DEFAULT_ITERATIONS,
        }
    }
}

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// Tokens handed out at signup, login and refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub user: User,
}

/// Identity extracted from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: UserId,
    pub email: String,
    pub role: UserRole,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

impl From<&User> for AuthContext {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// A validated signup whose password has not been hashed yet.
pub struct PendingSignup {
    registration: Registration,
    hasher: PasswordHasher,
}

impl std::fmt::Debug for PendingSignup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSignup")
            .field("email", &self.registration.email)
            .finish_non_exhaustive()
    }
}

impl PendingSignup {
    /// Run PBKDF2 over the password. Slow; does not need the engine.
    #[must_use]
    pub fn hash(self) -> HashedSignup {
        HashedSignup {
            password_hash: self.hasher.hash(&self.registration.password),
            email: self.registration.email,
        }
    }
}

/// A signup ready to be stored by [`Nest::finish_signup`].
#[derive(Debug)]
pub struct HashedSignup {
    email: String,
    password_hash: String,
}

/// A login whose password has not been checked yet.
///
/// Unknown emails are checked against a decoy hash with the configured
/// iteration count, so both failure paths cost the same.
#[derive(Debug)]
pub struct LoginAttempt {
    user: Option<User>,
    decoy: Decoy,
    hasher: PasswordHasher,
}

impl LoginAttempt {
    /// Check the password. Slow; does not need the engine.
    pub fn verify(self, password: &str) -> NestResult<VerifiedLogin> {
        let hasher = self.hasher;
        let encoded = match &self.user {
            Some(user) => user.password_hash.as_str(),
            None => self
                .decoy
                .get_or_init(|| hasher.hash(&Uuid::new_v4().to_string()))
                .as_str(),
        };
        let matches = hasher.verify(password, encoded);
        match self.user {
            Some(user) if matches => Ok(VerifiedLogin(user)),
            _ => Err(NestError::Unauthorized(BAD_CREDENTIALS.into())),
        }
    }
}

/// An account whose password matched. Only [`LoginAttempt::verify`] makes one.
#[derive(Debug)]
pub struct VerifiedLogin(User);

/// Counts shown under a todo listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoSummary {
    pub total: u64,
    pub completed: u64,
    pub open: u64,
}

// =============================================================================
// ENGINE
// =============================================================================

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Decoy password hash, built by the first login for an unknown email.
type Decoy = Arc<OnceLock<String>>;

/// The TaskNest engine.
pub struct Nest {
    store: Box<dyn Store + Send>,
    tokens: TokenCodec,
    hasher: PasswordHasher,
    config: NestConfig,
    clock: Clock,
    decoy: Decoy,
}

impl std::fmt::Debug for Nest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nest")
            .field("tokens", &self.tokens)
            .field("hasher", &self.hasher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Nest {
    /// Create an engine over any backend.
    pub fn new(store: Box<dyn Store + Send>, tokens: TokenCodec, config: NestConfig) -> Self {
        Self {
            store,
            tokens,
            hasher: PasswordHasher::new(config.password_iterations),
            config,
            clock: Arc::new(Utc::now),
            decoy: Decoy::default(),
        }
    }

    /// Engine over a fresh [`MemoryStore`].
    pub fn in_memory(secret: &str, config: NestConfig) -> Self {
        Self::new(Box::new(MemoryStore::new()), TokenCodec::new(secret), config)
    }

    /// Replace the wall clock. Used to test expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn config(&self) -> &NestConfig {
        &self.config
    }

    /// The codec, for verifying tokens without holding the engine.
    #[must_use]
    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn stats(&self) -> NestResult<StoreStats> {
        self.store.stats()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // =========================================================================
    // ACCOUNTS
    // =========================================================================

    /// Validate a registration and make sure the email is free.
    pub fn begin_signup(&self, registration: Registration) -> NestResult<PendingSignup> {
        let registration = registration.validate()?;
        self.ensure_email_free(&registration.email)?;
        Ok(PendingSignup {
            registration,
            hasher: self.hasher,
        })
    }

    /// Store a hashed signup and log the new account in.
    pub fn finish_signup(&mut self, signup: HashedSignup) -> NestResult<TokenPair> {
        let user = self.insert_account(signup)?;
        self.issue_pair(&user)
    }

    /// Create an account without logging in.
    pub fn create_user(&mut self, registration: Registration) -> NestResult<User> {
        let signup = self.begin_signup(registration)?.hash();
        self.insert_account(signup)
    }

    /// Create an account and log it in.
    pub fn register(&mut self, registration: Registration) -> NestResult<TokenPair> {
        let user = self.create_user(registration)?;
        self.issue_pair(&user)
    }

    /// Look up the account behind an email for a password check.
    pub fn begin_login(&self, email: &str) -> NestResult<LoginAttempt> {
        Ok(LoginAttempt {
            user: self.store.user_by_email(&normalize_email(email))?,
            decoy: Arc::clone(&self.decoy),
            hasher: self.hasher,
        })
    }

    /// Issue tokens for an account whose password matched.
    pub fn finish_login(&mut self, login: VerifiedLogin) -> NestResult<TokenPair> {
        self.issue_pair(&login.0)
    }

    /// Exchange credentials for a token pair.
    ///
    /// Unknown email and wrong password produce the same error.
    pub fn login(&mut self, email: &str, password: &str) -> NestResult<TokenPair> {
        let verified = self.begin_login(email)?.verify(password)?;
        self.finish_login(verified)
    }

    /// Rotate a refresh token: the old session is revoked and a new pair issued.
    ///
    /// A token whose session was already revoked is treated as stolen: every
    /// active session of its owner is revoked and [`TokenError::Reused`] is
    /// returned. A token with no session at all is [`TokenError::Revoked`].
    pub fn refresh(&mut self, refresh_token: &str) -> NestResult<TokenPair> {
        let now = self.now();
        let claims = self
            .tokens
            .decode(refresh_token, TokenKind::Refresh, now.timestamp())?;

        let mut session = self
            .store
            .session_by_hash(&token_hash(refresh_token))?
            .filter(|s| s.user_id == claims.sub)
            .ok_or(TokenError::Revoked)?;

        if session.revoked_at.is_some() {
            self.revoke_all(claims.sub, now)?;
            return Err(TokenError::Reused.into());
        }
        if session.expires_at <= now {
            return Err(TokenError::Expired.into());
        }

        let user = self
            .store
            .user(claims.sub)?
            .ok_or_else(|| NestError::Unauthorized("User no longer exists".into()))?;

        session.revoked_at = Some(now);
        self.store.put_session(&session)?;
        self.issue_pair(&user)
    }

    /// Revoke every session of the token's owner, on all devices.
    /// Repeating it is harmless.
    pub fn logout(&mut self, refresh_token: &str) -> NestResult<()> {
        let now = self.now();
        let claims = self
            .tokens
            .decode(refresh_token, TokenKind::Refresh, now.timestamp())?;
        self.revoke_all(claims.sub, now)
    }

    /// Verify an access token.
    pub fn authenticate(&self, access_token: &str) -> NestResult<AuthContext> {
        let claims = self
            .tokens
            .decode(access_token, TokenKind::Access, self.now().timestamp())?;
        Ok(claims.into())
    }

    /// Load the account behind a verified identity.
    pub fn current_user(&self, ctx: &AuthContext) -> NestResult<User> {
        self.store
            .user(ctx.user_id)?
            .ok_or_else(|| NestError::Unauthorized("User no longer exists".into()))
    }

    /// Act as the account with this email (local administration only).
    pub fn impersonate(&self, email: &str) -> NestResult<AuthContext> {
        let email = normalize_email(email);
        self.store
            .user_by_email(&email)?
            .map(|user| AuthContext::from(&user))
            .ok_or_else(|| NestError::NotFound(format!("No user with email '{}'", email)))
    }

    fn ensure_email_free(&self, email: &str) -> NestResult<()> {
        if self.store.user_by_email(email)?.is_some() {
            return Err(NestError::Conflict(format!(
                "A user with email '{}' already exists",
                email
            )));
        }
        Ok(())
    }

    fn insert_account(&mut self, signup: HashedSignup) -> NestResult<User> {
        // The email may have been taken while the password was hashing.
        self.ensure_email_free(&signup.email)?;

        let now = self.now();
        let user = User {
            id: UserId::new_v4(),
            email: signup.email,
            password_hash: signup.password_hash,
            role: UserRole::User,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_user(&user)?;
        Ok(user)
    }

    fn issue_pair(&mut self, user: &User) -> NestResult<TokenPair> {
        let now = self.now();
        let ts = now.timestamp();
        let session_expiry = now
            .checked_add_signed(self.config.refresh_ttl)
            .ok_or_else(|| TokenError::Encoding("refresh lifetime out of range".into()))?;

        let access = Claims::new(
            user.id,
            user.email.clone(),
            user.role,
            TokenKind::Access,
            ts,
            self.config.access_ttl.num_seconds(),
        );
        let refresh = Claims::new(
            user.id,
            user.email.clone(),
            user.role,
            TokenKind::Refresh,
            ts,
            self.config.refresh_ttl.num_seconds(),
        );
        let access_token = self.tokens.issue(&access)?;
        let refresh_token = self.tokens.issue(&refresh)?;

        self.store.put_session(&RefreshSession {
            id: refresh.jti,
            user_id: user.id,
            token_hash: token_hash(&refresh_token),
            expires_at: session_expiry,
            created_at: now,
            revoked_at: None,
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl.num_seconds(),
            user: user.clone(),
        })
    }

    fn revoke_all(&mut self, owner: UserId, now: DateTime<Utc>) -> NestResult<()> {
        for mut session in self.store.sessions_of(owner)? {
            if session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                self.store.put_session(&session)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // TODOS
    // =========================================================================

    pub fn create_todo(&mut self, ctx: &AuthContext, input: NewTodo) -> NestResult<Todo> {
        let input = input.validate()?;
        let now = self.now();
        let todo = Todo {
            id: TodoId::new_v4(),
            user_id: ctx.user_id,
            title: input.title,
            description: input.description,
            status: input.status,
            priority: input.priority,
            due_date: input.due_date,
            category: input.category,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.store.put_todo(&todo)?;
        Ok(todo)
    }

    pub fn list_todos(&self, ctx: &AuthContext, filter: &TodoFilter) -> NestResult<Page<Todo>> {
        filter.validate()?;
        Ok(filter.apply(self.store.todos_of(ctx.user_id)?))
    }

    pub fn get_todo(&self, ctx: &AuthContext, id: TodoId) -> NestResult<Todo> {
        self.store
            .todo(id)?
            .filter(|t| t.user_id == ctx.user_id && t.is_live())
            .ok_or_else(|| todo_not_found(id))
    }

    /// Apply a partial update. `updated_at` moves only if a value changed.
    pub fn update_todo(&mut self, ctx: &AuthContext, id: TodoId, patch: TodoPatch) -> NestResult<Todo> {
        let patch = patch.validate()?;
        let before = self.get_todo(ctx, id)?;
        let mut todo = before.clone();

        if let Some(title) = patch.title {
            todo.title = title;
        }
        if let Some(description) = patch.description {
            todo.description = description;
        }
        if let Some(status) = patch.status {
            todo.status = status;
        }
        if let Some(priority) = patch.priority {
            todo.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            todo.due_date = due_date;
        }
        if let Some(category) = patch.category {
            todo.category = category;
        }

        if todo == before {
            return Ok(before);
        }
        todo.updated_at = self.now();
        self.store.put_todo(&todo)?;
        Ok(todo)
    }

    /// Soft-delete a todo. It disappears from every later read.
    pub fn delete_todo(&mut self, ctx: &AuthContext, id: TodoId) -> NestResult<TodoId> {
        let mut todo = self.get_todo(ctx, id)?;
        let now = self.now();
        todo.deleted_at = Some(now);
        todo.updated_at = now;
        self.store.put_todo(&todo)?;
        Ok(id)
    }

    /// Mark a todo completed. Completing it twice is not an error.
    pub fn complete_todo(&mut self, ctx: &AuthContext, id: TodoId) -> NestResult<Todo> {
        let mut todo = self.get_todo(ctx, id)?;
        if todo.status.is_done() {
            return Ok(todo);
        }
        todo.status = TodoStatus::Completed;
        todo.updated_at = self.now();
        self.store.put_todo(&todo)?;
        Ok(todo)
    }

    pub fn todo_summary(&self, ctx: &AuthContext) -> NestResult<TodoSummary> {
        let live: Vec<Todo> = self
            .store
            .todos_of(ctx.user_id)?
            .into_iter()
            .filter(|t| t.is_live())
            .collect();
        let completed = live.iter().filter(|t| t.status.is_done()).count() as u64;
        let total = live.len() as u64;
        Ok(TodoSummary {
            total,
            completed,
            open: total - completed,
        })
    }
}

fn todo_not_found(id: TodoId) -> NestError {
    NestError::NotFound(format!("Todo with id '{}' not found", id))
}

/// Hex SHA-256 of a raw refresh token, the only form that is stored.
fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// =============================================================================
// TESTS
// =============================================================================
