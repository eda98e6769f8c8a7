//! # TaskNest Core
//!
//! The synchronous engine behind the TaskNest todo service.
//!
//! This crate owns everything that does not need a network or an async
//! runtime:
//!
//! - Domain types (`User`, `Todo`, `RefreshSession`)
//! - Input validation with field-level error reporting
//! - Password hashing (PBKDF2-HMAC-SHA256)
//! - HS256 token issuing and verification
//! - Filtering and pagination of todo lists
//! - Storage backends (in-memory and redb)
//! - The [`Nest`] engine, which ties the pieces together and enforces
//!   per-user isolation on every todo operation
//!
//! The HTTP server and CLI live in `apps/tasknest`.

pub mod error;
pub mod model;
pub mod nest;
pub mod password;
pub mod query;
pub mod storage;
pub mod token;
pub mod validate;

pub use error::{FieldError, NestError, NestResult};
pub use model::{RefreshSession, Todo, TodoId, TodoPriority, TodoStatus, User, UserId, UserRole};
pub use nest::{
    AuthContext, HashedSignup, LoginAttempt, Nest, NestConfig, PendingSignup, TodoSummary,
    TokenPair, VerifiedLogin,
};
pub use password::PasswordHasher;
pub use query::{Page, TodoFilter};
pub use storage::{MemoryStore, RedbStore, Store, StoreStats};
pub use token::{Claims, TokenCodec, TokenError, TokenKind, peek_expiry};
pub use validate::{NewTodo, Registration, TodoPatch};
