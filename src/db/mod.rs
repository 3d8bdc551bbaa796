//! Primary document store: PostgreSQL pool and per-aggregate repositories

pub mod logs;
pub mod pool;
pub mod projects;
pub mod schema;
pub mod users;

pub use logs::LogRepository;
pub use pool::{DbError, DbPool};
pub use projects::ProjectRepository;
pub use users::{OwnerUsageMeta, User, UserRepository};
