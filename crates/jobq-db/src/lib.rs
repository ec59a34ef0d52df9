//! Persistence layer for jobq.
//!
//! A [`Store`] wraps one SQLite connection and exposes every job operation
//! the daemon needs. Lock contention between connections is absorbed by the
//! [`RetryPolicy`]; callers never see "database is locked". A [`StorePool`]
//! hands out exclusive handles to async code.

pub mod error;
pub mod pool;
pub mod query;
pub mod retry;
pub mod schema;
pub mod store;

pub use error::{DbError, DbResult};
pub use pool::{PooledStore, StorePool};
pub use query::Query;
pub use retry::{RetryPolicy, is_transient};
pub use store::Store;
