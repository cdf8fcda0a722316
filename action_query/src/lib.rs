//! Cache-adapter glue for `actionstate` server actions.
//!
//! A query cache wants a fetch function that either returns data or fails
//! through its own error channel. These adapters unwrap a server action's
//! outcome into exactly that: success data passes through unchanged, a
//! failed outcome becomes a [`QueryError`]. Caching, invalidation and
//! retry policy stay with the cache.

pub mod error;
pub mod infinite;
pub mod keys;
pub mod query;

pub use error::QueryError;
pub use infinite::{ActionInfiniteQuery, InfiniteData};
pub use keys::{QueryKey, QueryKeyFactory};
pub use query::{ActionMutation, ActionQuery};
