//! Shade: a normalized in-memory cache for graph-shaped query results.
//!
//! Results are split into flat records keyed by object identity, read back
//! through the same selections, layered with optimistic writes, and pushed to
//! watchers whenever the store changes.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod fragment;
pub mod identity;
pub mod normalize;
pub mod query;
pub mod read;
pub mod storage;
pub mod watch;

pub use cache::{CacheOptions, CacheTransaction, DiffRequest, InMemoryCache, Subscription};
pub use error::{CacheError, Result};
pub use fragment::{FragmentMatcher, HeuristicFragmentMatcher, IntrospectionFragmentMatcher};
pub use identity::{IdentityResolver, ROOT_MUTATION, ROOT_QUERY};
pub use normalize::WriteReport;
pub use read::Diff;
pub use storage::NormalizedSnapshot;
pub use watch::{WatchId, WatchOptions};
