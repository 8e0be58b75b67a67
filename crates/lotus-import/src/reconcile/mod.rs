//! Reconciliation core
//!
//! - **cache**: natural key -> entity with a process-local surrogate id
//! - **retry**: bounded retries over a set of recoverable error kinds
//! - **rate_limit**: per-API pacing with server feedback
//! - **client**: rate-limited, retried calls to one remote API
//! - **resolver**: chunked batch lookups of natural keys in the remote store
//! - **normalize**: key normalization applied before matching

pub mod cache;
pub mod client;
pub mod normalize;
pub mod rate_limit;
pub mod resolver;
pub mod retry;

pub use cache::IdentityCache;
pub use client::{ApiRequest, ApiResponse, HttpTransport, Method, RemoteApiClient, Transport};
pub use normalize::KeyNormalization;
pub use rate_limit::{FeedbackHeaders, RateLimitFeedback, RateLimiter};
pub use resolver::{
    BatchLookupResult, BatchResolver, ChunkProgress, KeyProperty, LookupDialect, MatchStatus, ResolverConfig,
};
pub use retry::RetryPolicy;
