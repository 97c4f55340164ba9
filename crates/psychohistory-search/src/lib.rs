//! Search access for the PsychoHistory researcher.
//!
//! The [`SearchClient`] wraps a pluggable [`SearchProvider`] backend with a
//! sliding-window rate limiter and an exponential-backoff retry ladder for
//! transient failures. Real backends (Exa, Tavily) issue HTTP requests; the
//! mock backend is deterministic and offline.

pub mod client;
pub mod error;
mod exa;
mod mock;
pub mod provider;
pub mod rate_limiter;
mod tavily;

pub use client::{SearchClient, SearchClientConfig};
pub use error::SearchError;
pub use exa::ExaProvider;
pub use mock::MockSearchProvider;
pub use provider::{SearchProvider, SearchProviderKind};
pub use rate_limiter::SlidingWindowLimiter;
pub use tavily::TavilyProvider;
