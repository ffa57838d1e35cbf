#![deny(missing_docs)]
//! Shared toolkit for the fochs agent core.
//!
//! Provides the [`Provider`] trait for making model calls, the closed
//! [`ProviderId`] set the router selects from, and the message types
//! every other crate speaks.

pub mod provider;
pub mod types;

// Re-exports
pub use provider::{Provider, ProviderError, ProviderId, UnknownProvider};
pub use types::*;
