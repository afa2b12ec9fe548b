//! Shared data models for the aggregation pipeline.
//!
//! Every document stored in the cache and served by the read API is one of
//! these shapes, serialized as self-describing JSON.

mod asset;
mod circuit;
mod news;
mod provider;
mod quote;

pub use asset::Asset;
pub use circuit::CircuitBreakerState;
pub use news::NewsArticle;
pub use provider::{AssetType, DataProvider};
pub use quote::Quote;
