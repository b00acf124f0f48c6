//! Cache Codec Implementations
//!
//! Built-in implementations of the [`CacheCodec`](crate::traits::CacheCodec) trait
//! used by the typed adapter methods of the cache manager.

mod json;
pub use json::JsonCodec;
