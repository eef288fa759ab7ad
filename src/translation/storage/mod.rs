//! 存储模块
//!
//! 原文存储、翻译缓存和语言偏好，全部通过 `KeyValueStore` 契约持久化。

pub mod cache;
pub mod kv;
pub mod original;
pub mod preference;

pub use cache::{CacheStats, TranslationCache};
pub use kv::{KeyValueStore, MemoryStore, RedbStore};
pub use original::{LiveEntry, OriginalContentStore, OriginalEntry};
pub use preference::LanguagePreference;
