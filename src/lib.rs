//! # Page Translator Library
//!
//! 增量式页面翻译引擎：为页面内容分配稳定标识，持久缓存译文，
//! 并按固定节奏协调页面与目标语言之间的差异。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 解析、DOM 操作、选择器和序列化
//! - `translation` - 提取、存储、协调、调度和写回

pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use parsers::*;
pub use translation::{
    TickOutcome, TranslationConfig, TranslationEngine, TranslationError, TranslationResult,
};
