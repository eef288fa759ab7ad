//! 翻译管道模块
//!
//! 页面内容进出引擎的两端：提取（标识分配、规则过滤、上下文）和写回（译文、标记、恢复）。

pub mod extractor;
pub mod identity;
pub mod mutator;

// 重新导出主要类型
pub use extractor::{ContentExtractor, ContentItem, Context, ExtractionStats, SemanticType};
pub use identity::{Identity, IdentityAssigner};
pub use mutator::{MutationReport, PageMutator};
