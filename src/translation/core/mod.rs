//! 翻译系统核心模块
//!
//! 协调循环的各个部分：
//!
//! - **规划** (`reconciler.rs`): 对照标记、缓存和原文存储决定本轮需要翻译的内容
//! - **调度** (`dispatcher.rs`): 划分缓存命中，单请求在途，忙碌守卫
//! - **退避** (`backoff.rs`): 失败批次之后的指数退避
//! - **引擎** (`engine.rs`): 每个页面会话的状态与生命周期
//! - **服务** (`service.rs`): 定时节奏和宿主命令驱动引擎
//!
//! ```text
//! TranslationService (service.rs)
//!     └── TranslationEngine (engine.rs)
//!             ├── ContentExtractor (pipeline/extractor.rs)
//!             ├── Reconciler (reconciler.rs)
//!             ├── TranslationDispatcher (dispatcher.rs)
//!             │       └── TranslationCache (storage/cache.rs)
//!             ├── OriginalContentStore (storage/original.rs)
//!             └── PageMutator (pipeline/mutator.rs)
//! ```

pub mod backoff;
pub mod dispatcher;
pub mod engine;
pub mod reconciler;
pub mod service;

pub use backoff::Backoff;
pub use dispatcher::{BusyFlag, BusyGuard, DispatchPlan, DispatchStats, InFlightBatch, TranslationDispatcher};
pub use engine::{EngineStats, LanguageChange, SkipReason, TickOutcome, TickStart, TranslationEngine};
pub use reconciler::{PendingItem, ReconcilePlan, Reconciler};
pub use service::{ServiceCommand, ServiceHandle, ServiceStats, TranslationService};
