//! 翻译模块
//!
//! 在内存中的 HTML 文档上增量翻译页面内容：
//! - **pipeline**: 内容提取、标识分配和页面写回
//! - **storage**: 原文存储、翻译缓存和语言偏好
//! - **core**: 协调循环、调度器、引擎和服务驱动
//! - **client**: 远程翻译服务
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use page_translator::translation::{HttpTranslationClient, MemoryStore, TranslationConfig, TranslationEngine};
//! use page_translator::parsers::html_to_dom;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TranslationConfig::new("docs", "secret");
//! let client = HttpTranslationClient::new(&config)?;
//! let mut engine = TranslationEngine::new(config, Arc::new(MemoryStore::new()), client)?;
//!
//! let dom = html_to_dom(b"<p>Hello</p>", "utf-8");
//! engine.init(&dom.document).await;
//! engine.switch_language(&dom.document, "hi").await;
//! # Ok(())
//! # }
//! ```

/// 远程翻译服务客户端
pub mod client;

/// 配置管理模块
pub mod config;

/// 协调循环与引擎
pub mod core;

/// 错误处理模块
pub mod error;

/// 内容提取与页面写回
pub mod pipeline;

/// 持久化存储
pub mod storage;

pub use client::{HttpTranslationClient, TranslateRequest, TranslatedItem, TranslationClient};
pub use config::{constants, ConfigManager, TranslationConfig};
pub use core::{
    ServiceCommand, ServiceHandle, SkipReason, TickOutcome, TranslationEngine, TranslationService,
};
pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};
pub use pipeline::{ContentExtractor, ContentItem, Identity, PageMutator, SemanticType};
pub use storage::{KeyValueStore, MemoryStore, OriginalContentStore, RedbStore, TranslationCache};

/// 模块版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
