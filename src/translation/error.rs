//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。除配置错误外，其余错误都在引擎内部就地恢复，
//! 不会传播给调用方。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误（缺少站点标识、凭据，或选择器无效）
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 持久化存储错误（不可读或已损坏）
    #[error("存储错误: {0}")]
    StorageError(String),

    /// 网络传输错误（连接失败或非成功状态码）
    #[error("网络错误: {0}")]
    TransportError(String),

    /// 远端翻译服务返回的逻辑错误
    #[error("翻译服务错误: {0}")]
    RemoteError(String),

    /// 标识不再对应任何存活元素
    #[error("元素不存在: {0}")]
    MissingElement(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::TransportError(_) => true,
            TranslationError::RemoteError(_) => true,
            TranslationError::StorageError(_) => true,
            TranslationError::MissingElement(_) => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::ParseError(_) => false,
            TranslationError::SerializationError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::StorageError(_) => ErrorSeverity::Warning,
            TranslationError::TransportError(_) => ErrorSeverity::Error,
            TranslationError::RemoteError(_) => ErrorSeverity::Error,
            TranslationError::MissingElement(_) => ErrorSeverity::Info,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::StorageError(_) => ErrorCategory::Storage,
            TranslationError::TransportError(_) => ErrorCategory::Network,
            TranslationError::RemoteError(_) => ErrorCategory::Service,
            TranslationError::MissingElement(_) => ErrorCategory::Document,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self.message(), context);

        match &mut self {
            TranslationError::ConfigError(msg)
            | TranslationError::StorageError(msg)
            | TranslationError::TransportError(msg)
            | TranslationError::RemoteError(msg)
            | TranslationError::MissingElement(msg)
            | TranslationError::ParseError(msg)
            | TranslationError::SerializationError(msg) => *msg = new_msg,
        }

        self
    }

    fn message(&self) -> &str {
        match self {
            TranslationError::ConfigError(msg)
            | TranslationError::StorageError(msg)
            | TranslationError::TransportError(msg)
            | TranslationError::RemoteError(msg)
            | TranslationError::MissingElement(msg)
            | TranslationError::ParseError(msg)
            | TranslationError::SerializationError(msg) => msg,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Network,
    Service,
    Document,
    Parsing,
    Serialization,
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::StorageError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(format!("配置错误: {}", error))
    }
}

impl From<redb::Error> for TranslationError {
    fn from(error: redb::Error) -> Self {
        TranslationError::StorageError(format!("redb错误: {}", error))
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            TranslationError::ParseError(format!("响应解析失败: {}", error))
        } else {
            TranslationError::TransportError(format!("请求失败: {}", error))
        }
    }
}

impl From<tokio::time::error::Elapsed> for TranslationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        TranslationError::TransportError(format!("请求超时: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TranslationError::TransportError("x".into()).is_retryable());
        assert!(TranslationError::RemoteError("x".into()).is_retryable());
        assert!(!TranslationError::ConfigError("x".into()).is_retryable());
        assert!(!TranslationError::MissingElement("el-1".into()).is_retryable());
    }

    #[test]
    fn test_severity_and_category() {
        let err = TranslationError::ConfigError("缺少 site_id".into());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = TranslationError::StorageError("损坏".into());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_with_context_keeps_variant() {
        let err = TranslationError::TransportError("连接被拒绝".into()).with_context("batch=3");
        match err {
            TranslationError::TransportError(msg) => {
                assert!(msg.contains("连接被拒绝"));
                assert!(msg.contains("batch=3"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
