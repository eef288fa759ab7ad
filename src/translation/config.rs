//! 翻译配置管理模块
//!
//! 提供配置加载与验证，支持默认值、配置文件和环境变量三层来源。
//! 除 `target_language` 由引擎在切换语言时更新外，配置在初始化后不再变化。

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::parsers::html::selector::SelectorList;
use crate::translation::error::{TranslationError, TranslationResult};

/// 翻译配置常量
pub mod constants {
    pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1/translate";
    pub const DEFAULT_SOURCE_LANGUAGE: &str = "en";
    pub const DEFAULT_IDENTITY_ATTRIBUTE: &str = "id";
    pub const DEFAULT_MARKER_PREFIX: &str = "translated-";
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
    pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
    pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 60_000;

    /// 生成标识的前缀
    pub const IDENTITY_PREFIX: &str = "el-";
    /// 生成标识保留的十六进制位数
    pub const IDENTITY_HASH_LEN: usize = 16;

    pub const DEFAULT_INCLUDE: &[&str] = &[
        "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "th", "button", "a", "label",
        "span",
    ];

    pub const DEFAULT_EXCLUDE: &[&str] = &[".no-translate", "[data-no-translate]"];

    /// 上下文中的章节容器与章节标题
    pub const SECTION_SELECTOR: &str = "section, article, div.section";
    pub const SECTION_TITLE_SELECTOR: &str = "h1, h2, h3";

    // 持久化键（以站点标识为前缀）
    pub const ORIGINAL_CONTENT_KEY: &str = "original_content";
    pub const TRANSLATION_CACHE_KEY: &str = "translation_cache";
    pub const LANGUAGE_PREFERENCE_KEY: &str = "translation_language";

    pub const ENV_PREFIX: &str = "PAGE_TRANSLATOR";

    pub const CONFIG_PATHS: &[&str] = &[
        "page-translator.toml",
        ".page-translator.toml",
        "~/.config/page-translator/config.toml",
        "/etc/page-translator/config.toml",
    ];
}

/// 包含/排除选择器规则
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SelectorRules {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for SelectorRules {
    fn default() -> Self {
        Self {
            include: constants::DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect(),
            exclude: constants::DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SelectorRules {
    /// 编译为选择器列表
    pub fn compile(&self) -> TranslationResult<(SelectorList, SelectorList)> {
        Ok((
            SelectorList::from_rules(&self.include)?,
            SelectorList::from_rules(&self.exclude)?,
        ))
    }
}

/// 失败重试的退避配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: constants::DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

/// 翻译配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 远端服务
    pub api_url: String,
    pub site_id: Option<String>,
    pub api_key: Option<String>,

    // 语言
    pub source_language: String,
    pub target_language: Option<String>,
    pub auto_translate: bool,

    // 内容选择
    pub selectors: SelectorRules,
    pub identity_attribute: String,
    pub marker_prefix: String,

    // 调度
    pub tick_interval_ms: u64,
    pub retry: RetryConfig,
    pub request_timeout_secs: Option<u64>,

    // 缓存
    pub cache_ttl_secs: Option<u64>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            site_id: None,
            api_key: None,
            source_language: constants::DEFAULT_SOURCE_LANGUAGE.to_string(),
            target_language: None,
            auto_translate: true,
            selectors: SelectorRules::default(),
            identity_attribute: constants::DEFAULT_IDENTITY_ATTRIBUTE.to_string(),
            marker_prefix: constants::DEFAULT_MARKER_PREFIX.to_string(),
            tick_interval_ms: constants::DEFAULT_TICK_INTERVAL_MS,
            retry: RetryConfig::default(),
            request_timeout_secs: None,
            cache_ttl_secs: None,
        }
    }
}

impl TranslationConfig {
    /// 创建带站点标识和凭据的配置
    pub fn new(site_id: &str, api_key: &str) -> Self {
        Self {
            site_id: Some(site_id.to_string()),
            api_key: Some(api_key.to_string()),
            ..Self::default()
        }
    }

    /// 从 TOML 字符串解析配置
    pub fn from_toml_str(source: &str) -> TranslationResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// 验证配置
    ///
    /// 缺少站点标识或凭据时初始化必须中止。
    pub fn validate(&self) -> TranslationResult<()> {
        if self.site_id.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(TranslationError::ConfigError("site_id 是必需的".to_string()));
        }

        if self.api_key.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(TranslationError::ConfigError("api_key 是必需的".to_string()));
        }

        url::Url::parse(&self.api_url).map_err(|e| {
            TranslationError::ConfigError(format!("无效的 API 地址 {}: {}", self.api_url, e))
        })?;

        if self.source_language.trim().is_empty() {
            return Err(TranslationError::ConfigError("source_language 不能为空".to_string()));
        }

        if self.identity_attribute.trim().is_empty() {
            return Err(TranslationError::ConfigError("identity_attribute 不能为空".to_string()));
        }

        if self.marker_prefix.trim().is_empty() {
            return Err(TranslationError::ConfigError("marker_prefix 不能为空".to_string()));
        }

        if self.tick_interval_ms == 0 {
            return Err(TranslationError::ConfigError("tick_interval_ms 必须大于0".to_string()));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(TranslationError::ConfigError(
                "retry.base_delay_ms 不能大于 retry.max_delay_ms".to_string(),
            ));
        }

        self.selectors.compile()?;

        Ok(())
    }

    /// 站点标识（验证后必然存在）
    pub fn site_id(&self) -> &str {
        self.site_id.as_deref().unwrap_or_default()
    }

    /// 带站点前缀的持久化键
    pub fn storage_key(&self, name: &str) -> String {
        format!("{}:{}", self.site_id(), name)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

/// 配置管理器
///
/// 依次叠加：内置默认值、第一个存在的配置文件、`PAGE_TRANSLATOR_*` 环境变量。
pub struct ConfigManager {
    config: TranslationConfig,
    config_path: Option<String>,
}

impl ConfigManager {
    /// 加载配置
    pub fn new() -> TranslationResult<Self> {
        let (config, config_path) = Self::load_config(None)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// 从指定文件加载配置（仍然应用环境变量覆盖）
    pub fn from_file(path: &str) -> TranslationResult<Self> {
        let (config, config_path) = Self::load_config(Some(path))?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// 获取当前配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    /// 取出配置
    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    /// 实际加载的配置文件路径
    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    fn load_config(
        explicit_path: Option<&str>,
    ) -> TranslationResult<(TranslationConfig, Option<String>)> {
        // 首先尝试加载 .env 文件
        if dotenv::dotenv().is_ok() {
            tracing::debug!("已加载 .env 文件");
        }

        let mut builder = Config::builder().add_source(Config::try_from(&TranslationConfig::default())?);

        let mut config_path = None;
        match explicit_path {
            Some(path) => {
                let expanded_path = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded_path).exists() {
                    return Err(TranslationError::ConfigError(format!(
                        "配置文件不存在: {}",
                        expanded_path
                    )));
                }
                builder = builder.add_source(File::with_name(&expanded_path));
                config_path = Some(expanded_path);
            }
            None => {
                for path in constants::CONFIG_PATHS {
                    let expanded_path = shellexpand::tilde(path);
                    if Path::new(expanded_path.as_ref()).exists() {
                        builder = builder.add_source(File::with_name(&expanded_path));
                        config_path = Some(expanded_path.to_string());
                        break;
                    }
                }
            }
        }

        if let Some(path) = &config_path {
            tracing::info!("加载配置文件: {}", path);
        }

        builder = builder.add_source(
            Environment::with_prefix(constants::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: TranslationConfig = builder.build()?.try_deserialize()?;

        tracing::debug!(
            "加载的配置 - API URL: {}, 源语言: {}",
            config.api_url,
            config.source_language
        );

        Ok((config, config_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_requires_credentials() {
        let config = TranslationConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, TranslationError::ConfigError(_)));

        let config = TranslationConfig {
            site_id: Some("site-1".to_string()),
            ..TranslationConfig::default()
        };
        assert!(config.validate().is_err(), "missing api_key must be rejected");

        assert!(TranslationConfig::new("site-1", "key").validate().is_ok());
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut config = TranslationConfig::new("site-1", "key");
        config.selectors.exclude.push("div > p".to_string());
        assert!(matches!(
            config.validate(),
            Err(TranslationError::ConfigError(_))
        ));
    }

    #[test]
    fn test_invalid_api_url_rejected() {
        let mut config = TranslationConfig::new("site-1", "key");
        config.api_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_str_with_partial_fields() {
        let config = TranslationConfig::from_toml_str(
            r#"
            site_id = "docs"
            api_key = "secret"
            target_language = "hi"
            tick_interval_ms = 250

            [selectors]
            include = ["p", "li"]
            exclude = [".skip"]
            "#,
        )
        .unwrap();

        assert_eq!(config.site_id(), "docs");
        assert_eq!(config.target_language.as_deref(), Some("hi"));
        assert_eq!(config.source_language, "en");
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.selectors.include, vec!["p", "li"]);
        assert!(config.auto_translate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_keys() {
        let config = TranslationConfig::new("docs", "secret");
        assert_eq!(config.storage_key(constants::TRANSLATION_CACHE_KEY), "docs:translation_cache");
        assert_eq!(config.marker_prefix, "translated-");
    }
}
