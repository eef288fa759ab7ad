//! 远程翻译服务客户端
//!
//! 请求与响应的线上格式，以及基于 reqwest 的 HTTP 实现。

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::translation::config::TranslationConfig;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::extractor::{ContentItem, Context, SemanticType};
use crate::translation::pipeline::identity::Identity;

/// 请求中的单个内容项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestItem {
    pub id: Identity,
    pub text: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    pub context: Context,
}

impl From<&ContentItem> for RequestItem {
    fn from(item: &ContentItem) -> Self {
        Self {
            id: item.id.clone(),
            text: item.text.clone(),
            semantic_type: item.semantic_type,
            context: item.context.clone(),
        }
    }
}

/// 翻译请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub source_language: String,
    pub target_language: String,
    pub site_id: String,
    pub content: Vec<RequestItem>,
}

/// 单条译文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedItem {
    pub id: Identity,
    pub translated: String,
}

/// 翻译响应；`error` 存在时表示逻辑失败
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslateResponse {
    #[serde(default)]
    pub translations: Vec<TranslatedItem>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl TranslateResponse {
    pub fn into_result(self) -> TranslationResult<Vec<TranslatedItem>> {
        match self.error {
            None | Some(serde_json::Value::Null) => Ok(self.translations),
            Some(serde_json::Value::String(message)) => Err(TranslationError::RemoteError(message)),
            Some(other) => Err(TranslationError::RemoteError(other.to_string())),
        }
    }
}

/// 远程翻译服务
///
/// 一次调用对应一个批次。实现不需要重试，失败由下一次协调重新发起。
pub trait TranslationClient {
    fn translate(
        &self,
        request: TranslateRequest,
    ) -> impl Future<Output = TranslationResult<Vec<TranslatedItem>>>;
}

/// HTTP 翻译客户端
pub struct HttpTranslationClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpTranslationClient {
    pub fn new(config: &TranslationConfig) -> TranslationResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
        })
    }
}

impl TranslationClient for HttpTranslationClient {
    async fn translate(&self, request: TranslateRequest) -> TranslationResult<Vec<TranslatedItem>> {
        tracing::debug!(
            "发送翻译请求: {} 项, {} -> {}",
            request.content.len(),
            request.source_language,
            request.target_language
        );

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TranslationError::TransportError(format!(
                "翻译服务返回 {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: TranslateResponse = serde_json::from_str(&text)
            .map_err(|e| TranslationError::ParseError(format!("无效的翻译响应: {}", e)))?;
        parsed.into_result()
    }
}
