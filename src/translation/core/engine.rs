//! 翻译引擎
//!
//! 每个页面会话一个引擎实例，持有配置、存储句柄、翻译客户端、忙碌标志和退避状态。
//! 一轮协调分两段：`begin_tick` 同步完成提取、规划和缓存查找，直到需要网络为止；
//! `complete` 在请求结束后写缓存并更新页面。`tick` 把两段串起来。
//!
//! ## 工作流程
//! 1. 检查目标语言、忙碌标志和退避窗口
//! 2. 重新提取页面内容并与标记、缓存对照
//! 3. 新内容增量写入原文存储
//! 4. 缓存命中直接应用，未命中合并为一个请求
//! 5. 请求成功后写缓存，再应用命中和译文

use std::future::Future;
use std::sync::Arc;

use markup5ever_rcdom::Handle;

use crate::translation::client::{TranslatedItem, TranslationClient};
use crate::translation::config::TranslationConfig;
use crate::translation::core::backoff::Backoff;
use crate::translation::core::dispatcher::{BusyFlag, DispatchStats, InFlightBatch, TranslationDispatcher};
use crate::translation::core::reconciler::Reconciler;
use crate::translation::error::helpers::log_error;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::extractor::ContentExtractor;
use crate::translation::pipeline::mutator::PageMutator;
use crate::translation::storage::cache::{CacheStats, TranslationCache};
use crate::translation::storage::kv::KeyValueStore;
use crate::translation::storage::original::OriginalContentStore;
use crate::translation::storage::preference::LanguagePreference;

/// 跳过一轮协调的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoTargetLanguage,
    SourceLanguage,
    Busy,
    Backoff,
}

/// 一轮协调的结果
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// 所有内容都已是当前语言的最新译文
    UpToDate,
    /// 全部命中缓存，没有网络请求
    AppliedFromCache { elements: usize },
    /// 远程请求成功并已应用
    Translated { requested: usize, elements: usize },
    /// 请求期间语言已切换，译文只写入缓存
    Superseded { requested: usize },
    /// 请求失败，缓存和页面未修改
    Failed(TranslationError),
    /// 切换回源语言，已恢复原文
    Restored { elements: usize },
}

/// `begin_tick` 的结果
#[derive(Debug)]
pub enum TickStart {
    Done(TickOutcome),
    InFlight(InFlightBatch),
}

/// 语言切换的同步部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageChange {
    /// 切换到源语言，原文已恢复
    Restored { elements: usize },
    /// 需要一轮协调完成翻译
    NeedsTick,
}

/// 引擎统计信息
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub ticks: u64,
    pub skipped_busy: u64,
    pub skipped_backoff: u64,
    pub up_to_date: u64,
    pub stale_detected: u64,
    pub elements_updated: u64,
    pub language_switches: u64,
}

/// 翻译引擎
pub struct TranslationEngine<C: TranslationClient> {
    config: TranslationConfig,
    client: Arc<C>,
    extractor: ContentExtractor,
    originals: OriginalContentStore,
    cache: TranslationCache,
    preference: LanguagePreference,
    mutator: PageMutator,
    reconciler: Reconciler,
    dispatcher: TranslationDispatcher,
    busy: BusyFlag,
    backoff: Backoff,
    stats: EngineStats,
}

impl<C: TranslationClient + 'static> TranslationEngine<C> {
    /// 创建引擎
    ///
    /// 配置无效时返回配置错误，不创建任何状态。`auto_translate` 开启且未指定目标语言时沿用已保存的语言偏好。
    pub fn new(
        mut config: TranslationConfig,
        store: Arc<dyn KeyValueStore>,
        client: C,
    ) -> TranslationResult<Self> {
        config.validate()?;

        let preference = LanguagePreference::new(Arc::clone(&store), &config);
        if config.auto_translate && config.target_language.is_none() {
            if let Some(saved) = preference.get() {
                tracing::debug!("沿用已保存的语言偏好: {}", saved);
                config.target_language = Some(saved);
            }
        }

        let mutator = PageMutator::new(&config);
        let engine = Self {
            extractor: ContentExtractor::new(&config)?,
            originals: OriginalContentStore::new(Arc::clone(&store), &config),
            cache: TranslationCache::open(Arc::clone(&store), &config),
            preference,
            reconciler: Reconciler::new(mutator.clone()),
            mutator,
            dispatcher: TranslationDispatcher::new(),
            busy: BusyFlag::new(),
            backoff: Backoff::new(&config.retry),
            stats: EngineStats::default(),
            client: Arc::new(client),
            config,
        };

        tracing::info!(
            "翻译引擎已创建: 站点 {}, 源语言 {}, 目标语言 {:?}",
            engine.config.site_id(),
            engine.config.source_language,
            engine.config.target_language
        );
        Ok(engine)
    }

    /// 记录原文快照；自动翻译开启且已有目标语言时立即翻译
    pub async fn init(&mut self, root: &Handle) -> TickOutcome {
        match self.originals.save(root, &mut self.extractor) {
            Ok(written) => tracing::debug!("初始原文快照: 新增 {} 条", written),
            Err(e) => log_error(&e.with_context("保存原文快照")),
        }

        if self.config.auto_translate && self.config.target_language.is_some() {
            self.tick(root).await
        } else {
            TickOutcome::Skipped(SkipReason::NoTargetLanguage)
        }
    }

    /// 切换语言的同步部分：保存偏好、更新目标语言；切回源语言时恢复原文
    pub fn set_language(&mut self, root: &Handle, language: &str) -> LanguageChange {
        if let Err(e) = self.preference.set(language) {
            log_error(&e.with_context("保存语言偏好"));
        }
        self.config.target_language = Some(language.to_string());
        self.stats.language_switches += 1;
        tracing::info!("切换目标语言: {}", language);

        if language == self.config.source_language {
            let elements = self.originals.restore_all(root);
            LanguageChange::Restored { elements }
        } else {
            LanguageChange::NeedsTick
        }
    }

    /// 切换语言并立即协调
    pub async fn switch_language(&mut self, root: &Handle, language: &str) -> TickOutcome {
        match self.set_language(root, language) {
            LanguageChange::Restored { elements } => TickOutcome::Restored { elements },
            LanguageChange::NeedsTick => self.tick(root).await,
        }
    }

    /// 页面发生导航后立即协调
    pub async fn notify_navigation(&mut self, root: &Handle) -> TickOutcome {
        tracing::debug!("收到导航通知");
        self.tick(root).await
    }

    /// 停止翻译并恢复全部原文；不修改保存的语言偏好
    pub fn restore(&mut self, root: &Handle) -> usize {
        self.config.target_language = None;
        self.originals.restore_all(root)
    }

    /// 完整的一轮协调
    pub async fn tick(&mut self, root: &Handle) -> TickOutcome {
        match self.begin_tick(root) {
            TickStart::Done(outcome) => outcome,
            TickStart::InFlight(batch) => {
                let result = self.request(&batch).await;
                self.complete(root, batch, result)
            }
        }
    }

    /// 协调的同步部分
    pub fn begin_tick(&mut self, root: &Handle) -> TickStart {
        self.stats.ticks += 1;

        let language = match self.config.target_language.clone() {
            Some(language) => language,
            None => return TickStart::Done(TickOutcome::Skipped(SkipReason::NoTargetLanguage)),
        };
        if language == self.config.source_language {
            return TickStart::Done(TickOutcome::Skipped(SkipReason::SourceLanguage));
        }

        let Some(guard) = self.busy.try_acquire() else {
            self.stats.skipped_busy += 1;
            tracing::debug!("上一批次仍在进行，跳过本轮");
            return TickStart::Done(TickOutcome::Skipped(SkipReason::Busy));
        };

        if let Some(remaining) = self.backoff.remaining() {
            self.stats.skipped_backoff += 1;
            tracing::debug!("处于重试退避期，剩余 {:?}", remaining);
            return TickStart::Done(TickOutcome::Skipped(SkipReason::Backoff));
        }

        let items = self.extractor.extract(root);
        let originals = self.originals.entries();
        let plan = self.reconciler.plan(items, &language, &self.cache, &originals);
        self.stats.up_to_date += plan.up_to_date as u64;
        self.stats.stale_detected += plan.stale as u64;

        if let Err(e) = self.originals.merge(&plan.store_writes) {
            log_error(&e.with_context("原文增量写入"));
        }

        if plan.is_settled() {
            tracing::debug!("{} 项内容均为最新", plan.up_to_date);
            return TickStart::Done(TickOutcome::UpToDate);
        }

        let split = self
            .dispatcher
            .partition(&mut self.cache, plan.pending, &language);

        if split.misses.is_empty() {
            let report = self.mutator.apply(
                root,
                &language,
                split.hits.iter().map(|(id, text)| (id, text.as_str())),
            );
            self.stats.elements_updated += report.elements_updated as u64;
            tracing::debug!("全部命中缓存，更新 {} 个元素", report.elements_updated);
            return TickStart::Done(TickOutcome::AppliedFromCache {
                elements: report.elements_updated,
            });
        }

        let request = self.dispatcher.request_for(
            &self.config.source_language,
            &language,
            self.config.site_id(),
            &split.misses,
        );
        TickStart::InFlight(self.dispatcher.begin(guard, &language, split.hits, request))
    }

    /// 在途批次的远程请求；返回的 future 不借用引擎
    pub fn request(
        &self,
        batch: &InFlightBatch,
    ) -> impl Future<Output = TranslationResult<Vec<TranslatedItem>>> + 'static {
        let client = Arc::clone(&self.client);
        let request = batch.request.clone();
        let timeout = self.config.request_timeout();

        async move {
            let call = client.translate(request);
            match timeout {
                Some(limit) => tokio::time::timeout(limit, call).await?,
                None => call.await,
            }
        }
    }

    /// 处理在途批次的结果；守卫随批次一起释放
    pub fn complete(
        &mut self,
        root: &Handle,
        batch: InFlightBatch,
        result: TranslationResult<Vec<TranslatedItem>>,
    ) -> TickOutcome {
        let requested = batch.requested();
        let current = self.config.target_language.as_deref() == Some(batch.language.as_str());
        let apply_to = if current { Some(root) } else { None };

        match self
            .dispatcher
            .finish(&mut self.cache, &self.mutator, apply_to, batch, result)
        {
            Ok(report) => {
                self.backoff.record_success();
                self.stats.elements_updated += report.elements_updated as u64;
                if current {
                    TickOutcome::Translated {
                        requested,
                        elements: report.elements_updated,
                    }
                } else {
                    tracing::info!("目标语言已切换，译文仅写入缓存");
                    TickOutcome::Superseded { requested }
                }
            }
            Err(e) => {
                let delay = self.backoff.record_failure();
                tracing::warn!(
                    "第 {} 次连续失败，{:?} 后重试",
                    self.backoff.failures(),
                    delay
                );
                TickOutcome::Failed(e)
            }
        }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn target_language(&self) -> Option<&str> {
        self.config.target_language.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn originals(&self) -> &OriginalContentStore {
        &self.originals
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.get_stats()
    }

    pub fn dispatch_stats(&self) -> &DispatchStats {
        self.dispatcher.get_stats()
    }

    pub fn get_stats(&self) -> &EngineStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::parsers::html::dom::{get_node_attr, html_to_dom, text_content};
    use crate::translation::client::TranslateRequest;
    use crate::translation::storage::kv::MemoryStore;

    /// 把每个文本前加上语言代码作为"译文"
    #[derive(Default)]
    struct EchoClient {
        requests: Rc<RefCell<Vec<TranslateRequest>>>,
    }

    impl TranslationClient for EchoClient {
        async fn translate(&self, request: TranslateRequest) -> TranslationResult<Vec<TranslatedItem>> {
            self.requests.borrow_mut().push(request.clone());
            Ok(request
                .content
                .iter()
                .map(|item| TranslatedItem {
                    id: item.id.clone(),
                    translated: format!("[{}] {}", request.target_language, item.text),
                })
                .collect())
        }
    }

    fn engine(kv: Arc<MemoryStore>) -> (TranslationEngine<EchoClient>, Rc<RefCell<Vec<TranslateRequest>>>) {
        let client = EchoClient::default();
        let requests = Rc::clone(&client.requests);
        let engine = TranslationEngine::new(TranslationConfig::new("site", "key"), kv, client).unwrap();
        (engine, requests)
    }

    #[test]
    fn test_new_rejects_missing_credentials() {
        let result = TranslationEngine::new(
            TranslationConfig::default(),
            Arc::new(MemoryStore::new()),
            EchoClient::default(),
        );
        assert!(matches!(result, Err(TranslationError::ConfigError(_))));
    }

    #[test]
    fn test_saved_preference_becomes_target() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("site:translation_language", "ta").unwrap();
        let (engine, _) = engine(kv);
        assert_eq!(engine.target_language(), Some("ta"));
    }

    #[tokio::test]
    async fn test_tick_translates_then_settles() {
        let (mut engine, requests) = engine(Arc::new(MemoryStore::new()));
        let dom = html_to_dom(b"<p>Hello</p>", "utf-8");

        assert!(matches!(
            engine.init(&dom.document).await,
            TickOutcome::Skipped(SkipReason::NoTargetLanguage)
        ));

        let outcome = engine.switch_language(&dom.document, "hi").await;
        assert!(matches!(outcome, TickOutcome::Translated { requested: 1, elements: 1 }));
        assert!(!engine.is_busy());

        assert!(matches!(engine.tick(&dom.document).await, TickOutcome::UpToDate));
        assert_eq!(requests.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_begin_tick_holds_busy_guard() {
        let (mut engine, _) = engine(Arc::new(MemoryStore::new()));
        let dom = html_to_dom(b"<p>Hello</p>", "utf-8");
        engine.set_language(&dom.document, "hi");

        let TickStart::InFlight(batch) = engine.begin_tick(&dom.document) else {
            panic!("expected a request");
        };
        assert!(engine.is_busy());
        assert!(matches!(
            engine.begin_tick(&dom.document),
            TickStart::Done(TickOutcome::Skipped(SkipReason::Busy))
        ));

        let result = engine.request(&batch).await;
        engine.complete(&dom.document, batch, result);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_language_change_during_flight_only_caches() {
        let (mut engine, _) = engine(Arc::new(MemoryStore::new()));
        let dom = html_to_dom(b"<p>Hello</p>", "utf-8");
        engine.set_language(&dom.document, "hi");

        let TickStart::InFlight(batch) = engine.begin_tick(&dom.document) else {
            panic!("expected a request");
        };
        let result = engine.request(&batch).await;
        engine.set_language(&dom.document, "ta");

        let outcome = engine.complete(&dom.document, batch, result);
        assert!(matches!(outcome, TickOutcome::Superseded { requested: 1 }));
        assert_eq!(engine.cache().len(), 1);

        let p = engine.extractor.extract(&dom.document).remove(0).element;
        assert_eq!(text_content(&p), "Hello");
        assert_eq!(get_node_attr(&p, "class"), None);
    }

    #[tokio::test]
    async fn test_restore_clears_target() {
        let (mut engine, _) = engine(Arc::new(MemoryStore::new()));
        let dom = html_to_dom(b"<p>Hello</p>", "utf-8");
        engine.init(&dom.document).await;
        engine.switch_language(&dom.document, "hi").await;

        assert_eq!(engine.restore(&dom.document), 1);
        assert_eq!(engine.target_language(), None);
        assert!(matches!(
            engine.tick(&dom.document).await,
            TickOutcome::Skipped(SkipReason::NoTargetLanguage)
        ));
    }
}
