//! 翻译调度
//!
//! 把一轮待翻译内容拆成缓存命中和未命中两部分。未命中的内容合成唯一一个远程请求，
//! 请求期间持有忙碌守卫；请求成功后先写缓存，再把命中和响应结果一起应用到页面。

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Instant;

use markup5ever_rcdom::Handle;

use crate::translation::client::{RequestItem, TranslateRequest, TranslatedItem};
use crate::translation::core::reconciler::PendingItem;
use crate::translation::error::helpers::log_error;
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::identity::Identity;
use crate::translation::pipeline::mutator::{MutationReport, PageMutator};
use crate::translation::storage::cache::TranslationCache;

/// 引擎级忙碌标志
///
/// 同一时间最多一个批次在途；在途期间触发的协调直接丢弃，不排队。
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Rc<Cell<bool>>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.get()
    }

    /// 获取守卫；已被占用时返回 `None`
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        if self.0.replace(true) {
            return None;
        }
        Some(BusyGuard(Rc::clone(&self.0)))
    }
}

/// 忙碌守卫，析构时释放
#[derive(Debug)]
pub struct BusyGuard(Rc<Cell<bool>>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// 缓存命中与未命中的划分
#[derive(Debug, Default)]
pub struct DispatchPlan {
    pub hits: Vec<(Identity, String)>,
    pub misses: Vec<PendingItem>,
}

/// 在途批次
///
/// 持有忙碌守卫；无论批次如何结束，守卫都随它一起释放。
#[derive(Debug)]
pub struct InFlightBatch {
    _guard: BusyGuard,
    pub language: String,
    pub hits: Vec<(Identity, String)>,
    pub request: TranslateRequest,
    pub started: Instant,
}

impl InFlightBatch {
    pub fn requested(&self) -> usize {
        self.request.content.len()
    }
}

/// 调度统计信息
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub items_requested: u64,
    pub items_translated: u64,
    pub cache_hits: u64,
    pub forced_refreshes: u64,
}

/// 翻译调度器
#[derive(Default)]
pub struct TranslationDispatcher {
    stats: DispatchStats,
}

impl TranslationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按缓存划分命中与未命中；源文本已变化的内容项跳过缓存
    pub fn partition(
        &mut self,
        cache: &mut TranslationCache,
        pending: Vec<PendingItem>,
        language: &str,
    ) -> DispatchPlan {
        let mut plan = DispatchPlan::default();
        let mut seen = HashSet::new();

        for entry in pending {
            // 共享标识的元素只处理一次，应用时会一并更新
            if !seen.insert(entry.item.id.clone()) {
                continue;
            }

            if entry.force_refresh {
                self.stats.forced_refreshes += 1;
            } else if let Some(text) = cache.get(&entry.item.id, language) {
                self.stats.cache_hits += 1;
                plan.hits.push((entry.item.id, text));
                continue;
            }

            plan.misses.push(entry);
        }

        plan
    }

    /// 为未命中内容构造请求
    pub fn request_for(
        &self,
        source_language: &str,
        language: &str,
        site_id: &str,
        misses: &[PendingItem],
    ) -> TranslateRequest {
        TranslateRequest {
            source_language: source_language.to_string(),
            target_language: language.to_string(),
            site_id: site_id.to_string(),
            content: misses.iter().map(|p| RequestItem::from(&p.item)).collect(),
        }
    }

    /// 开始一个批次
    pub fn begin(
        &mut self,
        guard: BusyGuard,
        language: &str,
        hits: Vec<(Identity, String)>,
        request: TranslateRequest,
    ) -> InFlightBatch {
        self.stats.requests_sent += 1;
        self.stats.items_requested += request.content.len() as u64;
        tracing::info!(
            "发送翻译批次: {} 项未命中，{} 项命中缓存，目标语言 {}",
            request.content.len(),
            hits.len(),
            language
        );

        InFlightBatch {
            _guard: guard,
            language: language.to_string(),
            hits,
            request,
            started: Instant::now(),
        }
    }

    /// 处理批次结果
    ///
    /// 成功时写入缓存，`apply_to` 给出时把命中和译文一起应用到该文档；
    /// 失败时不修改缓存也不修改页面。
    pub fn finish(
        &mut self,
        cache: &mut TranslationCache,
        mutator: &PageMutator,
        apply_to: Option<&Handle>,
        batch: InFlightBatch,
        result: TranslationResult<Vec<TranslatedItem>>,
    ) -> TranslationResult<MutationReport> {
        let elapsed = batch.started.elapsed();

        let translations = match result {
            Ok(translations) => translations,
            Err(e) => {
                self.stats.requests_failed += 1;
                log_error(
                    &e.clone()
                        .with_context(format!("批次 {} 项, 耗时 {:?}", batch.requested(), elapsed)),
                );
                return Err(e);
            }
        };

        let requested: HashSet<&Identity> = batch.request.content.iter().map(|i| &i.id).collect();
        let mut fresh = Vec::with_capacity(translations.len());
        for item in translations {
            if requested.contains(&item.id) {
                // 页面上的文本按去除首尾空白比较，译文也按同样形式保存
                fresh.push((item.id, item.translated.trim().to_string()));
            } else {
                tracing::debug!("忽略未请求的译文: {}", item.id);
            }
        }

        if fresh.len() < requested.len() {
            tracing::warn!(
                "翻译服务只返回了 {}/{} 项，其余将在下一轮重试",
                fresh.len(),
                requested.len()
            );
        }

        self.stats.items_translated += fresh.len() as u64;
        if let Err(e) = cache.put_many(&batch.language, fresh.iter().cloned()) {
            log_error(&e.with_context("译文写入缓存"));
        }

        let report = match apply_to {
            Some(root) => mutator.apply(
                root,
                &batch.language,
                batch
                    .hits
                    .iter()
                    .chain(fresh.iter())
                    .map(|(id, text)| (id, text.as_str())),
            ),
            None => MutationReport::default(),
        };

        tracing::info!(
            "翻译批次完成: {} 项译文，更新 {} 个元素，耗时 {:?}",
            fresh.len(),
            report.elements_updated,
            elapsed
        );
        Ok(report)
    }

    pub fn get_stats(&self) -> &DispatchStats {
        &self.stats
    }
}
