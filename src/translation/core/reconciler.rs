//! 协调规划
//!
//! 对照页面标记、翻译缓存和原文存储，判断本轮哪些内容项需要翻译。
//! 只读取状态并清除过期标记，不发起请求也不写入存储。

use std::collections::BTreeMap;

use crate::translation::pipeline::extractor::ContentItem;
use crate::translation::pipeline::identity::Identity;
use crate::translation::pipeline::mutator::PageMutator;
use crate::translation::storage::cache::TranslationCache;
use crate::translation::storage::original::OriginalEntry;

/// 等待翻译的内容项
#[derive(Debug, Clone)]
pub struct PendingItem {
    /// `text` 为源语言文本
    pub item: ContentItem,
    /// 缓存中的译文对应的是旧文本，必须重新请求
    pub force_refresh: bool,
}

/// 单轮规划结果
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub pending: Vec<PendingItem>,
    /// 需要增量写入原文存储的内容项
    pub store_writes: Vec<ContentItem>,
    pub up_to_date: usize,
    pub stale: usize,
}

impl ReconcilePlan {
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

pub struct Reconciler {
    mutator: PageMutator,
}

impl Reconciler {
    pub fn new(mutator: PageMutator) -> Self {
        Self { mutator }
    }

    /// 规划本轮工作
    ///
    /// - 带当前语言标记且文本与缓存译文一致：已是最新
    /// - 带当前语言标记但文本不一致或缓存缺失：过期，去掉标记后重新排队；
    ///   文本与原文记录一致时只是重新渲染了源文本，仍走缓存
    /// - 带其他语言标记：当前文本是译文，源文本取自原文存储
    /// - 无标记：当前文本即源文本，写入原文存储
    pub fn plan(
        &self,
        items: Vec<ContentItem>,
        language: &str,
        cache: &TranslationCache,
        originals: &BTreeMap<Identity, OriginalEntry>,
    ) -> ReconcilePlan {
        let mut plan = ReconcilePlan::default();

        for mut item in items {
            let stored = originals.get(&item.id);

            match self.mutator.marked_language(&item.element) {
                Some(marked) if marked == language => {
                    let cached = cache.peek(&item.id, language);
                    if cached.map(str::trim) == Some(item.text.as_str()) {
                        plan.up_to_date += 1;
                        continue;
                    }

                    plan.stale += 1;
                    self.mutator.strip_markers(&item.element);
                    tracing::debug!("标识 {} 的 {} 译文已过期", item.id, language);

                    match (cached, stored) {
                        // 缓存缺失时当前文本仍是旧译文
                        (None, Some(entry)) => {
                            item.text = entry.text.clone();
                            plan.pending.push(PendingItem {
                                item,
                                force_refresh: false,
                            });
                        }
                        // 页面重新渲染了源文本，与原文记录一致时仍可使用缓存
                        _ => {
                            let force_refresh = stored.map_or(true, |entry| entry.text != item.text);
                            if force_refresh {
                                plan.store_writes.push(item.clone());
                            }
                            plan.pending.push(PendingItem {
                                item,
                                force_refresh,
                            });
                        }
                    }
                }
                Some(_) => match stored {
                    Some(entry) => {
                        item.text = entry.text.clone();
                        plan.pending.push(PendingItem {
                            item,
                            force_refresh: false,
                        });
                    }
                    None => {
                        tracing::warn!("标识 {} 带有语言标记但没有原文记录，按当前文本处理", item.id);
                        self.mutator.strip_markers(&item.element);
                        plan.store_writes.push(item.clone());
                        plan.pending.push(PendingItem {
                            item,
                            force_refresh: true,
                        });
                    }
                },
                None => {
                    let force_refresh = stored.map_or(false, |entry| entry.text != item.text);
                    plan.store_writes.push(item.clone());
                    plan.pending.push(PendingItem {
                        item,
                        force_refresh,
                    });
                }
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::parsers::html::dom::{add_class, html_to_dom, set_text_content};
    use crate::translation::config::TranslationConfig;
    use crate::translation::pipeline::extractor::ContentExtractor;
    use crate::translation::storage::kv::MemoryStore;
    use crate::translation::storage::original::OriginalContentStore;

    struct Fixture {
        config: TranslationConfig,
        kv: Arc<MemoryStore>,
        extractor: ContentExtractor,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let config = TranslationConfig::new("site", "key");
        Fixture {
            kv: Arc::new(MemoryStore::new()),
            extractor: ContentExtractor::new(&config).unwrap(),
            reconciler: Reconciler::new(PageMutator::new(&config)),
            config,
        }
    }

    #[test]
    fn test_unmarked_items_are_pending_and_stored() {
        let mut f = fixture();
        let dom = html_to_dom(b"<p>Hello</p><p>World</p>", "utf-8");
        let cache = TranslationCache::open(f.kv.clone(), &f.config);

        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "hi", &cache, &BTreeMap::new());

        assert_eq!(plan.pending.len(), 2);
        assert_eq!(plan.store_writes.len(), 2);
        assert!(plan.pending.iter().all(|p| !p.force_refresh));
    }

    #[test]
    fn test_marked_and_matching_is_up_to_date() {
        let mut f = fixture();
        let dom = html_to_dom(
            "<p id=\"a\" class=\"translated-hi\">नमस्ते</p>".as_bytes(),
            "utf-8",
        );
        let mut cache = TranslationCache::open(f.kv.clone(), &f.config);
        cache.put(&Identity::from("a"), "hi", "नमस्ते").unwrap();

        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "hi", &cache, &BTreeMap::new());

        assert!(plan.is_settled());
        assert_eq!(plan.up_to_date, 1);
        assert!(plan.store_writes.is_empty());
    }

    #[test]
    fn test_stale_marker_is_stripped_and_requeued() {
        let mut f = fixture();
        let dom = html_to_dom(b"<p id=\"a\">Hello</p>", "utf-8");
        let originals = OriginalContentStore::new(f.kv.clone(), &f.config);
        originals.save(&dom.document, &mut f.extractor).unwrap();

        let mut cache = TranslationCache::open(f.kv.clone(), &f.config);
        cache.put(&Identity::from("a"), "hi", "नमस्ते").unwrap();

        // 框架重新渲染了新的英文内容，但保留了标记
        let p = f.extractor.extract(&dom.document).remove(0).element;
        set_text_content(&p, "Hello again");
        add_class(&p, "translated-hi");

        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "hi", &cache, &originals.entries());

        assert_eq!(plan.stale, 1);
        assert_eq!(plan.pending.len(), 1);
        assert!(plan.pending[0].force_refresh);
        assert_eq!(plan.pending[0].item.text, "Hello again");
        assert_eq!(PageMutator::new(&f.config).marked_language(&p), None);
    }

    #[test]
    fn test_padded_cached_translation_is_up_to_date() {
        let mut f = fixture();
        let dom = html_to_dom(
            "<p id=\"a\" class=\"translated-hi\"> नमस्ते\n</p>".as_bytes(),
            "utf-8",
        );
        let mut cache = TranslationCache::open(f.kv.clone(), &f.config);
        cache.put(&Identity::from("a"), "hi", " नमस्ते\n").unwrap();

        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "hi", &cache, &BTreeMap::new());

        assert!(plan.is_settled());
        assert_eq!(plan.stale, 0);
        assert!(plan.store_writes.is_empty());
    }

    #[test]
    fn test_rerendered_source_uses_cache() {
        let mut f = fixture();
        let dom = html_to_dom(b"<p id=\"a\">Hello</p>", "utf-8");
        let originals = OriginalContentStore::new(f.kv.clone(), &f.config);
        originals.save(&dom.document, &mut f.extractor).unwrap();

        let mut cache = TranslationCache::open(f.kv.clone(), &f.config);
        cache.put(&Identity::from("a"), "hi", "नमस्ते").unwrap();

        // 框架把原来的英文重新渲染回来，并保留了标记
        let p = f.extractor.extract(&dom.document).remove(0).element;
        add_class(&p, "translated-hi");

        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "hi", &cache, &originals.entries());

        assert_eq!(plan.stale, 1);
        assert_eq!(plan.pending.len(), 1);
        assert!(!plan.pending[0].force_refresh);
        assert_eq!(plan.pending[0].item.text, "Hello");
        assert!(plan.store_writes.is_empty());
    }

    #[test]
    fn test_marker_without_cache_entry_uses_stored_source() {
        let mut f = fixture();
        let dom = html_to_dom(b"<p id=\"a\">Hello</p>", "utf-8");
        let originals = OriginalContentStore::new(f.kv.clone(), &f.config);
        originals.save(&dom.document, &mut f.extractor).unwrap();

        let p = f.extractor.extract(&dom.document).remove(0).element;
        set_text_content(&p, "नमस्ते");
        add_class(&p, "translated-hi");

        let cache = TranslationCache::open(f.kv.clone(), &f.config);
        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "hi", &cache, &originals.entries());

        assert_eq!(plan.stale, 1);
        assert_eq!(plan.pending[0].item.text, "Hello");
        assert!(!plan.pending[0].force_refresh);
        assert!(plan.store_writes.is_empty());
    }

    #[test]
    fn test_other_language_marker_uses_stored_source() {
        let mut f = fixture();
        let dom = html_to_dom(b"<p id=\"a\">Hello</p>", "utf-8");
        let originals = OriginalContentStore::new(f.kv.clone(), &f.config);
        originals.save(&dom.document, &mut f.extractor).unwrap();

        let p = f.extractor.extract(&dom.document).remove(0).element;
        set_text_content(&p, "नमस्ते");
        add_class(&p, "translated-hi");

        let cache = TranslationCache::open(f.kv.clone(), &f.config);
        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "ta", &cache, &originals.entries());

        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].item.text, "Hello");
        assert!(plan.store_writes.is_empty());
    }

    #[test]
    fn test_changed_source_forces_refresh() {
        let mut f = fixture();
        let dom = html_to_dom(b"<p id=\"a\">Hello</p>", "utf-8");
        let originals = OriginalContentStore::new(f.kv.clone(), &f.config);
        originals.save(&dom.document, &mut f.extractor).unwrap();

        let p = f.extractor.extract(&dom.document).remove(0).element;
        set_text_content(&p, "Goodbye");

        let cache = TranslationCache::open(f.kv.clone(), &f.config);
        let items = f.extractor.extract(&dom.document);
        let plan = f.reconciler.plan(items, "hi", &cache, &originals.entries());

        assert!(plan.pending[0].force_refresh);
        assert_eq!(plan.store_writes[0].text, "Goodbye");
    }
}
