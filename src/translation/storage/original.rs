//! 原文存储
//!
//! 标识到原文快照（文本、类型、上下文）的持久映射，是页面源语言内容的台账。
//! 条目只会被新值覆盖，从不主动删除。

use std::collections::BTreeMap;
use std::sync::Arc;

use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};

use crate::parsers::html::dom::index_elements_by_attr;
use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::extractor::{ContentExtractor, ContentItem, Context, SemanticType};
use crate::translation::pipeline::identity::Identity;
use crate::translation::pipeline::mutator::PageMutator;
use crate::translation::storage::kv::KeyValueStore;

/// 原文条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalEntry {
    pub text: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    pub context: Context,
}

impl From<&ContentItem> for OriginalEntry {
    fn from(item: &ContentItem) -> Self {
        Self {
            text: item.text.clone(),
            semantic_type: item.semantic_type,
            context: item.context.clone(),
        }
    }
}

/// 与存活元素关联后的原文条目
#[derive(Debug, Clone)]
pub struct LiveEntry {
    pub id: Identity,
    pub entry: OriginalEntry,
    /// 所有带该标识的存活元素（标识可能因文本相同而共享）
    pub elements: Vec<Handle>,
}

/// 原文存储
pub struct OriginalContentStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    identity_attribute: String,
    mutator: PageMutator,
}

impl OriginalContentStore {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &TranslationConfig) -> Self {
        Self {
            store,
            key: config.storage_key(constants::ORIGINAL_CONTENT_KEY),
            identity_attribute: config.identity_attribute.clone(),
            mutator: PageMutator::new(config),
        }
    }

    /// 读取全部条目；存储为空或无法解析时返回空映射并记录警告
    pub fn entries(&self) -> BTreeMap<Identity, OriginalEntry> {
        match self.store.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("原文快照无法解析，按空处理: {}", e);
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("原文快照读取失败，按空处理: {}", e);
                BTreeMap::new()
            }
        }
    }

    /// 查找单个条目
    pub fn get(&self, id: &Identity) -> Option<OriginalEntry> {
        self.entries().remove(id)
    }

    /// 提取当前内容并追加合并：已有标识不被覆盖
    pub fn save(&self, root: &Handle, extractor: &mut ContentExtractor) -> TranslationResult<usize> {
        let items = extractor.extract(root);
        self.write_items(&items, false)
    }

    /// 协调循环的增量写入：新条目插入，已有条目覆盖
    pub fn merge(&self, items: &[ContentItem]) -> TranslationResult<usize> {
        self.write_items(items, true)
    }

    fn write_items(&self, items: &[ContentItem], overwrite: bool) -> TranslationResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut failure = None;

        self.store.update(&self.key, &mut |current| {
            let mut entries: BTreeMap<Identity, OriginalEntry> = current
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();

            for item in items {
                if overwrite || !entries.contains_key(&item.id) {
                    let entry = OriginalEntry::from(item);
                    if entries.get(&item.id) != Some(&entry) {
                        entries.insert(item.id.clone(), entry);
                        written += 1;
                    }
                }
            }

            match serde_json::to_string(&entries) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    failure = Some(e);
                    current
                }
            }
        })?;

        if let Some(e) = failure {
            return Err(e.into());
        }

        if written > 0 {
            tracing::debug!("原文存储写入 {} 条", written);
        }
        Ok(written)
    }

    /// 只返回标识仍对应存活元素的条目；已移除元素的条目仅从视图中省略
    pub fn load(&self, root: &Handle) -> Vec<LiveEntry> {
        let entries = self.entries();
        if entries.is_empty() {
            tracing::warn!("原文存储为空");
            return Vec::new();
        }

        let mut index = index_elements_by_attr(root, &self.identity_attribute);
        entries
            .into_iter()
            .filter_map(|(id, entry)| {
                index.remove(id.as_str()).map(|elements| LiveEntry {
                    id,
                    entry,
                    elements,
                })
            })
            .collect()
    }

    /// 恢复全部原文并去掉语言标记，返回恢复的元素数
    pub fn restore_all(&self, root: &Handle) -> usize {
        self.mutator.restore_all(root, self)
    }

    /// 恢复单个标识对应的原文
    pub fn restore_one(&self, root: &Handle, id: &Identity) -> usize {
        self.mutator.restore_one(root, self, id)
    }
}
