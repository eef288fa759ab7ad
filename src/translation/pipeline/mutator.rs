//! 页面修改器
//!
//! 把译文写回元素并打上语言标记，或依据原文存储撤销这些修改。
//! 标记 class 是"元素当前文本由哪种语言的译文写入"的唯一依据。

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{
    add_class, get_classes, index_elements_by_attr, remove_classes_with_prefix, set_text_content,
};
use crate::translation::config::TranslationConfig;
use crate::translation::error::TranslationError;
use crate::translation::pipeline::identity::Identity;
use crate::translation::storage::original::OriginalContentStore;

/// 一次应用的结果
#[derive(Debug, Clone, Default)]
pub struct MutationReport {
    /// 被更新的元素数（共享标识的元素各计一次）
    pub elements_updated: usize,
    /// 页面上已找不到的标识
    pub missing: Vec<Identity>,
}

/// 页面修改器
#[derive(Debug, Clone)]
pub struct PageMutator {
    identity_attribute: String,
    marker_prefix: String,
}

impl PageMutator {
    pub fn new(config: &TranslationConfig) -> Self {
        Self {
            identity_attribute: config.identity_attribute.clone(),
            marker_prefix: config.marker_prefix.clone(),
        }
    }

    pub fn marker_for(&self, language: &str) -> String {
        format!("{}{}", self.marker_prefix, language)
    }

    /// 元素当前标记的语言
    pub fn marked_language(&self, element: &Handle) -> Option<String> {
        get_classes(element)
            .into_iter()
            .find_map(|class| class.strip_prefix(&self.marker_prefix).map(str::to_string))
            .filter(|language| !language.is_empty())
    }

    /// 去掉元素上所有语言标记
    pub fn strip_markers(&self, element: &Handle) -> bool {
        remove_classes_with_prefix(element, &self.marker_prefix)
    }

    /// 应用译文：每个带该标识的存活元素都被更新，旧标记替换为 `language` 的标记
    pub fn apply<'a, I>(&self, root: &Handle, language: &str, translations: I) -> MutationReport
    where
        I: IntoIterator<Item = (&'a Identity, &'a str)>,
    {
        let index = index_elements_by_attr(root, &self.identity_attribute);
        let marker = self.marker_for(language);
        let mut report = MutationReport::default();

        for (id, text) in translations {
            match index.get(id.as_str()) {
                Some(elements) => {
                    for element in elements {
                        set_text_content(element, text);
                        self.strip_markers(element);
                        add_class(element, &marker);
                        report.elements_updated += 1;
                    }
                }
                None => {
                    tracing::warn!("{}，跳过", TranslationError::MissingElement(id.to_string()));
                    report.missing.push(id.clone());
                }
            }
        }

        report
    }

    /// 恢复所有已知元素的原文
    pub fn restore_all(&self, root: &Handle, originals: &OriginalContentStore) -> usize {
        let mut restored = 0;
        for live in originals.load(root) {
            for element in &live.elements {
                self.restore_element(element, &live.entry.text);
                restored += 1;
            }
        }
        tracing::info!("已恢复 {} 个元素的原文", restored);
        restored
    }

    /// 恢复单个标识的原文
    pub fn restore_one(&self, root: &Handle, originals: &OriginalContentStore, id: &Identity) -> usize {
        let Some(entry) = originals.get(id) else {
            tracing::warn!("原文存储中没有标识 {}", id);
            return 0;
        };

        let index = index_elements_by_attr(root, &self.identity_attribute);
        let Some(elements) = index.get(id.as_str()) else {
            tracing::warn!("标识 {} 已没有对应的元素", id);
            return 0;
        };

        for element in elements {
            self.restore_element(element, &entry.text);
        }
        elements.len()
    }

    fn restore_element(&self, element: &Handle, text: &str) {
        set_text_content(element, text);
        self.strip_markers(element);
    }
}
