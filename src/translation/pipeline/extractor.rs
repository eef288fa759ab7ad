//! 内容提取器
//!
//! 遍历文档，应用包含/排除规则，为每个可翻译元素生成带标识、语义类型和上下文的内容项。
//! 除首次分配标识时写入属性外，提取是只读的，可以随时重复执行。

use std::collections::HashMap;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, Node};
use serde::{Deserialize, Serialize};

use crate::parsers::html::dom::{
    contains, element_children, get_node_name, get_parent_node, text_content,
};
use crate::parsers::html::selector::SelectorList;
use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::identity::{Identity, IdentityAssigner};

/// 语义类型，仅由标签名决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SemanticType {
    Heading,
    Paragraph,
    ListItem,
    TableCell,
    Button,
    Link,
    Other,
}

impl SemanticType {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => SemanticType::Heading,
            "p" => SemanticType::Paragraph,
            "li" => SemanticType::ListItem,
            "td" | "th" => SemanticType::TableCell,
            "button" => SemanticType::Button,
            "a" => SemanticType::Link,
            _ => SemanticType::Other,
        }
    }
}

/// 发送给翻译服务的消歧上下文，不参与标识和缓存
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub preceding: String,
    pub following: String,
    pub section_title: String,
}

/// 一个可翻译的内容项
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub id: Identity,
    /// 提取时元素的 trim 后文本，非空
    pub text: String,
    pub semantic_type: SemanticType,
    pub context: Context,
    /// 所属元素
    pub element: Handle,
}

/// 提取统计信息
#[derive(Debug, Clone, Default)]
pub struct ExtractionStats {
    pub candidates: usize,
    pub excluded: usize,
    pub empty: usize,
    pub identities_assigned: usize,
    pub extracted: usize,
}

impl ExtractionStats {
    pub fn reset(&mut self) {
        *self = Default::default();
    }
}

/// 内容提取器
pub struct ContentExtractor {
    include: SelectorList,
    exclude: SelectorList,
    section: SelectorList,
    section_title: SelectorList,
    assigner: IdentityAssigner,
    stats: ExtractionStats,
}

impl ContentExtractor {
    /// 按配置创建提取器；选择器无效时返回配置错误
    pub fn new(config: &TranslationConfig) -> TranslationResult<Self> {
        let (include, exclude) = config.selectors.compile()?;

        Ok(Self {
            include,
            exclude,
            section: SelectorList::parse(constants::SECTION_SELECTOR)?,
            section_title: SelectorList::parse(constants::SECTION_TITLE_SELECTOR)?,
            assigner: IdentityAssigner::new(&config.identity_attribute),
            stats: ExtractionStats::default(),
        })
    }

    pub fn assigner(&self) -> &IdentityAssigner {
        &self.assigner
    }

    /// 按文档顺序提取所有内容项
    pub fn extract(&mut self, root: &Handle) -> Vec<ContentItem> {
        self.stats.reset();

        let candidates = self.include.select_all(root);
        let excluded = self.exclude.select_all(root);
        self.stats.candidates = candidates.len();

        let mut items = Vec::with_capacity(candidates.len());
        // 同一轮提取内每个区块的标题只查找一次
        let mut section_titles: HashMap<*const Node, String> = HashMap::new();

        for element in candidates {
            if Self::is_excluded(&element, &excluded) {
                self.stats.excluded += 1;
                continue;
            }

            let text = text_content(&element).trim().to_string();
            if text.is_empty() {
                self.stats.empty += 1;
                continue;
            }

            let (id, created) = self.assigner.assign(&element, &text);
            if created {
                self.stats.identities_assigned += 1;
            }

            items.push(ContentItem {
                id,
                semantic_type: get_node_name(&element)
                    .map(SemanticType::from_tag)
                    .unwrap_or(SemanticType::Other),
                context: self.context_for(&element, &mut section_titles),
                text,
                element,
            });
        }

        self.stats.extracted = items.len();
        tracing::debug!(
            "提取完成: 候选 {} 个，排除 {} 个，空文本 {} 个，新分配标识 {} 个",
            self.stats.candidates,
            self.stats.excluded,
            self.stats.empty,
            self.stats.identities_assigned
        );

        items
    }

    /// 获取最近一次提取的统计信息
    pub fn get_stats(&self) -> &ExtractionStats {
        &self.stats
    }

    // 排除规则在包含关系上是对称的：祖先或后代命中都算
    fn is_excluded(element: &Handle, excluded: &[Handle]) -> bool {
        excluded
            .iter()
            .any(|ex| contains(ex, element) || contains(element, ex))
    }

    fn context_for(&self, element: &Handle, section_titles: &mut HashMap<*const Node, String>) -> Context {
        let section_title = match self.section.closest(element) {
            Some(section) => section_titles
                .entry(Rc::as_ptr(&section))
                .or_insert_with(|| {
                    self.section_title
                        .first_descendant(&section)
                        .map(|heading| text_content(&heading).trim().to_string())
                        .unwrap_or_default()
                })
                .clone(),
            None => String::new(),
        };

        let (preceding, following) = match get_parent_node(element) {
            Some(parent) => {
                let siblings = element_children(&parent);
                let index = siblings
                    .iter()
                    .position(|s| Rc::ptr_eq(s, element));
                match index {
                    Some(index) => (
                        index
                            .checked_sub(1)
                            .and_then(|i| siblings.get(i))
                            .map(|s| text_content(s).trim().to_string())
                            .unwrap_or_default(),
                        siblings
                            .get(index + 1)
                            .map(|s| text_content(s).trim().to_string())
                            .unwrap_or_default(),
                    ),
                    None => Default::default(),
                }
            }
            None => Default::default(),
        };

        Context {
            preceding,
            following,
            section_title,
        }
    }
}
