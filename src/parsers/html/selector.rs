//! 选择器规则
//!
//! 为包含/排除规则提供一个精简的 CSS 选择器子集，借助 cssparser 完成分词：
//! 类型选择器、`*`、`.class`、`#id`、`[attr]`、`[attr=value]`，
//! 复合选择器，以及后代组合符（空白）。

use cssparser::{ParseError, Parser, ParserInput, Token};
use markup5ever_rcdom::Handle;

use super::dom::{ancestors, descendant_elements, get_node_attr, get_node_name, has_class};
use crate::translation::error::{TranslationError, TranslationResult};

type SelectorParseError<'i> = ParseError<'i, ()>;

/// 属性选择器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub value: Option<String>,
}

/// 复合选择器，如 `div.section[data-x]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub universal: bool,
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
}

impl CompoundSelector {
    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }

    /// 检查单个元素是否匹配
    pub fn matches(&self, element: &Handle) -> bool {
        let Some(name) = get_node_name(element) else {
            return false;
        };

        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(name) {
                return false;
            }
        }

        if let Some(id) = &self.id {
            if get_node_attr(element, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }

        if !self.classes.iter().all(|c| has_class(element, c)) {
            return false;
        }

        self.attrs.iter().all(|attr| match (&attr.value, get_node_attr(element, &attr.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(expected), Some(actual)) => *expected == actual,
        })
    }
}

/// 由后代组合符连接的复合选择器序列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// 从左到右排列，最后一个作用于目标元素本身
    pub compounds: Vec<CompoundSelector>,
}

impl Selector {
    pub fn matches(&self, element: &Handle) -> bool {
        let Some((last, rest)) = self.compounds.split_last() else {
            return false;
        };

        if !last.matches(element) {
            return false;
        }

        // 后代组合符只需贪心地向上匹配
        let mut pending = rest.iter().rev().peekable();
        for ancestor in ancestors(element) {
            match pending.peek() {
                Some(compound) if compound.matches(&ancestor) => {
                    pending.next();
                }
                Some(_) => {}
                None => break,
            }
        }

        pending.peek().is_none()
    }
}

/// 逗号分隔的选择器列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorList {
    pub selectors: Vec<Selector>,
}

impl SelectorList {
    /// 解析选择器列表，如 `section, article, div.section`
    pub fn parse(source: &str) -> TranslationResult<Self> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut input = ParserInput::new(source);
        let mut parser = Parser::new(&mut input);

        let selectors = parser
            .parse_comma_separated(parse_selector)
            .map_err(|e| {
                TranslationError::ConfigError(format!("无效的选择器 `{}`: {:?}", source, e.kind))
            })?;

        Ok(Self { selectors })
    }

    /// 由多条规则拼成一个列表
    pub fn from_rules<S: AsRef<str>>(rules: &[S]) -> TranslationResult<Self> {
        let mut selectors = Vec::new();
        for rule in rules {
            selectors.extend(Self::parse(rule.as_ref())?.selectors);
        }
        Ok(Self { selectors })
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// 元素是否匹配任一选择器
    pub fn matches(&self, element: &Handle) -> bool {
        self.selectors.iter().any(|s| s.matches(element))
    }

    /// 最近的匹配祖先（含自身），对应 DOM 的 `closest`
    pub fn closest(&self, element: &Handle) -> Option<Handle> {
        if self.matches(element) {
            return Some(element.clone());
        }
        ancestors(element).into_iter().find(|a| self.matches(a))
    }

    /// 子树中第一个匹配的后代元素（不含自身）
    pub fn first_descendant(&self, element: &Handle) -> Option<Handle> {
        descendant_elements(element)
            .into_iter()
            .find(|el| self.matches(el))
    }

    /// 按文档顺序收集所有匹配的后代元素
    pub fn select_all(&self, root: &Handle) -> Vec<Handle> {
        descendant_elements(root)
            .into_iter()
            .filter(|el| self.matches(el))
            .collect()
    }
}

fn parse_selector<'i>(parser: &mut Parser<'i, '_>) -> Result<Selector, SelectorParseError<'i>> {
    let mut compounds = Vec::new();
    let mut current = CompoundSelector::default();

    loop {
        let token = match parser.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::WhiteSpace(_) => {
                if !current.is_empty() {
                    compounds.push(std::mem::take(&mut current));
                }
            }
            Token::Ident(name) => {
                if !current.is_empty() {
                    return Err(parser.new_unexpected_token_error(Token::Ident(name)));
                }
                current.tag = Some(name.to_ascii_lowercase());
            }
            Token::Delim('*') if current.is_empty() => current.universal = true,
            Token::Delim('.') => {
                let class = parser.expect_ident()?.to_string();
                current.classes.push(class);
            }
            Token::IDHash(id) => current.id = Some(id.to_string()),
            Token::SquareBracketBlock => {
                let attr = parser.parse_nested_block(parse_attr_selector)?;
                current.attrs.push(attr);
            }
            other => return Err(parser.new_unexpected_token_error(other)),
        }
    }

    if !current.is_empty() {
        compounds.push(current);
    }

    if compounds.is_empty() {
        return Err(parser.new_custom_error(()));
    }

    Ok(Selector { compounds })
}

fn parse_attr_selector<'i>(
    parser: &mut Parser<'i, '_>,
) -> Result<AttrSelector, SelectorParseError<'i>> {
    let name = parser.expect_ident()?.to_string();

    if parser.is_exhausted() {
        return Ok(AttrSelector { name, value: None });
    }

    parser.expect_delim('=')?;
    let value = parser.expect_ident_or_string()?.to_string();

    Ok(AttrSelector {
        name,
        value: Some(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::html_to_dom;

    #[test]
    fn test_parse_simple_list() {
        let list = SelectorList::parse("div, p , .no-translate, [data-no-translate]").unwrap();
        assert_eq!(list.selectors.len(), 4);
        assert_eq!(list.selectors[0].compounds[0].tag.as_deref(), Some("div"));
        assert_eq!(list.selectors[2].compounds[0].classes, vec!["no-translate"]);
        assert_eq!(list.selectors[3].compounds[0].attrs[0].name, "data-no-translate");
    }

    #[test]
    fn test_parse_compound_and_descendant() {
        let list = SelectorList::parse("div.section, main article[lang=\"en\"]").unwrap();
        let compound = &list.selectors[0].compounds[0];
        assert_eq!(compound.tag.as_deref(), Some("div"));
        assert_eq!(compound.classes, vec!["section"]);

        let descendant = &list.selectors[1];
        assert_eq!(descendant.compounds.len(), 2);
        assert_eq!(
            descendant.compounds[1].attrs[0],
            AttrSelector {
                name: "lang".to_string(),
                value: Some("en".to_string())
            }
        );
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let err = SelectorList::parse("div > p").unwrap_err();
        assert!(matches!(err, TranslationError::ConfigError(_)));
    }

    #[test]
    fn test_matching_and_closest() {
        let dom = html_to_dom(
            b"<main><div class=\"section\"><h2>Intro</h2><p id=\"x\" data-k=\"v\">t</p></div></main>",
            "utf-8",
        );
        let p = SelectorList::parse("#x").unwrap().select_all(&dom.document);
        assert_eq!(p.len(), 1);
        let p = &p[0];

        assert!(SelectorList::parse("[data-k=v]").unwrap().matches(p));
        assert!(!SelectorList::parse("[data-k=w]").unwrap().matches(p));
        assert!(SelectorList::parse("main p").unwrap().matches(p));
        assert!(!SelectorList::parse("section p").unwrap().matches(p));

        let section = SelectorList::parse("section, article, div.section")
            .unwrap()
            .closest(p)
            .unwrap();
        assert_eq!(get_node_name(&section), Some("div"));

        let heading = SelectorList::parse("h1, h2, h3")
            .unwrap()
            .first_descendant(&section)
            .unwrap();
        assert_eq!(get_node_name(&heading), Some("h2"));
    }
}
