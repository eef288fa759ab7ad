use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => {
            let (string, _, _) = encoding.decode(data);
            string.to_string()
        }
        None => String::from_utf8_lossy(data).to_string(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .unwrap_or_default()
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 是否为元素节点
pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 设置节点属性
///
/// `attr_value` 为 `None` 时删除该属性。
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    // Remove attr completely if attr_value is not defined
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 获取父节点
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    // Cell 只能 take，取出后必须放回
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 获取直接子元素（跳过文本和注释节点）
pub fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .cloned()
        .collect()
}

/// 按文档顺序收集所有后代元素（不含自身）
pub fn descendant_elements(node: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_descendant_elements(node, &mut found);
    found
}

fn collect_descendant_elements(node: &Handle, found: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        if is_element(child) {
            found.push(child.clone());
        }
        collect_descendant_elements(child, found);
    }
}

/// 获取祖先元素，由近及远
pub fn ancestors(node: &Handle) -> Vec<Handle> {
    let mut chain = Vec::new();
    let mut current = get_parent_node(node);

    while let Some(parent) = current {
        if !is_element(&parent) {
            break;
        }
        current = get_parent_node(&parent);
        chain.push(parent);
    }

    chain
}

/// `node` 是否为 `ancestor` 本身或其后代
pub fn contains(ancestor: &Handle, node: &Handle) -> bool {
    if Rc::ptr_eq(ancestor, node) {
        return true;
    }
    ancestors(node).iter().any(|a| Rc::ptr_eq(a, ancestor))
}

/// 拼接节点下所有文本节点的内容
pub fn text_content(node: &Handle) -> String {
    let mut buf = String::new();
    append_text(node, &mut buf);
    buf
}

fn append_text(node: &Handle, buf: &mut String) {
    match &node.data {
        NodeData::Text { contents } => buf.push_str(&contents.borrow()),
        NodeData::Element { .. } | NodeData::Document => {
            for child in node.children.borrow().iter() {
                append_text(child, buf);
            }
        }
        _ => {}
    }
}

/// 用单个文本节点替换元素的全部子节点
pub fn set_text_content(node: &Handle, text: &str) {
    let old_children = std::mem::take(&mut *node.children.borrow_mut());
    for child in old_children {
        child.parent.set(None);
    }

    if text.is_empty() {
        return;
    }

    let text_node = Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    });
    text_node.parent.set(Some(Rc::downgrade(node)));
    node.children.borrow_mut().push(text_node);
}

/// 获取元素的 class 列表
pub fn get_classes(node: &Handle) -> Vec<String> {
    get_node_attr(node, "class")
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// 元素是否带有指定 class
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_node_attr(node, "class")
        .map(|value| value.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

/// 添加 class（已存在时不重复添加）
pub fn add_class(node: &Handle, class_name: &str) {
    let mut classes = get_classes(node);
    if classes.iter().any(|c| c == class_name) {
        return;
    }
    classes.push(class_name.to_string());
    set_node_attr(node, "class", Some(classes.join(" ")));
}

/// 删除所有以 `prefix` 开头的 class，返回是否有删除
pub fn remove_classes_with_prefix(node: &Handle, prefix: &str) -> bool {
    let classes = get_classes(node);
    let kept: Vec<String> = classes
        .iter()
        .filter(|c| !c.starts_with(prefix))
        .cloned()
        .collect();

    if kept.len() == classes.len() {
        return false;
    }

    if kept.is_empty() {
        set_node_attr(node, "class", None);
    } else {
        set_node_attr(node, "class", Some(kept.join(" ")));
    }
    true
}

/// 查找属性值等于 `value` 的所有元素，按文档顺序
pub fn find_elements_by_attr(root: &Handle, attr_name: &str, value: &str) -> Vec<Handle> {
    descendant_elements(root)
        .into_iter()
        .filter(|el| get_node_attr(el, attr_name).as_deref() == Some(value))
        .collect()
}

/// 按属性值分组所有带该属性的元素，一次遍历
pub fn index_elements_by_attr(root: &Handle, attr_name: &str) -> HashMap<String, Vec<Handle>> {
    let mut index: HashMap<String, Vec<Handle>> = HashMap::new();
    for el in descendant_elements(root) {
        if let Some(value) = get_node_attr(&el, attr_name) {
            index.entry(value).or_default().push(el);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_by_name(dom: &RcDom, name: &str) -> Handle {
        descendant_elements(&dom.document)
            .into_iter()
            .find(|el| get_node_name(el) == Some(name))
            .unwrap()
    }

    #[test]
    fn test_text_content_concatenates_descendants() {
        let dom = html_to_dom(b"<div> Hello <b>big</b> world </div>", "utf-8");
        let div = first_by_name(&dom, "div");
        assert_eq!(text_content(&div), " Hello big world ");
    }

    #[test]
    fn test_set_text_content_replaces_children() {
        let dom = html_to_dom(b"<p>Hello <i>there</i></p>", "utf-8");
        let p = first_by_name(&dom, "p");

        set_text_content(&p, "नमस्ते");

        assert_eq!(text_content(&p), "नमस्ते");
        assert_eq!(p.children.borrow().len(), 1);
        let child = p.children.borrow()[0].clone();
        assert!(Rc::ptr_eq(&get_parent_node(&child).unwrap(), &p));
    }

    #[test]
    fn test_get_parent_node_is_repeatable() {
        let dom = html_to_dom(b"<section><p>x</p></section>", "utf-8");
        let p = first_by_name(&dom, "p");

        let first = get_parent_node(&p).unwrap();
        let second = get_parent_node(&p).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(get_node_name(&first), Some("section"));
    }

    #[test]
    fn test_class_helpers() {
        let dom = html_to_dom(b"<p class=\"lead translated-hi\">x</p>", "utf-8");
        let p = first_by_name(&dom, "p");

        assert!(has_class(&p, "translated-hi"));
        assert!(remove_classes_with_prefix(&p, "translated-"));
        assert_eq!(get_classes(&p), vec!["lead".to_string()]);

        add_class(&p, "translated-ta");
        add_class(&p, "translated-ta");
        assert_eq!(get_node_attr(&p, "class").as_deref(), Some("lead translated-ta"));

        assert!(!remove_classes_with_prefix(&p, "other-"));
    }

    #[test]
    fn test_contains_and_find_by_attr() {
        let dom = html_to_dom(
            b"<div id=\"a\"><p id=\"b\">x</p></div><p id=\"b\">y</p>",
            "utf-8",
        );
        let div = first_by_name(&dom, "div");
        let matches = find_elements_by_attr(&dom.document, "id", "b");

        assert_eq!(matches.len(), 2);
        assert!(contains(&div, &matches[0]));
        assert!(!contains(&div, &matches[1]));
        assert!(contains(&div, &div));
    }

    #[test]
    fn test_index_elements_by_attr() {
        let dom = html_to_dom(b"<p id=\"a\">x</p><p id=\"a\">y</p><p>z</p>", "utf-8");
        let index = index_elements_by_attr(&dom.document, "id");

        assert_eq!(index.len(), 1);
        assert_eq!(index["a"].len(), 2);
    }
}
