//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作（文本、属性、class、祖先关系）
//! - `selector`: 包含/排除规则使用的选择器子集
//! - `serializer`: 序列化功能

pub mod dom;
pub mod selector;
pub mod serializer;

pub use dom::{
    add_class, ancestors, contains, descendant_elements, element_children, find_elements_by_attr,
    get_classes, get_node_attr, get_node_name, get_parent_node, has_class, html_to_dom,
    index_elements_by_attr, is_element, remove_classes_with_prefix, set_node_attr,
    set_text_content, text_content,
};
pub use selector::{Selector, SelectorList};
pub use serializer::serialize_document;
