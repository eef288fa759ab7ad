//! 内容标识分配
//!
//! 元素首次被提取时，根据其文本内容的哈希生成稳定标识并写回元素属性；
//! 之后的每一次提取都直接复用该属性，即使文本已经改变。

use std::fmt;

use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};

use crate::parsers::html::dom::{get_node_attr, set_node_attr};
use crate::translation::config::constants;

/// 元素的稳定标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// 由文本内容派生标识：相同文本总是得到相同标识
    pub fn from_text(text: &str) -> Self {
        let hash = blake3::hash(text.as_bytes()).to_hex();
        Self(format!(
            "{}{}",
            constants::IDENTITY_PREFIX,
            &hash.as_str()[..constants::IDENTITY_HASH_LEN]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 标识分配器
#[derive(Debug, Clone)]
pub struct IdentityAssigner {
    attribute: String,
}

impl IdentityAssigner {
    pub fn new(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
        }
    }

    /// 标识属性名
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// 读取元素已有的标识
    pub fn existing(&self, element: &Handle) -> Option<Identity> {
        get_node_attr(element, &self.attribute)
            .filter(|value| !value.is_empty())
            .map(Identity)
    }

    /// 返回元素标识；元素尚无标识时按文本生成并写回。
    ///
    /// 第二个返回值表示本次是否新分配了标识。
    pub fn assign(&self, element: &Handle, text: &str) -> (Identity, bool) {
        if let Some(identity) = self.existing(element) {
            return (identity, false);
        }

        let identity = Identity::from_text(text);
        set_node_attr(element, &self.attribute, Some(identity.0.clone()));
        (identity, true)
    }
}

impl Default for IdentityAssigner {
    fn default() -> Self {
        Self::new(constants::DEFAULT_IDENTITY_ATTRIBUTE)
    }
}
