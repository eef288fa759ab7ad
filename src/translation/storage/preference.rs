//! 语言偏好
//!
//! 记录用户最后选择的目标语言，下次初始化时自动沿用。

use std::sync::Arc;

use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::TranslationResult;
use crate::translation::storage::kv::KeyValueStore;

pub struct LanguagePreference {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LanguagePreference {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &TranslationConfig) -> Self {
        Self {
            store,
            key: config.storage_key(constants::LANGUAGE_PREFERENCE_KEY),
        }
    }

    /// 读取已保存的语言；读取失败按未保存处理
    pub fn get(&self) -> Option<String> {
        match self.store.get(&self.key) {
            Ok(value) => value.filter(|lang| !lang.trim().is_empty()),
            Err(e) => {
                tracing::warn!("读取语言偏好失败: {}", e);
                None
            }
        }
    }

    pub fn set(&self, language: &str) -> TranslationResult<()> {
        self.store.set(&self.key, language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::storage::kv::MemoryStore;

    #[test]
    fn test_preference_round_trip() {
        let kv = Arc::new(MemoryStore::new());
        let pref = LanguagePreference::new(kv.clone(), &TranslationConfig::new("docs", "key"));

        assert_eq!(pref.get(), None);
        pref.set("ta").unwrap();
        assert_eq!(pref.get().as_deref(), Some("ta"));
        assert_eq!(kv.get("docs:translation_language").unwrap().as_deref(), Some("ta"));
    }
}
