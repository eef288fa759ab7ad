//! 翻译缓存模块
//!
//! (标识, 目标语言) → 译文 的持久缓存，用于避免重复的远程调用。
//! 存储内容损坏时清空重建，不会让翻译失败。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::identity::Identity;
use crate::translation::storage::kv::KeyValueStore;

/// 持久化的缓存快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheSnapshot {
    /// 最近一次写入时间（Unix 秒）
    saved_at: i64,
    entries: BTreeMap<String, String>,
}

/// 缓存统计信息
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub resets: u64,
}

impl CacheStats {
    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// 生成缓存键
pub fn cache_key(id: &Identity, language: &str) -> String {
    format!("{}-{}", id, language)
}

/// 翻译缓存
pub struct TranslationCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
    ttl: Option<Duration>,
    entries: HashMap<String, String>,
    stats: CacheStats,
}

impl TranslationCache {
    /// 打开缓存并从存储加载
    pub fn open(store: Arc<dyn KeyValueStore>, config: &TranslationConfig) -> Self {
        let mut cache = Self {
            store,
            key: config.storage_key(constants::TRANSLATION_CACHE_KEY),
            ttl: config.cache_ttl(),
            entries: HashMap::new(),
            stats: CacheStats::default(),
        };
        cache.reload();
        cache
    }

    /// 重新从存储加载，吸收其他写入者的条目
    pub fn reload(&mut self) {
        self.entries = match self.read_snapshot() {
            Some(snapshot) => snapshot.entries.into_iter().collect(),
            None => HashMap::new(),
        };
        self.stats.total_entries = self.entries.len();
    }

    fn read_snapshot(&mut self) -> Option<CacheSnapshot> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("翻译缓存读取失败，按空缓存处理: {}", e);
                return None;
            }
        };

        let snapshot: CacheSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("翻译缓存已损坏，清空重建: {}", e);
                self.reset_storage();
                return None;
            }
        };

        if self.is_expired(&snapshot) {
            tracing::info!("翻译缓存已过期，清空重建");
            self.reset_storage();
            return None;
        }

        Some(snapshot)
    }

    fn is_expired(&self, snapshot: &CacheSnapshot) -> bool {
        match self.ttl {
            Some(ttl) => Utc::now().timestamp() - snapshot.saved_at > ttl.as_secs() as i64,
            None => false,
        }
    }

    fn reset_storage(&mut self) {
        self.stats.resets += 1;
        if let Err(e) = self.store.remove(&self.key) {
            tracing::warn!("清空翻译缓存失败: {}", e);
        }
    }

    /// 查询缓存
    pub fn get(&mut self, id: &Identity, language: &str) -> Option<String> {
        self.stats.total_requests += 1;
        match self.entries.get(&cache_key(id, language)) {
            Some(text) => {
                self.stats.cache_hits += 1;
                Some(text.clone())
            }
            None => {
                self.stats.cache_misses += 1;
                None
            }
        }
    }

    /// 不计入统计的查询
    pub fn peek(&self, id: &Identity, language: &str) -> Option<&str> {
        self.entries.get(&cache_key(id, language)).map(String::as_str)
    }

    /// 插入或覆盖单条译文
    pub fn put(&mut self, id: &Identity, language: &str, text: &str) -> TranslationResult<()> {
        self.put_many(language, [(id.clone(), text.to_string())])
    }

    /// 批量插入译文，一次写入存储
    pub fn put_many<I>(&mut self, language: &str, translations: I) -> TranslationResult<()>
    where
        I: IntoIterator<Item = (Identity, String)>,
    {
        let fresh: Vec<(String, String)> = translations
            .into_iter()
            .map(|(id, text)| (cache_key(&id, language), text))
            .collect();

        if fresh.is_empty() {
            return Ok(());
        }

        let ttl = self.ttl;
        let mut failure = None;
        let mut merged = BTreeMap::new();

        self.store.update(&self.key, &mut |current| {
            let mut snapshot: CacheSnapshot = current
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();

            if let Some(ttl) = ttl {
                if Utc::now().timestamp() - snapshot.saved_at > ttl.as_secs() as i64 {
                    snapshot.entries.clear();
                }
            }

            for (key, text) in &fresh {
                snapshot.entries.insert(key.clone(), text.clone());
            }
            snapshot.saved_at = Utc::now().timestamp();

            match serde_json::to_string(&snapshot) {
                Ok(raw) => {
                    merged = snapshot.entries;
                    Some(raw)
                }
                Err(e) => {
                    failure = Some(e);
                    current
                }
            }
        })?;

        if let Some(e) = failure {
            return Err(e.into());
        }

        self.entries = merged.into_iter().collect();
        self.stats.total_entries = self.entries.len();
        Ok(())
    }

    /// 清空缓存
    pub fn clear(&mut self) -> TranslationResult<()> {
        self.entries.clear();
        self.stats.total_entries = 0;
        self.store.remove(&self.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> &CacheStats {
        &self.stats
    }
}
