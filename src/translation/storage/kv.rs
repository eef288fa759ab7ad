//! 持久化键值存储
//!
//! 引擎只通过字符串键的 get/set 契约访问存储。提供内存实现（测试和一次性会话）
//! 和基于 redb 的磁盘实现。

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::translation::error::{TranslationError, TranslationResult};

const STATE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("page_translator_state");

/// 字符串键值存储契约
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> TranslationResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> TranslationResult<()>;

    fn remove(&self, key: &str) -> TranslationResult<()>;

    /// 读-改-写。默认实现不具备隔离性，支持事务的后端应覆盖它。
    ///
    /// `f` 返回 `None` 时删除该键。
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Option<String>,
    ) -> TranslationResult<()> {
        match f(self.get(key)?) {
            Some(value) => self.set(key, &value),
            None => self.remove(key),
        }
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> TranslationError {
    TranslationError::StorageError("内存存储锁已中毒".to_string())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> TranslationResult<Option<String>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TranslationResult<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> TranslationResult<()> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Option<String>,
    ) -> TranslationResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        match f(entries.get(key).cloned()) {
            Some(value) => {
                entries.insert(key.to_string(), value);
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(())
    }
}

/// 基于 redb 的磁盘存储
///
/// `update` 在单个写事务内完成，多个进程共享同一文件时不会互相覆盖。
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// 打开或创建数据库文件
    pub fn open<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let db = Database::create(path.as_ref()).map_err(|e| {
            TranslationError::StorageError(format!(
                "无法打开存储 {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self { db })
    }

    fn read(&self, key: &str) -> Result<Option<String>, redb::Error> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(STATE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = table.get(key)?.map(|value| value.value().to_string());
        Ok(value)
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE_TABLE)?;
            match value {
                Some(value) => {
                    table.insert(key, value)?;
                }
                None => {
                    table.remove(key)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn read_modify_write(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Option<String>,
    ) -> Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE_TABLE)?;
            let current = table.get(key)?.map(|value| value.value().to_string());
            match f(current) {
                Some(value) => {
                    table.insert(key, value.as_str())?;
                }
                None => {
                    table.remove(key)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> TranslationResult<Option<String>> {
        Ok(self.read(key)?)
    }

    fn set(&self, key: &str, value: &str) -> TranslationResult<()> {
        Ok(self.write(key, Some(value))?)
    }

    fn remove(&self, key: &str) -> TranslationResult<()> {
        Ok(self.write(key, None)?)
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Option<String>,
    ) -> TranslationResult<()> {
        Ok(self.read_modify_write(key, f)?)
    }
}
