//! 可升级包缓存
//!
//! 缓存内容是不可变的 `Snapshot`，以 `Arc` 共享。读者只在读锁下克隆一次 `Arc`，
//! 写者在写锁下基于当前快照构造新快照并整体替换，读者永远看不到“半新半旧”的数据。

use crate::exclusion;
use crate::package_manager::PackageRecord;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    packages: Vec<PackageRecord>,
    refreshed_at: Option<Instant>,
    refreshed_wall: Option<DateTime<Local>>,
    generation: u64,
}

impl Snapshot {
    /// 一次完整解析的结果；按 id 去重，保留第一次出现的记录
    pub fn populated(packages: Vec<PackageRecord>, generation: u64) -> Self {
        let mut seen = HashSet::new();
        let packages = packages
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .collect();
        Self {
            packages,
            refreshed_at: Some(Instant::now()),
            refreshed_wall: Some(Local::now()),
            generation,
        }
    }

    pub fn packages(&self) -> &[PackageRecord] {
        &self.packages
    }

    pub fn get(&self, id: &str) -> Option<&PackageRecord> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Local>> {
        self.refreshed_wall
    }

    pub fn is_stale(&self, expiration: Duration) -> bool {
        match self.refreshed_at {
            None => true,
            Some(_) if self.packages.is_empty() => true,
            Some(at) => at.elapsed() > expiration,
        }
    }

    /// 乐观移除：去掉该 id 并让时间戳失效，下一次刷新一定会执行
    pub fn without(&self, id: &str) -> Self {
        Self {
            packages: self.packages.iter().filter(|p| p.id != id).cloned().collect(),
            refreshed_at: None,
            refreshed_wall: self.refreshed_wall,
            generation: self.generation + 1,
        }
    }

    /// 按排除列表过滤，保留时间戳
    pub fn filtered(&self, exclusions: &[String]) -> Self {
        Self {
            packages: exclusion::apply(&self.packages, exclusions),
            refreshed_at: self.refreshed_at,
            refreshed_wall: self.refreshed_wall,
            generation: self.generation + 1,
        }
    }
}

#[derive(Debug)]
pub struct CacheStore {
    current: RwLock<Arc<Snapshot>>,
    expiration: Duration,
}

impl CacheStore {
    pub fn new(expiration: Duration) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
            expiration,
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_stale(&self) -> bool {
        self.snapshot().is_stale(self.expiration)
    }

    /// 在写锁下由当前快照生成下一个快照并替换
    ///
    /// `f` 应当只做轻量的内存操作，命令执行和解析要在锁外完成。
    pub fn update<F>(&self, f: F) -> Arc<Snapshot>
    where
        F: FnOnce(&Snapshot) -> Snapshot,
    {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(f(&current));
        *current = next.clone();
        next
    }

    /// 同 `update`，但 `f` 返回 None 时保留当前快照不变
    pub fn try_update<F>(&self, f: F) -> Option<Arc<Snapshot>>
    where
        F: FnOnce(&Snapshot) -> Option<Snapshot>,
    {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(f(&current)?);
        *current = next.clone();
        Some(next)
    }
}
