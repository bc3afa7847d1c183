//! 刷新协调与升级编排
//!
//! - 同一时间最多只有一个刷新在执行命令和解析；拿到锁后再检查一次是否过期，
//!   排队等锁的调用在前一个刷新完成后直接返回。
//! - 刷新失败只记日志，保留上一代缓存（仍是过期状态），下次触发时重试。
//! - 升级成功后先乐观地从缓存移除该包，再强制刷新一次，以 winget 的实际输出为准。
//!   每次乐观移除都会推进失效纪元；列表命令在最近一次失效之前就已开始的刷新结果
//!   不会被发布，缓存保持过期，排队中的对账刷新一定会重新执行命令。

use crate::cache::{CacheStore, Snapshot};
use crate::error::EngineError;
use crate::exclusion;
use crate::package_manager::{PackageManager, PackageRecord};
use crate::query::{self, QueryResult};
use crate::settings::SharedSettings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// 缓存未过期（或另一个调用刚刷新完），什么也没做
    Fresh,
    Refreshed { count: usize },
    /// 命令执行期间有包被升级，结果已过时，未发布
    Superseded,
    /// 命令失败，缓存保持原样
    Failed,
}

#[derive(Debug, Clone)]
pub struct UpgradeReport {
    pub package: PackageRecord,
    /// 升级后对账刷新的结果
    pub reconcile: RefreshOutcome,
}

#[derive(Debug, Default)]
pub struct UpgradeAllReport {
    pub upgraded: Vec<UpgradeReport>,
    pub failed: Vec<(PackageRecord, EngineError)>,
}

pub struct UpgradeEngine {
    manager: PackageManager,
    store: CacheStore,
    settings: Arc<SharedSettings>,
    refresh_lock: Mutex<()>,
    /// 只在 store 写锁内修改和比较
    invalidation: AtomicU64,
}

impl UpgradeEngine {
    pub fn new(manager: PackageManager, settings: Arc<SharedSettings>) -> Self {
        let expiration = manager.commands().cache_expiration();
        Self {
            manager,
            store: CacheStore::new(expiration),
            settings,
            refresh_lock: Mutex::new(()),
            invalidation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    pub fn is_stale(&self) -> bool {
        self.store.is_stale()
    }

    pub fn settings(&self) -> &Arc<SharedSettings> {
        &self.settings
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        if !self.store.is_stale() {
            return RefreshOutcome::Fresh;
        }
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// 调用方必须持有 `refresh_lock`
    async fn refresh_locked(&self) -> RefreshOutcome {
        if !self.store.is_stale() {
            log::debug!("等待期间缓存已被刷新，跳过");
            return RefreshOutcome::Fresh;
        }

        let started = self.invalidation.load(Ordering::SeqCst);
        match self.manager.list_upgradable().await {
            Ok(records) => {
                let published = self.store.try_update(|current| {
                    if self.invalidation.load(Ordering::SeqCst) != started {
                        return None;
                    }
                    let exclusions = self.settings.exclusions();
                    Some(Snapshot::populated(
                        exclusion::apply(&records, &exclusions),
                        current.generation() + 1,
                    ))
                });
                let Some(snapshot) = published else {
                    log::debug!("刷新期间有包完成升级，丢弃本次结果");
                    return RefreshOutcome::Superseded;
                };
                log::info!(
                    "可升级列表已刷新: {} 个包（解析 {} 个，第 {} 代）",
                    snapshot.len(),
                    records.len(),
                    snapshot.generation()
                );
                RefreshOutcome::Refreshed {
                    count: snapshot.len(),
                }
            }
            Err(e) => {
                log::warn!("刷新可升级列表失败，保留旧缓存: {}", e);
                RefreshOutcome::Failed
            }
        }
    }

    /// 查询前调用
    ///
    /// 缓存为空时只能等刷新；缓存有内容但已过期、且已有刷新在进行时，
    /// 直接使用上一代数据，不排队等锁。
    pub async fn ensure_fresh(&self) {
        if !self.store.is_stale() {
            return;
        }
        if self.store.snapshot().is_empty() {
            self.refresh().await;
            return;
        }
        match self.refresh_lock.try_lock() {
            Ok(_guard) => {
                self.refresh_locked().await;
            }
            Err(_) => log::debug!("刷新进行中，返回上一代缓存"),
        }
    }

    /// 用当前排除列表重新过滤现有缓存，不触发刷新
    pub fn apply_exclusions(&self) -> Arc<Snapshot> {
        self.store
            .update(|current| current.filtered(&self.settings.exclusions()))
    }

    /// 后台刷新（启动时调用）
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<RefreshOutcome> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.refresh().await })
    }

    /// 设置变化时立即重新过滤；引擎被释放后任务自动结束
    pub fn spawn_exclusion_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.settings.subscribe();
        let engine: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let snapshot = engine.apply_exclusions();
                log::debug!("设置已变更，重新过滤后剩余 {} 个包", snapshot.len());
            }
        })
    }

    pub async fn list_upgradable(&self, filter: &str) -> Vec<QueryResult> {
        self.ensure_fresh().await;
        query::build_results(
            &self.store.snapshot(),
            filter,
            self.settings.upgrade_all_enabled(),
        )
    }

    pub async fn upgrade(&self, package: &PackageRecord) -> Result<UpgradeReport, EngineError> {
        log::info!("准备升级 {}，可能需要一些时间...", package.name);

        if let Err(e) = self.manager.upgrade(&package.id).await {
            log::warn!("{}", e);
            return Err(e);
        }

        self.store.update(|current| {
            self.invalidation.fetch_add(1, Ordering::SeqCst);
            current.without(&package.id)
        });
        log::info!("{} 升级完成，刷新列表对账", package.id);

        let reconcile = self.refresh().await;
        Ok(UpgradeReport {
            package: package.clone(),
            reconcile,
        })
    }

    pub async fn upgrade_one(&self, id: &str) -> Result<UpgradeReport, EngineError> {
        self.ensure_fresh().await;
        let package = self
            .store
            .snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownPackage(id.to_string()))?;
        self.upgrade(&package).await
    }

    /// 依次升级调用时缓存中的全部包，单个失败不影响后续
    pub async fn upgrade_all(&self) -> UpgradeAllReport {
        self.ensure_fresh().await;
        let snapshot = self.store.snapshot();

        let mut report = UpgradeAllReport::default();
        for package in snapshot.packages() {
            match self.upgrade(package).await {
                Ok(upgraded) => report.upgraded.push(upgraded),
                Err(e) => report.failed.push((package.clone(), e)),
            }
        }
        report
    }
}
