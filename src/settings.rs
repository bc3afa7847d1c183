//! 运行期可变的用户设置
//!
//! 设置随时可能被外部修改；每次有效修改都会递增 watch 版本号，
//! 引擎据此立即重新过滤现有缓存。

use crate::config::Settings;
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

#[derive(Debug)]
pub struct SharedSettings {
    state: RwLock<Settings>,
    changed: watch::Sender<u64>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: RwLock::new(settings),
            changed,
        }
    }

    pub fn current(&self) -> Settings {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn exclusions(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .excluded
            .clone()
    }

    pub fn upgrade_all_enabled(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade_all_enabled
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// 添加排除项；空字符串或已存在（不区分大小写）时返回 false
    pub fn add_exclusion(&self, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() {
            return false;
        }
        let added = self.modify(|s| {
            if s.excluded.iter().any(|e| e.eq_ignore_ascii_case(term)) {
                false
            } else {
                s.excluded.push(term.to_string());
                true
            }
        });
        if added {
            log::info!("添加排除项: {}", term);
        }
        added
    }

    pub fn remove_exclusion(&self, term: &str) -> bool {
        let term = term.trim();
        let removed = self.modify(|s| {
            let before = s.excluded.len();
            s.excluded.retain(|e| !e.eq_ignore_ascii_case(term));
            s.excluded.len() != before
        });
        if removed {
            log::info!("移除排除项: {}", term);
        }
        removed
    }

    pub fn set_upgrade_all(&self, enabled: bool) -> bool {
        self.modify(|s| {
            let changed = s.upgrade_all_enabled != enabled;
            s.upgrade_all_enabled = enabled;
            changed
        })
    }

    /// 先写设置再通知，收到通知的一方一定能读到新值
    fn modify<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Settings) -> bool,
    {
        let changed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut state)
        };
        if changed {
            self.changed.send_modify(|version| *version += 1);
        }
        changed
    }
}
