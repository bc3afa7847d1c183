//! 查询结果：把缓存快照渲染成供宿主展示的条目

use crate::cache::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeAction {
    UpgradeOne(String),
    UpgradeAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub title: String,
    pub subtitle: String,
    /// None 表示纯提示条目，选中后什么也不做
    pub action: Option<UpgradeAction>,
}

impl QueryResult {
    fn no_updates() -> Self {
        Self {
            title: "No updates available".to_string(),
            subtitle: "All applications are up-to-date.".to_string(),
            action: None,
        }
    }

    fn upgrade_all() -> Self {
        Self {
            title: "Upgrade All Applications".to_string(),
            subtitle: "Upgrade all apps listed below.".to_string(),
            action: Some(UpgradeAction::UpgradeAll),
        }
    }
}

/// 按名称过滤（不区分大小写的子串匹配，空过滤返回全部）
pub fn build_results(
    snapshot: &Snapshot,
    filter: &str,
    upgrade_all_enabled: bool,
) -> Vec<QueryResult> {
    if snapshot.is_empty() {
        return vec![QueryResult::no_updates()];
    }

    let filter = filter.trim().to_lowercase();
    let mut results = Vec::new();
    if upgrade_all_enabled {
        results.push(QueryResult::upgrade_all());
    }

    results.extend(
        snapshot
            .packages()
            .iter()
            .filter(|p| filter.is_empty() || p.name.to_lowercase().contains(&filter))
            .map(|p| QueryResult {
                title: format!("Upgrade {}", p.name),
                subtitle: format!("From {} to {}", p.installed_version, p.available_version),
                action: Some(UpgradeAction::UpgradeOne(p.id.clone())),
            }),
    );

    results
}
