//! winget 相关数据类型定义

use serde::{Deserialize, Serialize};

/// 命令输出结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    /// 被信号终止时为 None
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// `winget upgrade` 表格中的一行：一个可升级的包
///
/// 同一个 `id` 的两条记录视为同一个包在不同时刻的观测结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// 显示名称，可以包含空格
    pub name: String,
    /// 包管理器标识，例如 `Microsoft.Edge`
    pub id: String,
    pub installed_version: String,
    pub available_version: String,
    /// 来源仓库，例如 `winget` / `msstore`
    pub source: String,
}
