//! 包管理器模块 — 对 winget 命令行的封装

pub mod parser;
pub mod runner;
pub mod types;

pub use runner::{CommandRunner, ShellRunner};
pub use types::{CommandOutput, PackageRecord};

use crate::config::CommandsConfig;
use crate::error::{CommandError, EngineError};
use parser::UpgradeTableParser;
use std::sync::Arc;

/// 命令行要经过 shell，id 只允许这些字符
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
}

#[derive(Clone)]
pub struct PackageManager {
    runner: Arc<dyn CommandRunner>,
    parser: UpgradeTableParser,
    commands: CommandsConfig,
}

impl PackageManager {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        commands: CommandsConfig,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            runner,
            parser: UpgradeTableParser::new()?,
            commands,
        })
    }

    pub fn commands(&self) -> &CommandsConfig {
        &self.commands
    }

    /// 执行列表命令并解析出可升级的包
    pub async fn list_upgradable(&self) -> Result<Vec<PackageRecord>, CommandError> {
        let output = self
            .runner
            .run(&self.commands.list, self.commands.list_timeout())
            .await?;
        Ok(self.parser.parse(&output.stdout))
    }

    /// 升级指定 id 的包；命令失败或退出码非零都视为失败
    pub async fn upgrade(&self, id: &str) -> Result<CommandOutput, EngineError> {
        if !is_safe_id(id) {
            return Err(EngineError::InvalidId(id.to_string()));
        }

        let command = self.commands.upgrade_command(id);
        log::info!("执行升级: {}", command);
        let output = self
            .runner
            .run(&command, self.commands.upgrade_timeout())
            .await
            .map_err(|source| EngineError::UpgradeFailed {
                id: id.to_string(),
                source,
            })?;

        if !output.success() {
            return Err(EngineError::UpgradeExit {
                id: id.to_string(),
                code: output.exit_code,
            });
        }
        Ok(output)
    }
}
