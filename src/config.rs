use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// winget 命令行与时间参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// 列出可升级包的命令
    pub list: String,
    /// 升级单个包的命令模板，`{id}` 会被替换为包标识
    pub upgrade: String,
    pub list_timeout_secs: u64,
    pub upgrade_timeout_secs: u64,
    pub cache_expiration_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            list: "winget upgrade".to_string(),
            upgrade: "winget upgrade --id {id} -i".to_string(),
            list_timeout_secs: 10,
            upgrade_timeout_secs: 30 * 60,
            cache_expiration_secs: 15 * 60,
        }
    }
}

impl CommandsConfig {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn upgrade_timeout(&self) -> Duration {
        Duration::from_secs(self.upgrade_timeout_secs)
    }

    pub fn cache_expiration(&self) -> Duration {
        Duration::from_secs(self.cache_expiration_secs)
    }

    pub fn upgrade_command(&self, id: &str) -> String {
        self.upgrade.replace("{id}", id)
    }
}

/// 用户设置：是否显示“全部升级”，以及排除列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub upgrade_all_enabled: bool,
    /// 名称或 id 中包含其中任一项（不区分大小写）的包不显示
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub commands: CommandsConfig,
    pub settings: Settings,
}

/// 默认配置文件路径 `~/.config/winget-upgrader/config.toml`
pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/winget-upgrader/config.toml")
}

impl Config {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }
}
