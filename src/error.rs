//! 错误类型
//!
//! 刷新路径上的 `CommandError` 在引擎边界被吸收；升级路径上的
//! `EngineError` 会返回给调用方展示。

use std::time::Duration;

/// 外部命令执行失败
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// 进程无法启动
    #[error("无法启动命令 `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// 超时，进程已被终止
    #[error("命令 `{command}` 超时 ({timeout:?})")]
    Timeout { command: String, timeout: Duration },
    /// 进程向 stderr 写了内容，即使 stdout 看起来正常也视为失败
    #[error("{message}")]
    Stderr { command: String, message: String },
    /// 读取输出或等待进程时出错
    #[error("命令 `{command}` I/O 错误: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// 升级 / 查询引擎的错误
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("升级 {id} 失败: {source}")]
    UpgradeFailed {
        id: String,
        #[source]
        source: CommandError,
    },
    #[error("升级 {id} 失败: 退出码 {code:?}")]
    UpgradeExit { id: String, code: Option<i32> },
    #[error("缓存中没有可升级的包: {0}")]
    UnknownPackage(String),
    #[error("非法的包标识: {0:?}")]
    InvalidId(String),
    #[error("解析器初始化失败: {0}")]
    Parser(#[from] regex::Error),
}
