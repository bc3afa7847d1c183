//! 外部命令执行（带超时）

use super::types::CommandOutput;
use crate::error::CommandError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// 执行一条命令行并返回其输出
///
/// 实现必须在 `timeout` 内返回：超时后终止进程并返回 `CommandError::Timeout`。
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command_line: &str, timeout: Duration)
        -> Result<CommandOutput, CommandError>;
}

/// 通过系统 shell 执行命令：Windows 上是 `cmd /C`，其他平台是 `sh -c`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    program: String,
    flag: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("sh", "-c")
        }
    }
}

impl ShellRunner {
    pub fn with_shell(program: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            flag: flag.into(),
        }
    }

    fn build_command(&self, command_line: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.flag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            // cmd.exe 自己解析引号，原样传递
            cmd.raw_arg(command_line);
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        #[cfg(not(windows))]
        cmd.arg(command_line);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                // 独立进程组，超时时连同 shell 派生的子进程一起杀掉
                libc::setpgid(0, 0);
                #[cfg(target_os = "linux")]
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        cmd
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command_line: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let mut child = self
            .build_command(command_line)
            .spawn()
            .map_err(|source| CommandError::Launch {
                command: command_line.to_string(),
                source,
            })?;
        let pid = child.id();

        let io_error = |source: std::io::Error| CommandError::Io {
            command: command_line.to_string(),
            source,
        };
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error(std::io::Error::other("stdout 未被重定向")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error(std::io::Error::other("stderr 未被重定向")))?;

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (read_out, read_err) =
                tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            read_out?;
            read_err?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let waited = tokio::time::timeout(timeout, collect).await;
        let (status, out, err) = match waited {
            Ok(result) => result.map_err(io_error)?,
            Err(_) => {
                log::warn!("命令超时 ({:?})，终止进程: {}", timeout, command_line);
                kill_process_tree(pid).await;
                let _ = child.kill().await;
                return Err(CommandError::Timeout {
                    command: command_line.to_string(),
                    timeout,
                });
            }
        };

        if !err.is_empty() {
            return Err(CommandError::Stderr {
                command: command_line.to_string(),
                message: String::from_utf8_lossy(&err).trim().to_string(),
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out).to_string(),
            exit_code: status.code(),
        })
    }
}

/// 杀掉 shell 及其派生的全部子进程（winget、安装程序）
#[cfg(unix)]
async fn kill_process_tree(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

/// 没有进程组可用，交给 `taskkill /T` 沿父子关系逐个终止；必须在 shell 退出前调用
#[cfg(windows)]
async fn kill_process_tree(pid: Option<u32>) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    let Some(pid) = pid else {
        return;
    };
    let result = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()
        .await;
    if let Err(e) = result {
        log::warn!("taskkill 执行失败 (pid {}): {}", pid, e);
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_process_tree(_pid: Option<u32>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let output = ShellRunner::default()
            .run("printf 'hello\\nworld\\n'", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(output.stdout, "hello\nworld\n");
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let output = ShellRunner::default()
            .run("exit 3", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_any_stderr_output_is_failure() {
        let err = ShellRunner::default()
            .run("echo ok; echo 'source agreement' >&2", Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            CommandError::Stderr { message, .. } => assert_eq!(message, "source agreement"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let started = std::time::Instant::now();
        let err = ShellRunner::default()
            .run("sleep 10", Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_grandchild() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");
        let command_line = format!("sh -c 'sleep 1; touch {}'", marker.display());

        let err = ShellRunner::default()
            .run(&command_line, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_shell_is_launch_failure() {
        let err = ShellRunner::with_shell("/nonexistent/shell", "-c")
            .run("true", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Launch { .. }));
    }
}
