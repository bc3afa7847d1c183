//! `winget upgrade` 输出解析
//!
//! winget 的输出不是结构化格式，而是靠空格补齐的定宽表格：
//!
//! ```text
//! Name                 Id                        Version  Available  Source
//! ---------------------------------------------------------------------------
//! Slack Technologies   SlackTechnologies.Slack   4.29     4.36       winget
//! Microsoft Edge       Microsoft.Edge            120.0    121.0      winget
//! 2 upgrades available
//! ```
//!
//! 表头之前还有进度条和 `\r` 刷新的转圈字符，表格之后是一行汇总。

use super::types::PackageRecord;
use regex::Regex;
use std::time::{Duration, Instant};

/// 单行匹配的时间预算
pub const DEFAULT_MATCH_BUDGET: Duration = Duration::from_millis(500);

/// 超过该长度的行直接跳过
pub const MAX_LINE_CHARS: usize = 4096;

const ROW_PATTERN: &str = r"^(.+?)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)$";

/// 某一行没有被解析为包的原因（只记日志，不作为错误向上传递）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooLong,
    BudgetExceeded,
    NoMatch,
    /// id 列既不含 `.` 也不含 `-`，多半是名称折行后截断出来的单词
    SuspiciousId,
}

/// 清理单行中的 ANSI 转义序列和控制字符
pub fn strip_control_sequences(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    for next in chars.by_ref() {
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            '\t' => result.push(' '),
            c if c.is_control() => {}
            _ => result.push(c),
        }
    }

    result
}

/// 分隔线：整行（去掉行尾空白后）只由 `-` 组成
///
/// 行首有空格的不算，winget 的转圈动画会输出 `"  - "` 这样的帧。
pub fn is_divider(line: &str) -> bool {
    let trimmed = line.trim_end();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '-')
}

/// id 形状检查，只是“这一行解析对了”的近似判断
pub fn looks_like_id(id: &str) -> bool {
    id.contains('.') || id.contains('-')
}

#[derive(Debug, Clone)]
pub struct UpgradeTableParser {
    row: Regex,
    budget: Duration,
}

impl UpgradeTableParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            row: Regex::new(ROW_PATTERN)?,
            budget: DEFAULT_MATCH_BUDGET,
        })
    }

    #[allow(dead_code)]
    pub fn with_match_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// 把原始输出解析为包列表；找不到分隔线时返回空列表
    pub fn parse(&self, raw: &str) -> Vec<PackageRecord> {
        let lines: Vec<String> = raw
            .split(&['\r', '\n'][..])
            .map(strip_control_sequences)
            .filter(|line| !line.trim().is_empty())
            .collect();

        let Some(divider) = lines.iter().position(|line| is_divider(line)) else {
            log::debug!("winget 输出中没有找到分隔线，视为没有可升级的包");
            return Vec::new();
        };

        // 最后一行是汇总（“N upgrades available”），不参与解析
        let end = lines.len() - 1;
        if end <= divider {
            return Vec::new();
        }

        let mut packages = Vec::new();
        for line in &lines[divider + 1..end] {
            match self.parse_row(line) {
                Ok(record) => packages.push(record),
                Err(reason) => log::trace!("跳过行 ({:?}): {}", reason, line),
            }
        }

        log::debug!("解析出 {} 个可升级的包", packages.len());
        packages
    }

    /// 解析表格中的一行
    pub fn parse_row(&self, line: &str) -> Result<PackageRecord, SkipReason> {
        let line = line.trim();
        if line.chars().count() > MAX_LINE_CHARS {
            return Err(SkipReason::TooLong);
        }

        let started = Instant::now();
        let captures = self.row.captures(line);
        if started.elapsed() >= self.budget {
            return Err(SkipReason::BudgetExceeded);
        }
        let captures = captures.ok_or(SkipReason::NoMatch)?;

        let id = &captures[2];
        if !looks_like_id(id) {
            return Err(SkipReason::SuspiciousId);
        }

        Ok(PackageRecord {
            name: captures[1].trim().to_string(),
            id: id.to_string(),
            installed_version: captures[3].to_string(),
            available_version: captures[4].to_string(),
            source: captures[5].to_string(),
        })
    }
}
