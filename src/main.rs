mod cache;
mod config;
mod engine;
mod error;
mod exclusion;
mod package_manager;
mod query;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use engine::{UpgradeAllReport, UpgradeEngine};
use package_manager::{PackageManager, ShellRunner};
use query::{QueryResult, UpgradeAction};
use settings::SharedSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "winget-upgrader", version, about = "列出并升级 winget 中可升级的应用")]
struct Cli {
    /// 配置文件路径，默认 ~/.config/winget-upgrader/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 列出可升级的应用（按名称过滤）
    List {
        filter: Vec<String>,
        /// 以 JSON 输出包记录
        #[arg(long)]
        json: bool,
    },
    /// 升级指定 id 的应用
    Upgrade { id: String },
    /// 升级全部可升级的应用
    UpgradeAll,
    /// 管理排除列表
    Exclude {
        #[command(subcommand)]
        action: ExcludeAction,
    },
    /// 交互模式：输入文字即查询，`:help` 查看命令
    Shell,
}

#[derive(Debug, Subcommand)]
enum ExcludeAction {
    Add { term: String },
    Remove { term: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = Config::load_or_default(&config_path)?;

    let settings = Arc::new(SharedSettings::new(config.settings.clone()));
    let manager = PackageManager::new(Arc::new(ShellRunner::default()), config.commands.clone())?;
    let engine = Arc::new(UpgradeEngine::new(manager, settings.clone()));

    match cli.command {
        Commands::List { filter, json } => {
            let filter = filter.join(" ");
            if json {
                engine.ensure_fresh().await;
                let snapshot = engine.snapshot();
                let needle = filter.trim().to_lowercase();
                let packages: Vec<_> = snapshot
                    .packages()
                    .iter()
                    .filter(|p| needle.is_empty() || p.name.to_lowercase().contains(&needle))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&packages)?);
            } else {
                print_results(&engine.list_upgradable(&filter).await);
            }
        }
        Commands::Upgrade { id } => {
            println!("Preparing to update {}... This may take a moment.", id);
            match engine.upgrade_one(&id).await {
                Ok(report) => println!("已升级 {}（对账: {:?}）", report.package.name, report.reconcile),
                Err(e) => {
                    eprintln!("Upgrade failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::UpgradeAll => {
            let report = engine.upgrade_all().await;
            print_upgrade_all(&report);
            if !report.failed.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Exclude { action } => {
            let changed = match action {
                ExcludeAction::Add { term } => settings.add_exclusion(&term),
                ExcludeAction::Remove { term } => settings.remove_exclusion(&term),
                ExcludeAction::List => {
                    for term in settings.exclusions() {
                        println!("{}", term);
                    }
                    false
                }
            };
            if changed {
                save_settings(&config, &config_path, &settings)?;
            }
        }
        Commands::Shell => run_shell(engine, config, config_path).await?,
    }

    Ok(())
}

fn save_settings(config: &Config, path: &std::path::Path, settings: &SharedSettings) -> Result<()> {
    let mut config = config.clone();
    config.settings = settings.current();
    config.save(path)?;
    log::info!("设置已保存到 {}", path.display());
    Ok(())
}

fn print_results(results: &[QueryResult]) {
    for result in results {
        match &result.action {
            Some(UpgradeAction::UpgradeOne(id)) => {
                println!("{}  [{}]\n    {}", result.title, id, result.subtitle)
            }
            Some(UpgradeAction::UpgradeAll) => {
                println!("{}  [:all]\n    {}", result.title, result.subtitle)
            }
            None => println!("{}\n    {}", result.title, result.subtitle),
        }
    }
}

fn print_upgrade_all(report: &UpgradeAllReport) {
    for upgraded in &report.upgraded {
        println!("已升级 {}", upgraded.package.name);
    }
    for (package, e) in &report.failed {
        eprintln!("Upgrade failed: {} ({})", e, package.name);
    }
}

const SHELL_HELP: &str = "\
<文字>             按名称过滤可升级的应用（空行列出全部）
:upgrade <id>      后台升级指定应用
:all               后台升级全部应用
:exclude <词>      添加排除项
:include <词>      移除排除项
:upgrade-all on|off  显示 / 隐藏“全部升级”条目
:refresh           查看缓存状态
:quit              退出";

/// 交互模式：引擎常驻，启动时后台刷新，升级在后台任务中执行
async fn run_shell(engine: Arc<UpgradeEngine>, config: Config, config_path: PathBuf) -> Result<()> {
    engine.spawn_refresh();
    engine.spawn_exclusion_watcher();
    println!("输入 :help 查看命令");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = match line.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            ":quit" | ":q" => break,
            ":help" => println!("{}", SHELL_HELP),
            ":upgrade" if !arg.is_empty() => {
                let engine = Arc::clone(&engine);
                let id = arg.to_string();
                println!("Preparing to update {}... This may take a moment.", id);
                tokio::spawn(async move {
                    match engine.upgrade_one(&id).await {
                        Ok(report) => println!("已升级 {}", report.package.name),
                        Err(e) => eprintln!("Upgrade failed: {}", e),
                    }
                });
            }
            ":all" => {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    print_upgrade_all(&engine.upgrade_all().await);
                });
            }
            ":exclude" | ":include" | ":upgrade-all" => {
                let settings = engine.settings();
                let changed = match (command, arg) {
                    (":exclude", term) => settings.add_exclusion(term),
                    (":include", term) => settings.remove_exclusion(term),
                    (_, "on") => settings.set_upgrade_all(true),
                    (_, "off") => settings.set_upgrade_all(false),
                    _ => {
                        println!("{}", SHELL_HELP);
                        false
                    }
                };
                if changed {
                    save_settings(&config, &config_path, settings)?;
                }
            }
            ":refresh" => {
                let outcome = engine.refresh().await;
                let snapshot = engine.snapshot();
                let refreshed = snapshot
                    .refreshed_at()
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "从未".to_string());
                println!(
                    "{:?}: {} 个包，刷新于 {}，第 {} 代{}",
                    outcome,
                    snapshot.len(),
                    refreshed,
                    snapshot.generation(),
                    if engine.is_stale() { "（已过期）" } else { "" }
                );
            }
            _ if command.starts_with(':') => println!("{}", SHELL_HELP),
            _ => print_results(&engine.list_upgradable(line).await),
        }
    }

    Ok(())
}
