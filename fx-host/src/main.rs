//! fx-host 命令行入口
//!
//! 在模拟时钟上 headless 播放画廊动画，输出播放汇总。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use fx_host::{AnimationRegistry, AppConfig, HeadlessPlayer, PlayOptions, logging};

#[derive(Debug, Parser)]
#[command(name = "fx-host", version, about = "视觉效果画廊 headless 播放器")]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = "fx.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 列出已注册的动画
    List {
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 播放动画并输出汇总
    Play {
        /// 动画标识；省略时使用配置中的 default_animation
        id: Option<String>,

        /// 模拟时钟帧率（覆盖配置）
        #[arg(long)]
        fps: Option<u32>,

        /// 在指定秒数取消播放
        #[arg(long, value_name = "SECS")]
        cancel_at: Option<f32>,

        /// 以 JSON 输出汇总
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fx-host error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config);
    logging::init(&config.logging);
    config.validate().context("配置无效")?;

    let registry = AnimationRegistry::builtin();

    match cli.command {
        Command::List { json } => {
            let listing = registry.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                for info in &listing {
                    let mark = if info.deferred { " (延迟加载)" } else { "" };
                    println!("{:<16} {}{mark}", info.id, info.title);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Play {
            id,
            fps,
            cancel_at,
            json,
        } => {
            let id = id.unwrap_or_else(|| config.default_animation.clone());
            let mut options = PlayOptions::from_config(&config);
            if let Some(fps) = fps {
                options = options.with_fps(fps);
            }
            if let Some(at) = cancel_at {
                options = options.cancel_at(at);
            }

            let player = HeadlessPlayer::new(registry, options);
            let summary = player
                .play(&id)
                .with_context(|| format!("无法播放 '{id}'"))?;
            info!(animation = %id, outcome = ?summary.outcome, "播放结束");

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
            }

            let ok = summary.is_clean()
                && (summary.outcome.is_completed() || cancel_at.is_some());
            Ok(if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
    }
}
