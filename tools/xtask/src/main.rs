//! # xtask - 开发辅助工具
//!
//! 提供本地质量门禁与开发辅助命令。
//!
//! ## 命令
//!
//! - `check-all`: 运行 fmt、clippy、test
//! - `cov-runtime`: 运行 fx-runtime 覆盖率
//! - `cov-workspace`: 运行 workspace 覆盖率
//! - `anim-check`: headless 播放全部内置动画，检查完成情况与资源泄漏

use std::process::{Command, ExitCode};

use fx_host::{AnimationRegistry, HeadlessPlayer, PlayOptions, PlaySummary};

fn run(step: &str, cmd: &mut Command) -> anyhow::Result<()> {
    eprintln!("\n==> {step}");
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("{step} failed with {status}");
    }
    Ok(())
}

fn ensure_cargo_llvm_cov_available() -> anyhow::Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.args(["llvm-cov", "--version"]);
    let status = cmd.status();
    match status {
        Ok(s) if s.success() => Ok(()),
        _ => anyhow::bail!(
            "cargo llvm-cov 不可用。\n\
请先安装：\n\
  - cargo install cargo-llvm-cov\n\
  - rustup component add llvm-tools-preview\n\
然后重试。"
        ),
    }
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("xtask error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let sub = args.next().unwrap_or_else(|| "help".to_string());

    match sub.as_str() {
        "check-all" => {
            let mut fmt = Command::new("cargo");
            fmt.args(["fmt", "--all", "--", "--check"]);
            run("cargo fmt --all -- --check", &mut fmt)?;

            let mut clippy = Command::new("cargo");
            clippy.args(["clippy", "--workspace", "--all-targets"]);
            run("cargo clippy --workspace --all-targets", &mut clippy)?;

            let mut test = Command::new("cargo");
            test.args(["test", "--workspace"]);
            run("cargo test --workspace", &mut test)?;
        }
        "cov-runtime" => {
            ensure_cargo_llvm_cov_available()?;

            let mut cov = Command::new("cargo");
            cov.args(["llvm-cov", "-p", "fx-runtime", "--all-features", "--html"]);
            run(
                "cargo llvm-cov -p fx-runtime --all-features --html",
                &mut cov,
            )?;

            eprintln!("\nCoverage HTML: target/llvm-cov/html/index.html");
        }
        "cov-workspace" => {
            ensure_cargo_llvm_cov_available()?;

            // workspace 覆盖率只用于趋势观察，排除 xtask
            let mut cov = Command::new("cargo");
            cov.args([
                "llvm-cov",
                "--workspace",
                "--exclude",
                "xtask",
                "--all-features",
                "--html",
            ]);
            run(
                "cargo llvm-cov --workspace --exclude xtask --all-features --html",
                &mut cov,
            )?;

            eprintln!("\nCoverage HTML: target/llvm-cov/html/index.html");
        }
        "anim-check" => {
            let json = args.any(|a| a == "--json");
            anim_check(json)?;
        }
        "help" | "-h" | "--help" => {
            print_help();
        }
        other => anyhow::bail!("unknown xtask subcommand: {other}"),
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        r#"xtask - 开发辅助工具

USAGE:
  cargo xtask <command>

COMMANDS:
  check-all       运行 fmt、clippy、test 门禁检查
  cov-runtime     运行 fx-runtime 覆盖率报告
  cov-workspace   运行 workspace 覆盖率报告
  anim-check      headless 播放全部内置动画

ANIM-CHECK:
  cargo xtask anim-check [--json]

  使用默认配置在模拟时钟上依次播放注册表中的每个动画。

  检查内容：
    - 动画自然播放完毕
    - 没有结构性或构造失败
    - 场景节点和资源全部释放，没有重复释放

ALIASES (in .cargo/config.toml):
  cargo check-all     -> cargo xtask check-all
  cargo cov-runtime   -> cargo xtask cov-runtime
  cargo cov-workspace -> cargo xtask cov-workspace
  cargo anim-check    -> cargo xtask anim-check
"#
    );
}

//=============================================================================
// anim-check 命令实现
//=============================================================================

/// 单个动画的检查问题
fn problems(summary: &PlaySummary) -> Vec<String> {
    let mut problems = Vec::new();
    if !summary.outcome.is_completed() {
        problems.push(format!("未自然完成: {:?}", summary.outcome));
    }
    if summary.leaked_nodes > 0 || summary.leaked_resources > 0 {
        problems.push(format!(
            "泄漏 {} 个节点 / {} 个资源",
            summary.leaked_nodes, summary.leaked_resources
        ));
    }
    if summary.scene.double_disposals > 0 {
        problems.push(format!("{} 次重复释放", summary.scene.double_disposals));
    }
    problems
}

fn anim_check(json: bool) -> anyhow::Result<()> {
    let player = HeadlessPlayer::new(AnimationRegistry::builtin(), PlayOptions::default());
    eprintln!("==> 播放 {} 个动画...\n", player.registry().len());

    let summaries = player.play_all();
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }

    let mut failed = 0;
    for summary in &summaries {
        let problems = problems(summary);
        let cosmetic = summary.cosmetic_errors();
        if problems.is_empty() {
            eprintln!(
                "[OK]    {:<16} {} 帧, 表现层失败 {}",
                summary.animation, summary.frames, cosmetic
            );
        } else {
            failed += 1;
            eprintln!("[ERROR] {:<16} {}", summary.animation, problems.join("; "));
        }
    }

    eprintln!("─────────────────────────────────────────────────────");
    if failed > 0 {
        eprintln!("❌ {failed} 个动画未通过");
        anyhow::bail!("动画检查发现错误");
    }
    eprintln!("✅ 检查通过，共 {} 个动画", summaries.len());
    Ok(())
}
