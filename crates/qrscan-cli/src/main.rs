use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qrscan_core::{replay_and_write, ReplayScript, ScannerOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "qrscan", version, about = "扫码覆盖层会话回放")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 回放脚本化的扫码会话并生成报告
    Replay {
        /// 会话脚本（TOML）
        #[arg(long)]
        script: PathBuf,

        /// 输出文件（JSON 数组，每步一项）
        #[arg(long, default_value = "./report.json")]
        output: PathBuf,

        /// 配置文件路径（TOML，`[scanner]` 表）
        #[arg(long)]
        config: Option<PathBuf>,

        /// 暂停前的防抖延迟（毫秒），覆盖配置文件
        #[arg(long)]
        pause_delay_ms: Option<u64>,

        /// 识别到码后不自动暂停
        #[arg(long)]
        no_pause: bool,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { script, output, config, pause_delay_ms, no_pause } => {
            info!(?script, ?output, "starting replay");

            // 配置：文件 → 命令行覆盖
            let mut opts = match &config {
                Some(path) => ScannerOptions::load(path)?,
                None => ScannerOptions::default(),
            };
            if let Some(ms) = pause_delay_ms { opts.pause_delay = Duration::from_millis(ms); }
            if no_pause { opts.pause_on_detect = false; }

            let script = ReplayScript::load(&script)?;
            let mut out = BufWriter::new(File::create(&output).context("create output file")?);
            let stats = replay_and_write(&script, &mut out, &opts).context("replay failed")?;
            out.flush().context("flush output file")?;

            info!(
                steps = stats.steps,
                frames_delivered = stats.frames_delivered,
                frames_dropped = stats.frames_dropped,
                pauses_applied = stats.controller.pauses_applied,
                resumes = stats.controller.resumes,
                "replay finished"
            );
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级，如：RUST_LOG=debug
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
