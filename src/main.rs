use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Level;
use video_background::{config::ConfigLoader, process_videos, PartialConfig};

/// 视频背景替换工具 - 用中值采样估计静态背景，并替换到其他视频中
#[derive(Parser, Debug)]
#[command(name = "video-background")]
#[command(about = "视频背景替换工具：估计主视频背景，替换到其他视频中", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 处理主视频与次要视频
    Process {
        /// 配置文件路径（可选，支持 .json 和 .ini 格式）
        /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
        #[arg(long)]
        config: Option<PathBuf>,

        /// 提供背景的主视频
        /// 可通过环境变量 VIDEO_BACKGROUND_MAIN_VIDEO 或配置文件设置
        #[arg(short, long)]
        main_video: Option<PathBuf>,

        /// 需要替换背景的视频，可重复指定
        #[arg(long = "other")]
        other_videos: Vec<PathBuf>,

        /// 每个视频随机采样的帧数
        /// 可通过环境变量 VIDEO_BACKGROUND_SAMPLE_COUNT 或配置文件设置
        #[arg(short, long)]
        samples: Option<usize>,

        /// 输出目录
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 随机种子，用于复现采样结果
        #[arg(long)]
        seed: Option<u64>,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 配置文件路径
        #[arg(default_value = "video-background.ini")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Process {
            config: config_file,
            main_video,
            other_videos,
            samples,
            output,
            seed,
        } => {
            let cli = PartialConfig {
                main_video,
                other_videos: (!other_videos.is_empty()).then_some(other_videos),
                random_frames_count: samples,
                output_dir: output,
                seed,
                log_level: None,
            };
            let config = ConfigLoader::load_config(config_file.as_deref(), cli)
                .context("加载配置失败")?;

            // 初始化日志
            let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
            tracing_subscriber::fmt().with_max_level(level).init();

            let output = process_videos(&config).context("处理视频失败")?;

            let failed = output.failed_count();
            if failed > 0 {
                anyhow::bail!("{} 个视频处理失败，详见 summary.json", failed);
            }
        }
        Commands::InitConfig { path } => {
            ConfigLoader::create_default_config(&path)?;
            println!("已生成配置文件: {}", path.display());
        }
    }

    Ok(())
}
