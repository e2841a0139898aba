use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::BackgroundError;
use crate::processor::ProcessConfig;

/// 未指定时每个视频随机采样的帧数
pub const DEFAULT_SAMPLE_COUNT: usize = 7;

const INI_SECTION: &str = "video_background";

/// 可能缺失的配置项；命令行、环境变量、配置文件各产生一份，最后按优先级合并
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    pub main_video: Option<PathBuf>,
    pub other_videos: Option<Vec<PathBuf>>,
    pub random_frames_count: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub seed: Option<u64>,
    pub log_level: Option<String>,
}

impl PartialConfig {
    /// 用 `other` 填补自身缺失的字段
    fn or(self, other: PartialConfig) -> PartialConfig {
        PartialConfig {
            main_video: self.main_video.or(other.main_video),
            other_videos: self.other_videos.or(other.other_videos),
            random_frames_count: self.random_frames_count.or(other.random_frames_count),
            output_dir: self.output_dir.or(other.output_dir),
            seed: self.seed.or(other.seed),
            log_level: self.log_level.or(other.log_level),
        }
    }
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load_config(config_file: Option<&Path>, cli: PartialConfig) -> Result<ProcessConfig> {
        // 显式指定的配置文件必须能读取；默认位置找不到则忽略
        let file_config = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations()?.unwrap_or_default(),
        };

        Self::merge(cli, Self::load_from_env(), file_config)
    }

    /// 按优先级合并配置并校验
    pub fn merge(
        cli: PartialConfig,
        env_config: PartialConfig,
        file_config: PartialConfig,
    ) -> Result<ProcessConfig> {
        let merged = cli.or(env_config).or(file_config);

        let main_video = merged.main_video.ok_or_else(|| {
            BackgroundError::InvalidConfig("未指定主视频 (main_video)".to_string())
        })?;

        let random_frames_count = merged.random_frames_count.unwrap_or(DEFAULT_SAMPLE_COUNT);
        if random_frames_count == 0 {
            return Err(BackgroundError::InvalidConfig("采样帧数必须至少为 1".to_string()).into());
        }

        Ok(ProcessConfig {
            main_video,
            other_videos: merged.other_videos.unwrap_or_default(),
            random_frames_count,
            output_dir: merged.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            seed: merged.seed,
            log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }

    /// 从环境变量加载配置
    fn load_from_env() -> PartialConfig {
        PartialConfig {
            main_video: env::var_os("VIDEO_BACKGROUND_MAIN_VIDEO").map(PathBuf::from),
            other_videos: env::var_os("VIDEO_BACKGROUND_OTHER_VIDEOS")
                .map(|paths| env::split_paths(&paths).collect()),
            random_frames_count: env::var("VIDEO_BACKGROUND_SAMPLE_COUNT")
                .ok()
                .and_then(|v| v.parse().ok()),
            output_dir: env::var_os("VIDEO_BACKGROUND_OUTPUT_DIR").map(PathBuf::from),
            seed: env::var("VIDEO_BACKGROUND_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),
            log_level: env::var("LOG_LEVEL").ok(),
        }
    }

    /// 从配置文件加载，`.json` 按 JSON 解析，其余按 INI 解析
    pub fn load_from_file(config_path: &Path) -> Result<PartialConfig> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let is_json = config_path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("读取配置文件失败: {}", config_path.display()))?;
            Self::parse_json(&contents)
                .with_context(|| format!("解析配置文件失败: {}", config_path.display()))
        } else {
            let mut config_parser = configparser::ini::Ini::new();
            config_parser.load(config_path).map_err(|e| {
                anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e)
            })?;
            Ok(Self::from_ini(&config_parser))
        }
    }

    fn parse_json(contents: &str) -> Result<PartialConfig> {
        Ok(serde_json::from_str(contents)?)
    }

    fn from_ini(config_parser: &configparser::ini::Ini) -> PartialConfig {
        // 尝试从 [video_background] 节读取，如果没有则使用 [DEFAULT] 节
        let get = |key: &str| {
            config_parser
                .get(INI_SECTION, key)
                .or_else(|| config_parser.get("DEFAULT", key))
                .filter(|v| !v.trim().is_empty())
        };

        PartialConfig {
            main_video: get("main_video").map(PathBuf::from),
            other_videos: get("other_videos").map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect()
            }),
            random_frames_count: get("random_frames_count").and_then(|v| v.parse().ok()),
            output_dir: get("output_dir").map(PathBuf::from),
            seed: get("seed").and_then(|v| v.parse().ok()),
            log_level: get("log_level"),
        }
    }

    /// 从默认位置加载配置文件，都不存在时返回 `None`
    fn load_from_default_locations() -> Result<Option<PartialConfig>> {
        let mut candidates = vec![
            // 1. 当前目录的 config.json
            PathBuf::from("config.json"),
            // 2. 当前目录的 video-background.ini
            PathBuf::from("video-background.ini"),
            // 3. 当前目录的 .video-background.ini
            PathBuf::from(".video-background.ini"),
        ];
        // 4. 用户主目录的 .video-background.ini
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".video-background.ini"));
        }

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_file(&candidate).map(Some);
            }
        }

        Ok(None)
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let mut config_parser = configparser::ini::Ini::new();
        config_parser.set(INI_SECTION, "main_video", Some("".to_string()));
        config_parser.set(INI_SECTION, "other_videos", Some("".to_string()));
        config_parser.set(
            INI_SECTION,
            "random_frames_count",
            Some(DEFAULT_SAMPLE_COUNT.to_string()),
        );
        config_parser.set(INI_SECTION, "output_dir", Some(".".to_string()));
        config_parser.set(INI_SECTION, "seed", Some("".to_string()));
        config_parser.set(INI_SECTION, "log_level", Some("info".to_string()));

        config_parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}
