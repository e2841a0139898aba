use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 单个次要视频的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VideoStatus {
    Succeeded {
        /// 写入输出视频的帧数
        frames: u64,
    },
    Failed {
        /// 失败的阶段
        stage: Stage,
        /// 错误信息
        error: String,
    },
}

/// 次要视频的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Open,
    EstimateBackground,
    Replace,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Open => "打开视频",
            Stage::EstimateBackground => "估计背景",
            Stage::Replace => "替换背景",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOutcome {
    /// 在 other_videos 中的序号（从 0 开始）
    pub index: usize,
    pub input_video: PathBuf,
    pub output_video: PathBuf,
    #[serde(flatten)]
    pub status: VideoStatus,
}

impl VideoOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, VideoStatus::Succeeded { .. })
    }
}

/// 写入 summary.json 的整次运行摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub main_video: PathBuf,
    pub random_frames_count: usize,
    pub median_image: PathBuf,
    /// 完成时间（RFC 3339）
    pub timestamp: String,
    pub videos: Vec<VideoOutcome>,
}
