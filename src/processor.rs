use anyhow::{Context, Result};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::background::estimate_background;
use crate::error::ensure_same_dimensions;
use crate::media::{MediaBackend, VideoSink, VideoSource};
use crate::metadata::{RunSummary, Stage, VideoOutcome, VideoStatus};
use crate::replacer::{replace_foreground, OUTPUT_FPS};
use crate::video_processor::VideoProcessor;
use crate::video_writer::VideoWriter;

/// 主视频背景图的文件名
pub const MEDIAN_IMAGE_FILE: &str = "first_video_median_image.jpg";
/// 运行摘要的文件名
pub const SUMMARY_FILE: &str = "summary.json";

/// 背景替换配置
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessConfig {
    /// 提供背景的主视频
    pub main_video: PathBuf,
    /// 需要替换背景的视频
    pub other_videos: Vec<PathBuf>,
    /// 每个视频随机采样的帧数
    pub random_frames_count: usize,
    /// 输出目录
    pub output_dir: PathBuf,
    /// 随机种子（未设置时每次运行结果可能不同）
    pub seed: Option<u64>,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl ProcessConfig {
    /// 第 `index` 个次要视频的输出路径
    pub fn output_video_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(format!("video_{}.avi", index))
    }
}

/// 处理结果
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// 输出目录
    pub output_dir: PathBuf,
    /// 主视频背景图
    pub median_image: PathBuf,
    /// 每个次要视频的处理结果，顺序与 other_videos 一致
    pub videos: Vec<VideoOutcome>,
}

impl ProcessOutput {
    pub fn failed_count(&self) -> usize {
        self.videos.iter().filter(|v| !v.succeeded()).count()
    }
}

/// 基于 FFmpeg 的媒体后端
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
        Ok(Box::new(VideoProcessor::open(path)?))
    }

    fn create_sink(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoSink>> {
        Ok(Box::new(VideoWriter::create(path, width, height, fps)?))
    }
}

/// 使用 FFmpeg 处理配置中的全部视频
pub fn process_videos(config: &ProcessConfig) -> Result<ProcessOutput> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    process_videos_with(&FfmpegBackend, config, &mut rng)
}

/// 估计主视频背景，并将其替换到每个次要视频中
///
/// 主视频的任何失败都会中止整个流程；单个次要视频的失败只记录在结果中，
/// 不影响其他视频，且不会留下不完整的输出文件。
pub fn process_videos_with<B: MediaBackend, R: Rng>(
    backend: &B,
    config: &ProcessConfig,
    rng: &mut R,
) -> Result<ProcessOutput> {
    let total_start = Instant::now();
    info!("🎬 [背景替换] 主视频: {}", config.main_video.display());
    info!("  • 次要视频: {} 个", config.other_videos.len());
    info!("  • 采样帧数: {}", config.random_frames_count);

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("创建输出目录失败: {}", config.output_dir.display()))?;

    // 1. 估计主视频背景
    let primary_start = Instant::now();
    info!("⏳ [背景替换] 正在估计主视频背景...");
    let primary_background = {
        let mut source = backend
            .open_source(&config.main_video)
            .context("打开主视频失败")?;
        estimate_background(source.as_mut(), config.random_frames_count, rng)
            .context("估计主视频背景失败")?
    };
    info!(
        "✅ [背景替换] 主视频背景估计完成，耗时: {:.2}秒",
        primary_start.elapsed().as_secs_f64()
    );

    // 2. 保存主视频背景图
    let median_image = config.output_dir.join(MEDIAN_IMAGE_FILE);
    primary_background
        .save(&median_image)
        .with_context(|| format!("保存背景图失败: {}", median_image.display()))?;
    info!("💾 [背景替换] 已保存背景图: {}", median_image.display());

    // 3. 逐个处理次要视频
    let mut videos = Vec::with_capacity(config.other_videos.len());
    for (index, input_video) in config.other_videos.iter().enumerate() {
        let output_video = config.output_video_path(index);
        info!(
            "** [背景替换] 正在替换视频 #{} 的背景: {}",
            index,
            input_video.display()
        );

        let video_start = Instant::now();
        let status = match substitute_background(
            backend,
            input_video,
            &output_video,
            &primary_background,
            config.random_frames_count,
            rng,
        ) {
            Ok(frames) => {
                info!(
                    "✅ [背景替换] 视频 #{} 完成: {} 帧，耗时: {:.2}秒 -> {}",
                    index,
                    frames,
                    video_start.elapsed().as_secs_f64(),
                    output_video.display()
                );
                VideoStatus::Succeeded { frames }
            }
            Err((stage, e)) => {
                error!(
                    "❌ [背景替换] 视频 #{} ({}) 在「{}」阶段失败: {:#}",
                    index,
                    input_video.display(),
                    stage,
                    e
                );
                remove_partial_output(&output_video);
                VideoStatus::Failed {
                    stage,
                    error: format!("{:#}", e),
                }
            }
        };

        videos.push(VideoOutcome {
            index,
            input_video: input_video.clone(),
            output_video,
            status,
        });
    }

    // 4. 写入运行摘要
    let summary = RunSummary {
        main_video: config.main_video.clone(),
        random_frames_count: config.random_frames_count,
        median_image: median_image.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        videos: videos.clone(),
    };
    let summary_path = config.output_dir.join(SUMMARY_FILE);
    let summary_json = serde_json::to_string_pretty(&summary).context("序列化运行摘要失败")?;
    std::fs::write(&summary_path, summary_json)
        .with_context(|| format!("写入运行摘要失败: {}", summary_path.display()))?;

    let output = ProcessOutput {
        output_dir: config.output_dir.clone(),
        median_image,
        videos,
    };

    let failed = output.failed_count();
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "🎉 [背景替换] 处理完成！总耗时: {:.2}秒",
        total_start.elapsed().as_secs_f64()
    );
    info!("  • 成功: {} 个", output.videos.len() - failed);
    if failed > 0 {
        warn!("  • 失败: {} 个", failed);
    }
    info!("📁 [背景替换] 输出目录: {}", output.output_dir.display());

    Ok(output)
}

/// 处理单个次要视频，返回写入的帧数；失败时附带所处阶段
fn substitute_background<B: MediaBackend, R: Rng>(
    backend: &B,
    input_video: &Path,
    output_video: &Path,
    reference_background: &RgbImage,
    sample_count: usize,
    rng: &mut R,
) -> std::result::Result<u64, (Stage, anyhow::Error)> {
    let mut source = backend
        .open_source(input_video)
        .map_err(|e| (Stage::Open, e))?;

    // 尺寸与主视频不同则无法替换，不必再采样
    ensure_same_dimensions(
        "次要视频",
        reference_background.dimensions(),
        source.dimensions(),
    )
    .map_err(|e| (Stage::Open, e.into()))?;

    let own_background = estimate_background(source.as_mut(), sample_count, rng)
        .map_err(|e| (Stage::EstimateBackground, e))?;

    ensure_same_dimensions(
        "主视频背景",
        own_background.dimensions(),
        reference_background.dimensions(),
    )
    .map_err(|e| (Stage::EstimateBackground, e.into()))?;

    let (width, height) = own_background.dimensions();
    let mut replace = || -> Result<u64> {
        let mut sink = backend.create_sink(output_video, width, height, OUTPUT_FPS)?;
        let frames = replace_foreground(
            source.as_mut(),
            sink.as_mut(),
            &own_background,
            reference_background,
        )?;
        sink.finish()?;
        Ok(frames)
    };
    replace().map_err(|e| (Stage::Replace, e))
}

fn remove_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!("🗑️  [背景替换] 已删除不完整的输出: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("⚠️  [背景替换] 删除不完整的输出失败: {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackgroundError;
    use crate::memory::MemoryBackend;
    use image::Rgb;
    use rand::RngCore;

    /// 总是产生 0 的随机源：采样序号恒为 0，背景即第一帧
    struct ZeroRng;

    impl RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }
    }

    /// 在 [0, 3] 上依次采到 0, 1, 2, 0, 1, 2 …（3 帧视频报告的区间）
    ///
    /// `k << 62` 乘以区间长度 4 的高 64 位恰好是 k，低位为 0。
    struct CycleRng {
        draws: u64,
    }

    impl CycleRng {
        fn new() -> Self {
            Self { draws: 0 }
        }
    }

    impl RngCore for CycleRng {
        fn next_u32(&mut self) -> u32 {
            (self.next_u64() >> 32) as u32
        }

        fn next_u64(&mut self) -> u64 {
            let index = self.draws % 3;
            self.draws += 1;
            index << 62
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }
    }

    fn frame(pixels: [[u8; 3]; 2]) -> RgbImage {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb(pixels[0]));
        img.put_pixel(1, 0, Rgb(pixels[1]));
        img
    }

    fn test_config(name: &str, other_videos: Vec<PathBuf>) -> ProcessConfig {
        let output_dir = std::env::temp_dir().join(format!(
            "video-background-{}-{}",
            name,
            std::process::id()
        ));
        ProcessConfig {
            main_video: PathBuf::from("main.avi"),
            other_videos,
            random_frames_count: 5,
            output_dir,
            seed: None,
            log_level: "info".to_string(),
        }
    }

    fn backend_with_main() -> MemoryBackend {
        let mut backend = MemoryBackend::new();
        backend.insert_video(
            "main.avi",
            vec![
                frame([[100, 100, 100], [50, 60, 70]]),
                frame([[0, 255, 0], [50, 60, 70]]),
                frame([[100, 100, 100], [255, 0, 255]]),
            ],
        );
        backend
    }

    #[test]
    fn test_end_to_end_two_pixel_videos() {
        // 主视频背景: 中值 [100,100,100] [50,60,70]，每个像素都在某一帧被遮挡
        let mut backend = backend_with_main();
        // 次要视频背景: 中值 [12,10,10] [20,20,20]，与第 0 帧不同
        backend.insert_video(
            "second.avi",
            vec![
                frame([[200, 10, 10], [20, 20, 20]]),
                frame([[10, 10, 10], [20, 20, 20]]),
                frame([[12, 10, 10], [20, 120, 20]]),
            ],
        );
        let mut config = test_config("e2e", vec![PathBuf::from("second.avi")]);
        config.random_frames_count = 3;

        let mut rng = CycleRng::new();
        let output = process_videos_with(&backend, &config, &mut rng).unwrap();
        assert_eq!(rng.draws, 6);

        assert_eq!(output.failed_count(), 0);
        assert_eq!(output.videos[0].status, VideoStatus::Succeeded { frames: 3 });
        assert!(output.median_image.exists());

        let written = backend.output(&config.output_video_path(0)).unwrap();
        let expected = vec![
            frame([[200, 10, 10], [50, 60, 70]]),
            frame([[100, 100, 100], [50, 60, 70]]),
            frame([[100, 100, 100], [20, 120, 20]]),
        ];
        assert_eq!(written, expected);

        let summary: RunSummary = serde_json::from_str(
            &std::fs::read_to_string(config.output_dir.join(SUMMARY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(summary.videos, output.videos);

        std::fs::remove_dir_all(&config.output_dir).ok();
    }

    #[test]
    fn test_failed_secondary_does_not_stop_others() {
        let mut backend = backend_with_main();
        backend.insert_video("small.avi", vec![RgbImage::new(1, 1)]);
        backend.insert_video("good.avi", vec![frame([[1, 2, 3], [4, 5, 6]]); 2]);
        let config = test_config(
            "isolation",
            vec![
                PathBuf::from("missing.avi"),
                PathBuf::from("small.avi"),
                PathBuf::from("good.avi"),
            ],
        );

        let output = process_videos_with(&backend, &config, &mut ZeroRng).unwrap();

        assert_eq!(output.failed_count(), 2);
        assert!(matches!(
            output.videos[0].status,
            VideoStatus::Failed { stage: Stage::Open, .. }
        ));
        assert!(matches!(
            output.videos[1].status,
            VideoStatus::Failed { stage: Stage::Open, .. }
        ));
        assert_eq!(output.videos[2].status, VideoStatus::Succeeded { frames: 2 });
        assert_eq!(output.videos[2].output_video, config.output_dir.join("video_2.avi"));
        assert!(backend.output(&config.output_video_path(1)).is_none());

        std::fs::remove_dir_all(&config.output_dir).ok();
    }

    #[test]
    fn test_mismatched_secondary_rejected_before_sampling() {
        let mut backend = backend_with_main();
        backend.insert_video("wide.avi", vec![RgbImage::new(4, 1); 3]);
        let mut config = test_config("mismatch", vec![PathBuf::from("wide.avi")]);
        config.random_frames_count = 3;

        let mut rng = CycleRng::new();
        let output = process_videos_with(&backend, &config, &mut rng).unwrap();

        // 只有主视频消耗了随机数
        assert_eq!(rng.draws, 3);
        match &output.videos[0].status {
            VideoStatus::Failed { stage, error } => {
                assert_eq!(*stage, Stage::Open);
                let expected = BackgroundError::DimensionMismatch {
                    what: "次要视频",
                    expected: (2, 1),
                    actual: (4, 1),
                };
                assert!(error.contains(&expected.to_string()), "error = {}", error);
            }
            other => panic!("unexpected status: {:?}", other),
        }
        assert!(backend.output(&config.output_video_path(0)).is_none());

        std::fs::remove_dir_all(&config.output_dir).ok();
    }

    #[test]
    fn test_missing_main_video_is_fatal() {
        let backend = MemoryBackend::new();
        let config = test_config("fatal", vec![PathBuf::from("second.avi")]);

        let err = process_videos_with(&backend, &config, &mut ZeroRng).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackgroundError>(),
            Some(BackgroundError::Unopenable { .. })
        ));

        std::fs::remove_dir_all(&config.output_dir).ok();
    }

    #[test]
    fn test_no_secondary_videos_only_writes_background() {
        let backend = backend_with_main();
        let config = test_config("primary-only", Vec::new());

        let output = process_videos_with(&backend, &config, &mut ZeroRng).unwrap();
        assert!(output.videos.is_empty());

        let saved = image::open(&output.median_image).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (2, 1));

        std::fs::remove_dir_all(&config.output_dir).ok();
    }
}
