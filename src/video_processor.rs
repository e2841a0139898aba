use ffmpeg_next as ffmpeg;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;
use tracing::debug;

use crate::error::BackgroundError;
use crate::media::VideoSource;

/// 初始化 FFmpeg 并把日志级别设为 ERROR
pub(crate) fn init_ffmpeg() -> Result<()> {
    ffmpeg::init().context("初始化 FFmpeg 失败")?;

    // 抑制 FFmpeg 的警告和信息消息，只保留错误
    unsafe {
        ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
    }

    Ok(())
}

/// 视频处理器，负责解码视频、按帧序号定位并输出 RGB 帧
pub struct VideoProcessor {
    input_path: String,
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    video_stream_index: usize,
    time_base: ffmpeg::Rational,
    /// 第一帧的时间（秒），MPEG-TS 等容器的时间戳通常不从 0 开始
    start_time: f64,
    fps: f64,
    frame_count: u64,
    /// 定位后需要跳过的、早于目标时间的帧
    skip_before: Option<f64>,
    eof_sent: bool,
}

impl VideoProcessor {
    /// 打开视频文件并创建解码器
    ///
    /// 任何打开阶段的失败都会被包装成 `BackgroundError::Unopenable`。
    pub fn open(input_path: impl AsRef<Path>) -> Result<Self> {
        let path = input_path.as_ref();
        init_ffmpeg()?;
        Self::open_inner(path).map_err(|e| {
            BackgroundError::Unopenable {
                path: path.to_path_buf(),
                reason: format!("{:#}", e),
            }
            .into()
        })
    }

    fn open_inner(path: &Path) -> Result<Self> {
        let ictx = ffmpeg::format::input(&path).context("无法打开视频文件")?;

        let video_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("未找到视频流")?;
        let video_stream_index = video_stream.index();
        let time_base = video_stream.time_base();
        let format_start = unsafe { (*ictx.as_ptr()).start_time };
        let start_time = start_offset_seconds(video_stream.start_time(), time_base, format_start);

        let fps = video_stream.avg_frame_rate();
        let fps_value = if fps.denominator() > 0 && fps.numerator() > 0 {
            fps.numerator() as f64 / fps.denominator() as f64
        } else {
            30.0 // 默认值
        };

        // 优先使用容器记录的帧数，缺失时按时长估算
        let frame_count = if video_stream.frames() > 0 {
            video_stream.frames() as u64
        } else {
            let duration = ictx.duration().max(0) as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
            (duration * fps_value).round() as u64
        };

        let decoder_context =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .context("无法创建解码器上下文")?;

        let decoder = decoder_context
            .decoder()
            .video()
            .context("无法创建视频解码器")?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("无法创建缩放器")?;

        debug!(
            "打开视频 {}: {}x{}, {:.2} fps, {} 帧, 起始 {:.3}s",
            path.display(),
            decoder.width(),
            decoder.height(),
            fps_value,
            frame_count,
            start_time
        );

        Ok(Self {
            input_path: path.to_string_lossy().to_string(),
            ictx,
            decoder,
            scaler,
            video_stream_index,
            time_base,
            start_time,
            fps: fps_value,
            frame_count,
            skip_before: None,
            eof_sent: false,
        })
    }

    /// 帧相对第一帧的时间（秒）
    fn frame_time(&self, frame: &ffmpeg::frame::Video) -> Option<f64> {
        frame
            .timestamp()
            .map(|ts| timestamp_seconds(ts, self.time_base) - self.start_time)
    }

    /// 从解码器中取出下一帧已解码的画面，跳过定位点之前的帧
    fn receive_decoded(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if let Some(target_time) = self.skip_before {
                match self.frame_time(&decoded) {
                    Some(t) if is_before_target(t, target_time, self.fps) => continue,
                    _ => self.skip_before = None,
                }
            }

            let mut rgb_frame = ffmpeg::frame::Video::empty();
            self.scaler
                .run(&decoded, &mut rgb_frame)
                .context("像素格式转换失败")?;
            return frame_to_image(&rgb_frame).map(Some);
        }

        Ok(None)
    }
}

impl VideoSource for VideoProcessor {
    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        let target_time = index as f64 / self.fps;
        let timestamp = seek_timestamp(index, self.fps, self.start_time);

        // Seek 到目标时间点（向后查找最近的 keyframe）
        let ret = unsafe {
            ffmpeg::sys::av_seek_frame(
                self.ictx.as_mut_ptr(),
                -1, // 对所有流 seek
                timestamp,
                ffmpeg::sys::AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if ret < 0 {
            anyhow::bail!(
                "定位到第 {} 帧失败: {} ({})",
                index,
                ffmpeg::Error::from(ret),
                self.input_path
            );
        }

        // 刷新解码器缓冲区
        self.decoder.flush();
        self.eof_sent = false;
        self.skip_before = if index == 0 { None } else { Some(target_time) };

        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        loop {
            if let Some(image) = self.receive_decoded()? {
                return Ok(Some(image));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let next = self
                .ictx
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));

            match next {
                Some((index, packet)) => {
                    if index != self.video_stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        // 发送数据包失败，跳过这个数据包
                        debug!("跳过无法解码的数据包: {}", e);
                    }
                }
                None => {
                    self.decoder.send_eof().context("刷新解码器失败")?;
                    self.eof_sent = true;
                }
            }
        }
    }
}

/// 时间戳按时间基换算为秒
fn timestamp_seconds(ts: i64, time_base: ffmpeg::Rational) -> f64 {
    ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// 流的起始偏移（秒）：优先取视频流的 start_time，缺失时退回容器的 start_time
fn start_offset_seconds(stream_start: i64, time_base: ffmpeg::Rational, format_start: i64) -> f64 {
    if stream_start != ffmpeg::ffi::AV_NOPTS_VALUE && time_base.denominator() != 0 {
        timestamp_seconds(stream_start, time_base)
    } else if format_start != ffmpeg::ffi::AV_NOPTS_VALUE {
        format_start as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
    } else {
        0.0
    }
}

/// 第 `index` 帧在 `av_seek_frame(.., -1, ..)` 中使用的绝对时间戳（AV_TIME_BASE 单位）
fn seek_timestamp(index: u64, fps: f64, start_time: f64) -> i64 {
    let absolute = start_time + index as f64 / fps;
    (absolute * ffmpeg::ffi::AV_TIME_BASE as f64).round() as i64
}

/// 相对时间为 `t` 的帧是否仍在定位目标之前（留半帧余量，容忍时间戳取整误差）
fn is_before_target(t: f64, target_time: f64, fps: f64) -> bool {
    t + 0.5 / fps < target_time
}

/// 将 RGB24 格式的 FFmpeg 帧转换为 RgbImage
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    rgb_rows_to_image(frame.width(), frame.height(), frame.stride(0), frame.data(0))
}

/// 按行去掉对齐填充，拼成紧凑的 RGB 缓冲区
fn rgb_rows_to_image(width: u32, height: u32, stride: usize, data: &[u8]) -> Result<RgbImage> {
    let row_len = width as usize * 3;
    if stride < row_len {
        anyhow::bail!("行跨度 {} 小于行宽 {} 字节", stride, row_len);
    }

    let mut buf = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let row = data
            .get(start..start + row_len)
            .with_context(|| format!("帧数据不足: 第 {} 行越界 ({} 字节)", y, data.len()))?;
        buf.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, buf)
        .with_context(|| format!("帧缓冲区与尺寸 {}x{} 不符", width, height))
}
