use ffmpeg_next as ffmpeg;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::error::ensure_same_dimensions;
use crate::media::VideoSink;
use crate::video_processor::init_ffmpeg;

/// MJPEG 编码的 AVI 视频写入器
pub struct VideoWriter {
    output_path: PathBuf,
    octx: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

impl VideoWriter {
    /// 创建输出文件并写入容器头
    pub fn create(output_path: impl AsRef<Path>, width: u32, height: u32, fps: u32) -> Result<Self> {
        init_ffmpeg()?;
        let output_path = output_path.as_ref().to_path_buf();

        let mut octx = ffmpeg::format::output_as(&output_path, "avi")
            .with_context(|| format!("无法创建输出文件: {}", output_path.display()))?;

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MJPEG).context("未找到 MJPEG 编码器")?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let mut stream = octx.add_stream(codec).context("无法添加视频流")?;
        let stream_index = stream.index();

        let encoder_time_base = ffmpeg::Rational::new(1, fps as i32);
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("无法创建视频编码器")?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(ffmpeg::format::Pixel::YUVJ420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(fps as i32, 1)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder.open_as(codec).context("无法打开 MJPEG 编码器")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        octx.write_header().context("写入容器头失败")?;

        // 写入容器头后，复用器可能调整流的时间基
        let stream_time_base = octx
            .stream(stream_index)
            .context("输出流丢失")?
            .time_base();

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::format::Pixel::YUVJ420P,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("无法创建缩放器")?;

        Ok(Self {
            output_path,
            octx,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            next_pts: 0,
            finished: false,
        })
    }

    /// 取出编码器中已就绪的数据包并写入容器
    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.octx)
                .with_context(|| format!("写入数据包失败: {}", self.output_path.display()))?;
        }
        Ok(())
    }
}

impl VideoSink for VideoWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if self.finished {
            anyhow::bail!("输出已关闭: {}", self.output_path.display());
        }
        ensure_same_dimensions("输出帧", (self.width, self.height), frame.dimensions())?;

        let mut rgb_frame = image_to_frame(frame);
        rgb_frame.set_pts(Some(self.next_pts));

        let mut yuv_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb_frame, &mut yuv_frame)
            .context("像素格式转换失败")?;
        yuv_frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder.send_frame(&yuv_frame).context("编码帧失败")?;
        self.drain_packets()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder.send_eof().context("刷新编码器失败")?;
        self.drain_packets()?;
        self.octx.write_trailer().context("写入容器尾失败")?;
        Ok(())
    }
}

/// 将 RgbImage 复制到 RGB24 格式的 FFmpeg 帧（按行处理对齐填充）
fn image_to_frame(image: &RgbImage) -> ffmpeg::frame::Video {
    let (width, height) = image.dimensions();
    let mut frame = ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, width, height);
    let stride = frame.stride(0);
    let row_len = width as usize * 3;
    let data = frame.data_mut(0);

    for (y, row) in image.as_raw().chunks_exact(row_len).enumerate() {
        let start = y * stride;
        data[start..start + row_len].copy_from_slice(row);
    }

    frame
}
