use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// 可随机定位的视频帧源
pub trait VideoSource {
    /// 帧尺寸 (宽, 高)，打开后即可得到，用于采样前校验
    fn dimensions(&self) -> (u32, u32);

    /// 容器报告的总帧数，可能存在 ±1 的误差
    fn frame_count(&self) -> u64;

    /// 定位到指定帧，下一次 `next_frame` 从该帧开始读取
    fn seek(&mut self, index: u64) -> Result<()>;

    /// 顺序读取下一帧，`None` 表示已到流末尾
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// 只写的视频输出
pub trait VideoSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// 刷新编码器并关闭输出，之后不得再写入
    fn finish(&mut self) -> Result<()>;
}

/// 打开输入视频、创建输出视频的后端
pub trait MediaBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn VideoSource>>;

    fn create_sink(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoSink>>;
}
