//! 基于内存帧序列的视频源与输出，不依赖 FFmpeg

use anyhow::{Context, Result};
use image::RgbImage;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{ensure_same_dimensions, BackgroundError};
use crate::media::{MediaBackend, VideoSink, VideoSource};

/// 内存中的视频源
pub struct MemorySource {
    frames: Vec<RgbImage>,
    reported_count: u64,
    position: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        let reported_count = frames.len() as u64;
        Self {
            frames,
            reported_count,
            position: 0,
        }
    }

    /// 模拟容器报告的帧数与实际可解码帧数不一致的情况
    pub fn with_reported_count(mut self, count: u64) -> Self {
        self.reported_count = count;
        self
    }
}

impl VideoSource for MemorySource {
    fn dimensions(&self) -> (u32, u32) {
        self.frames.first().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    fn frame_count(&self) -> u64 {
        self.reported_count
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        self.position = usize::try_from(index).context("帧序号超出范围")?;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }
}

/// 写入共享缓冲区的视频输出
pub struct MemorySink {
    dimensions: (u32, u32),
    frames: Rc<RefCell<Vec<RgbImage>>>,
    finished: bool,
}

impl VideoSink for MemorySink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if self.finished {
            anyhow::bail!("输出已关闭，不能继续写入");
        }
        ensure_same_dimensions("输出帧", self.dimensions, frame.dimensions())?;
        self.frames.borrow_mut().push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// 以路径为键的内存媒体后端
#[derive(Default)]
pub struct MemoryBackend {
    videos: HashMap<PathBuf, Vec<RgbImage>>,
    outputs: RefCell<HashMap<PathBuf, Rc<RefCell<Vec<RgbImage>>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_video(&mut self, path: impl Into<PathBuf>, frames: Vec<RgbImage>) {
        self.videos.insert(path.into(), frames);
    }

    /// 取出写入到 `path` 的全部帧
    pub fn output(&self, path: &Path) -> Option<Vec<RgbImage>> {
        self.outputs
            .borrow()
            .get(path)
            .map(|frames| frames.borrow().clone())
    }
}

impl MediaBackend for MemoryBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
        let frames = self.videos.get(path).ok_or_else(|| BackgroundError::Unopenable {
            path: path.to_path_buf(),
            reason: "内存中不存在该视频".to_string(),
        })?;
        Ok(Box::new(MemorySource::new(frames.clone())))
    }

    fn create_sink(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        _fps: u32,
    ) -> Result<Box<dyn VideoSink>> {
        let frames = Rc::new(RefCell::new(Vec::new()));
        self.outputs
            .borrow_mut()
            .insert(path.to_path_buf(), Rc::clone(&frames));
        Ok(Box::new(MemorySink {
            dimensions: (width, height),
            frames,
            finished: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(2, 2, Rgb([value, value, value]))
    }

    #[test]
    fn test_seek_then_read_sequentially() {
        let mut source = MemorySource::new(vec![solid(0), solid(1), solid(2)]);
        source.seek(1).unwrap();
        assert_eq!(source.next_frame().unwrap(), Some(solid(1)));
        assert_eq!(source.next_frame().unwrap(), Some(solid(2)));
        assert_eq!(source.next_frame().unwrap(), None);

        source.seek(3).unwrap();
        assert_eq!(source.next_frame().unwrap(), None);
    }

    #[test]
    fn test_unknown_path_is_unopenable() {
        let backend = MemoryBackend::new();
        let err = match backend.open_source(Path::new("missing.avi")) {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(
            err.downcast_ref::<BackgroundError>(),
            Some(BackgroundError::Unopenable { .. })
        ));
    }

    #[test]
    fn test_sink_rejects_wrong_dimensions() {
        let backend = MemoryBackend::new();
        let mut sink = backend.create_sink(Path::new("out.avi"), 2, 2, 10).unwrap();
        sink.write_frame(&solid(5)).unwrap();
        assert!(sink.write_frame(&RgbImage::new(3, 3)).is_err());
        sink.finish().unwrap();
        assert!(sink.write_frame(&solid(6)).is_err());
        assert_eq!(backend.output(Path::new("out.avi")).unwrap(), vec![solid(5)]);
    }
}
