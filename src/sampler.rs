use image::RgbImage;
use rand::Rng;
use tracing::debug;

use crate::media::VideoSource;

/// 在 [0, frame_count] 内均匀随机（有放回）抽取 `count` 个帧序号并解码
///
/// 上界包含在内，容器报告的帧数可能偏大一帧。定位或解码失败的样本直接跳过，
/// 不重试也不替补，因此返回的帧数可能少于 `count`，甚至为空。
pub fn sample_frames<R: Rng>(
    source: &mut dyn VideoSource,
    count: usize,
    rng: &mut R,
) -> Vec<RgbImage> {
    let upper = source.frame_count();
    let mut frames = Vec::with_capacity(count);

    for _ in 0..count {
        let index = rng.random_range(0..=upper);

        if let Err(e) = source.seek(index) {
            debug!("跳过第 {} 帧: 定位失败: {:#}", index, e);
            continue;
        }

        match source.next_frame() {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => debug!("跳过第 {} 帧: 已到流末尾", index),
            Err(e) => debug!("跳过第 {} 帧: 解码失败: {:#}", index, e),
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn frames(n: u8) -> Vec<RgbImage> {
        (0..n).map(|i| RgbImage::from_pixel(2, 1, Rgb([i, i, i]))).collect()
    }

    #[test]
    fn test_fewer_decodable_frames_than_requested() {
        // 报告 10 帧，实际只有 3 帧可解码
        let mut source = MemorySource::new(frames(3)).with_reported_count(10);
        let mut rng = StdRng::seed_from_u64(7);

        let sampled = sample_frames(&mut source, 50, &mut rng);
        assert!(sampled.len() < 50);
        assert!(sampled.iter().all(|f| f.get_pixel(0, 0)[0] < 3));
    }

    #[test]
    fn test_samples_come_from_source() {
        let mut source = MemorySource::new(frames(5));
        let mut rng = StdRng::seed_from_u64(42);

        let sampled = sample_frames(&mut source, 20, &mut rng);
        assert!(!sampled.is_empty());
        assert!(sampled.len() <= 20);
        assert!(sampled.iter().all(|f| f.dimensions() == (2, 1)));
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        let mut source = MemorySource::new(Vec::new());
        let mut rng = StdRng::seed_from_u64(1);

        assert!(sample_frames(&mut source, 5, &mut rng).is_empty());
    }
}
