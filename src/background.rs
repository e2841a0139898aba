use anyhow::Result;
use image::RgbImage;
use rand::Rng;
use tracing::info;

use crate::error::BackgroundError;
use crate::median::compute_median_image;
use crate::media::VideoSource;
use crate::sampler::sample_frames;

/// 估计视频的静态背景：随机采样若干帧，再逐像素取中值
pub fn estimate_background<R: Rng>(
    source: &mut dyn VideoSource,
    sample_count: usize,
    rng: &mut R,
) -> Result<RgbImage> {
    let frames = sample_frames(source, sample_count, rng);
    if frames.is_empty() {
        return Err(BackgroundError::EmptySampleSet {
            requested: sample_count,
        }
        .into());
    }

    info!("  • 成功采样: {}/{} 帧", frames.len(), sample_count);
    compute_median_image(&frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_single_sample_returns_that_frame() {
        let frame = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8 * 40, y as u8 * 90, 7]));
        // 报告帧数为 0，唯一可能的序号是 0
        let mut source = MemorySource::new(vec![frame.clone()]).with_reported_count(0);
        let mut rng = StdRng::seed_from_u64(3);

        let background = estimate_background(&mut source, 1, &mut rng).unwrap();
        assert_eq!(background, frame);
    }

    #[test]
    fn test_static_video_background_is_the_scene() {
        let scene = RgbImage::from_pixel(4, 4, Rgb([90, 120, 30]));
        let mut source = MemorySource::new(vec![scene.clone(); 6]);
        let mut rng = StdRng::seed_from_u64(11);

        let background = estimate_background(&mut source, 9, &mut rng).unwrap();
        assert_eq!(background, scene);
    }

    #[test]
    fn test_no_decodable_frames_fails() {
        let mut source = MemorySource::new(Vec::new()).with_reported_count(4);
        let mut rng = StdRng::seed_from_u64(5);

        let err = estimate_background(&mut source, 3, &mut rng).unwrap_err();
        assert_eq!(
            err.downcast_ref::<BackgroundError>(),
            Some(&BackgroundError::EmptySampleSet { requested: 3 })
        );
    }
}
