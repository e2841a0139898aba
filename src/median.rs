use anyhow::Result;
use image::{Rgb, RgbImage};
use tracing::info;

use crate::error::{ensure_same_dimensions, BackgroundError};

/// 每处理多少行输出一次进度
const PROGRESS_ROWS: u32 = 20;

/// 取中位数（第 ⌊N/2⌋ 小的元素）
///
/// 使用 `select_nth_unstable` 做部分选择而不是完整排序；偶数个元素时取较大的中间值，
/// 不做平均。`values` 的顺序会被打乱。调用方保证 `values` 非空。
pub fn median_of(values: &mut [u8]) -> u8 {
    let mid = values.len() / 2;
    *values.select_nth_unstable(mid).1
}

/// 逐像素、逐通道计算多帧的中值图像
///
/// 各像素之间相互独立，不使用任何空间相关性。
pub fn compute_median_image(frames: &[RgbImage]) -> Result<RgbImage> {
    let first = frames
        .first()
        .ok_or(BackgroundError::EmptySampleSet { requested: 0 })?;
    let (width, height) = first.dimensions();

    for frame in &frames[1..] {
        ensure_same_dimensions("采样帧", (width, height), frame.dimensions())?;
    }

    let mut median_img = RgbImage::new(width, height);
    let mut reds = Vec::with_capacity(frames.len());
    let mut greens = Vec::with_capacity(frames.len());
    let mut blues = Vec::with_capacity(frames.len());

    for y in 0..height {
        if y % PROGRESS_ROWS == 0 {
            info!("processed: {}%", (y as f64 * 100.0 / height as f64) as u32);
        }
        for x in 0..width {
            reds.clear();
            greens.clear();
            blues.clear();

            for frame in frames {
                let Rgb([r, g, b]) = *frame.get_pixel(x, y);
                reds.push(r);
                greens.push(g);
                blues.push(b);
            }

            median_img.put_pixel(
                x,
                y,
                Rgb([
                    median_of(&mut reds),
                    median_of(&mut greens),
                    median_of(&mut blues),
                ]),
            );
        }
    }

    Ok(median_img)
}
