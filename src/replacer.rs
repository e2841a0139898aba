use anyhow::{Context, Result};
use image::{Rgb, RgbImage};

use crate::error::ensure_same_dimensions;
use crate::media::{VideoSink, VideoSource};

/// 输出视频的固定帧率，与输入视频的实际帧率无关
pub const OUTPUT_FPS: u32 = 10;

/// 差异亮度阈值：sqrt(0.299·R² + 0.587·G² + 0.114·B²) < 30 视为背景
pub const BRIGHTNESS_THRESHOLD: u32 = 30;

// 系数放大 1000 倍后用整数比较，避免边界值受浮点误差影响
const WEIGHT_R: u32 = 299;
const WEIGHT_G: u32 = 587;
const WEIGHT_B: u32 = 114;
const THRESHOLD_SQUARED_SCALED: u32 = BRIGHTNESS_THRESHOLD * BRIGHTNESS_THRESHOLD * 1000;

/// 差异像素的感知亮度是否低于阈值（严格小于）
pub fn is_background_like(diff: Rgb<u8>) -> bool {
    let Rgb([r, g, b]) = diff;
    let (r, g, b) = (r as u32, g as u32, b as u32);
    WEIGHT_R * r * r + WEIGHT_G * g * g + WEIGHT_B * b * b < THRESHOLD_SQUARED_SCALED
}

fn abs_diff(a: Rgb<u8>, b: Rgb<u8>) -> Rgb<u8> {
    Rgb([
        a[0].abs_diff(b[0]),
        a[1].abs_diff(b[1]),
        a[2].abs_diff(b[2]),
    ])
}

/// 将与自身背景几乎相同的像素替换为参考背景的像素，其余像素保持不变
pub fn replace_frame(
    frame: &RgbImage,
    own_background: &RgbImage,
    reference_background: &RgbImage,
) -> Result<RgbImage> {
    ensure_same_dimensions("视频背景", frame.dimensions(), own_background.dimensions())?;
    ensure_same_dimensions(
        "参考背景",
        frame.dimensions(),
        reference_background.dimensions(),
    )?;

    let mut output = frame.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let diff = abs_diff(*pixel, *own_background.get_pixel(x, y));
        if is_background_like(diff) {
            *pixel = *reference_background.get_pixel(x, y);
        }
    }

    Ok(output)
}

/// 从第一帧开始重写整段视频并写入 `sink`，返回写入的帧数
///
/// 估计背景时的随机定位会移动读取位置，这里先回到第 0 帧。
/// 调用方负责在之后调用 `sink.finish()`。
pub fn replace_foreground(
    source: &mut dyn VideoSource,
    sink: &mut dyn VideoSink,
    own_background: &RgbImage,
    reference_background: &RgbImage,
) -> Result<u64> {
    source.seek(0).context("无法回到视频开头")?;

    let mut written = 0u64;
    while let Some(frame) = source
        .next_frame()
        .with_context(|| format!("解码第 {} 帧失败", written))?
    {
        let output = replace_frame(&frame, own_background, reference_background)
            .with_context(|| format!("第 {} 帧", written))?;
        sink.write_frame(&output)
            .with_context(|| format!("写入第 {} 帧失败", written))?;
        written += 1;
    }

    Ok(written)
}
