use std::fmt;
use std::path::PathBuf;

/// 背景替换流程中的领域错误
///
/// 其余 I/O 与 FFmpeg 错误通过 `anyhow::Context` 附加上下文后向上传播，
/// 调用方可以用 `downcast_ref::<BackgroundError>()` 区分这几类情况。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundError {
    /// 视频文件无法打开
    Unopenable { path: PathBuf, reason: String },
    /// 采样结果为空，无法计算中值背景
    EmptySampleSet { requested: usize },
    /// 逐像素比较的两幅图像尺寸不一致
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// 配置缺失或取值非法
    InvalidConfig(String),
}

impl fmt::Display for BackgroundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundError::Unopenable { path, reason } => {
                write!(f, "无法打开视频 {}: {reason}", path.display())
            }
            BackgroundError::EmptySampleSet { requested } => {
                write!(f, "请求采样 {requested} 帧，但没有成功解码任何帧")
            }
            BackgroundError::DimensionMismatch { what, expected, actual } => write!(
                f,
                "尺寸不一致 ({what}): 期望 {}x{}，实际 {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            BackgroundError::InvalidConfig(msg) => write!(f, "配置错误: {msg}"),
        }
    }
}

impl std::error::Error for BackgroundError {}

/// 校验两个尺寸一致，否则返回 `DimensionMismatch`
pub(crate) fn ensure_same_dimensions(
    what: &'static str,
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<(), BackgroundError> {
    if expected == actual {
        Ok(())
    } else {
        Err(BackgroundError::DimensionMismatch { what, expected, actual })
    }
}
