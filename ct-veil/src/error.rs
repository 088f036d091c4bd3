//! 运行时错误.

use crate::Idx2d;
use std::path::PathBuf;
use thiserror::Error;

/// 去识别化流程中的全部错误类型.
///
/// 任何错误都会中止整次运行, 不会重试, 也不会留下被视为有效的输出目录.
#[derive(Debug, Error)]
pub enum VeilError {
    /// 同一检查内切片的二维形状不一致.
    ///
    /// `index` 为第一个不一致切片在 (排序后) 序列中的位置.
    #[error("切片 {index} 的形状为 {found:?}, 与第一张切片的 {expected:?} 不一致")]
    InputShape {
        /// 不一致切片的位置.
        index: usize,
        /// 第一张切片的形状.
        expected: Idx2d,
        /// 不一致切片的形状.
        found: Idx2d,
    },

    /// 输入中没有任何有效切片.
    #[error("目录 `{0}` 中没有有效切片")]
    NoSlices(PathBuf),

    /// 二值化后没有任何前景体素, 即未检测到头部.
    #[error("二值化后不存在前景体素, 未检测到头部")]
    Segmentation,

    /// `face` 策略下, 皮肤/脂肪外壳的采样池为空.
    #[error("皮肤/脂肪外壳中没有可供采样的 HU 值")]
    EmptyPool,

    /// 替换策略既不是已知关键字, 也不是合法整数.
    #[error("替换策略必须为 `face`, `air` 或 i16 范围内的整数 HU 值, 但得到了 `{0}`")]
    InvalidPolicy(String),

    /// 参数不合法.
    #[error("参数不合法: {0}")]
    InvalidConfig(String),

    /// 输出目录已存在且非空.
    #[error("输出目录 `{0}` 已存在且非空")]
    OutputNotEmpty(PathBuf),

    /// 底层文件系统错误.
    #[error("I/O 错误 (`{path}`)")]
    Io {
        /// 出错的路径.
        path: PathBuf,
        /// 原始错误.
        #[source]
        source: std::io::Error,
    },

    /// DICOM 解析或编码错误.
    #[error("DICOM 错误 (`{path}`)")]
    Dicom {
        /// 出错的文件.
        path: PathBuf,
        /// 原始错误.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 预览图导出错误.
    #[cfg(feature = "preview")]
    #[error("预览图 `{path}` 导出失败")]
    Preview {
        /// 预览图路径.
        path: PathBuf,
        /// 原始错误.
        #[source]
        source: image::ImageError,
    },
}

impl VeilError {
    /// 将 `std::io::Error` 与路径绑定.
    #[inline]
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 将 dicom-rs 的错误与路径绑定.
    #[inline]
    pub(crate) fn dicom<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Dicom {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// 去识别化运行时结果.
pub type VeilResult<T> = Result<T, VeilError>;
