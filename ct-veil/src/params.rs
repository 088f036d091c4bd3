//! 去识别化参数.
//!
//! 所有可调参数都有经过标定的默认值. 参数只在一次运行内有效, 不会被持久化.

use crate::consts::hu::DEFAULT_AIR_THRESHOLD;
use crate::morph::{Dilation, Kernel};
use crate::segment::Connectivity;
use crate::substitute::{PoolWindow, Replacer};
use crate::{CtWindow, VeilResult};
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一次去识别化运行的全部参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeidParams {
    /// 替换策略.
    pub replacer: Replacer,

    /// 空气/组织分割阈值 (HU). 不小于该值的体素为前景.
    pub air_threshold: i16,

    /// 连通区域的邻接规则.
    pub connectivity: Connectivity,

    /// 保护掩码的膨胀参数.
    pub dilation: Dilation,

    /// `face` 策略采样池的 HU 开区间. `None` 表示不限制.
    pub pool_window: Option<PoolWindow>,

    /// 随机种子. `None` 时每次运行从系统熵源取种.
    pub seed: Option<u64>,

    /// 是否显示进度条.
    pub progress: bool,

    /// 若给定, 将去识别化后的每张切片以 PNG 格式导出到该目录.
    pub preview: Option<(PathBuf, PreviewWindow)>,
}

/// 预览图使用的 CT 窗口.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PreviewWindow {
    /// 软组织窗.
    #[default]
    SoftTissue,

    /// 脑窗.
    Brain,

    /// 骨窗.
    Bone,
}

impl From<PreviewWindow> for CtWindow {
    #[inline]
    fn from(value: PreviewWindow) -> Self {
        match value {
            PreviewWindow::SoftTissue => CtWindow::from_soft_tissue(),
            PreviewWindow::Brain => CtWindow::from_brain(),
            PreviewWindow::Bone => CtWindow::from_bone(),
        }
    }
}

impl Default for DeidParams {
    fn default() -> Self {
        Self {
            replacer: Replacer::default(),
            air_threshold: DEFAULT_AIR_THRESHOLD,
            connectivity: Connectivity::default(),
            dilation: Dilation::default(),
            pool_window: None,
            seed: None,
            progress: true,
            preview: None,
        }
    }
}

impl DeidParams {
    /// 使用给定替换策略, 其余参数取默认值.
    #[inline]
    pub fn with_replacer(mut self, replacer: Replacer) -> Self {
        self.replacer = replacer;
        self
    }

    /// 设置分割阈值.
    #[inline]
    pub fn with_air_threshold(mut self, threshold: i16) -> Self {
        self.air_threshold = threshold;
        self
    }

    /// 设置邻接规则.
    #[inline]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// 设置结构元与膨胀次数.
    #[inline]
    pub fn with_dilation(mut self, kernel: Kernel, iterations: usize) -> Self {
        self.dilation = Dilation { kernel, iterations };
        self
    }

    /// 限制采样池的 HU 范围.
    #[inline]
    pub fn with_pool_window(mut self, window: Option<PoolWindow>) -> Self {
        self.pool_window = window;
        self
    }

    /// 固定随机种子, 使 `face` 策略的结果可复现.
    #[inline]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// 开关进度条.
    #[inline]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// 导出预览图.
    #[inline]
    pub fn with_preview(mut self, dir: PathBuf, window: PreviewWindow) -> Self {
        self.preview = Some((dir, window));
        self
    }

    /// 检查参数是否合法.
    pub fn validate(&self) -> VeilResult<()> {
        self.dilation.validate()
    }
}
