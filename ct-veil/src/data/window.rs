/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl Default for CtWindow {
    #[inline]
    fn default() -> Self {
        Self::from_soft_tissue()
    }
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 软组织窗, 窗位 40, 窗宽 400. 适合检查面部轮廓是否已被抹除.
    #[inline]
    pub const fn from_soft_tissue() -> CtWindow {
        Self {
            level: 40.0,
            width: 400.0,
        }
    }

    /// 脑窗, 窗位 40, 窗宽 80.
    #[inline]
    pub const fn from_brain() -> CtWindow {
        Self {
            level: 40.0,
            width: 80.0,
        }
    }

    /// 骨窗, 窗位 400, 窗宽 1800.
    #[inline]
    pub const fn from_bone() -> CtWindow {
        Self {
            level: 400.0,
            width: 1800.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前 CT 窗设置下, `hu` 对应的灰度图像素整数值 (0 <= value <= 255).
    pub fn eval(&self, hu: i16) -> u8 {
        let hu = hu as f32;
        let lb = self.lower_bound();
        if hu <= lb {
            u8::MIN
        } else if hu >= self.upper_bound() {
            u8::MAX
        } else {
            // 255, not 256.
            (((hu - lb) / self.width()) * 255.0) as u8
        }
    }
}
