//! 结构元.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 膨胀结构元.
///
/// 所有结构元都包含原点 (偶数直径的圆盘在负方向多出一行一列), 并且任一元素都能沿坐标轴方向
/// 单调地走回原点而不离开结构元. 膨胀只需从前景表面体素出发即可得到完整结果,
/// 依赖的正是这一性质.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Kernel {
    /// 逐切片的二维椭圆 (圆盘) 结构元, 直径以像素计.
    ///
    /// 与 OpenCV `getStructuringElement(MORPH_ELLIPSE, (d, d))` 的构造方式一致.
    /// 每张切片独立膨胀, z 方向不扩展.
    Disc {
        /// 直径, 必须大于 0.
        diameter: usize,
    },

    /// 三维欧氏球结构元, 半径以体素计.
    Ball {
        /// 半径. 为 0 时结构元只包含原点.
        radius: usize,
    },

    /// 三维 6-邻域十字结构元, 每次膨胀向六个方向各扩展一个体素.
    Cross,
}

impl Kernel {
    /// 结构元包含的全部偏移量 (dz, dh, dw), 含原点.
    pub fn offsets(&self) -> Vec<(isize, isize, isize)> {
        match *self {
            Kernel::Disc { diameter } => disc_offsets(diameter)
                .into_iter()
                .map(|(dh, dw)| (0, dh, dw))
                .collect(),
            Kernel::Ball { radius } => ball_offsets(radius),
            Kernel::Cross => vec![
                (0, 0, 0),
                (-1, 0, 0),
                (1, 0, 0),
                (0, -1, 0),
                (0, 1, 0),
                (0, 0, -1),
                (0, 0, 1),
            ],
        }
    }
}

/// 椭圆结构元的二维偏移量 (dh, dw).
///
/// 逐行计算半宽 `dx = round(c * sqrt((r^2 - dy^2) / r^2))`, 其中 `r`, `c`
/// 为半高和半宽. `diameter` 为 0 时返回空 `Vec`.
pub fn disc_offsets(diameter: usize) -> Vec<(isize, isize)> {
    if diameter == 0 {
        return vec![];
    }
    let d = diameter as isize;
    let (r, c) = (d / 2, d / 2);
    let inv_r2 = if r != 0 {
        1.0 / (r * r) as f64
    } else {
        0.0
    };

    let mut ans = Vec::with_capacity(diameter * diameter);
    for i in 0..d {
        let dy = i - r;
        if dy.abs() > r {
            continue;
        }
        let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize;
        let (j1, j2) = ((c - dx).max(0), (c + dx + 1).min(d));
        ans.extend((j1..j2).map(|j| (dy, j - c)));
    }
    ans
}

/// 球结构元的三维偏移量.
fn ball_offsets(radius: usize) -> Vec<(isize, isize, isize)> {
    let r = radius as isize;
    let r2 = r * r;
    let mut ans = Vec::new();
    for dz in -r..=r {
        for dh in -r..=r {
            for dw in -r..=r {
                if dz * dz + dh * dh + dw * dw <= r2 {
                    ans.push((dz, dh, dw));
                }
            }
        }
    }
    ans
}
