//! 保护掩码: 对头部掩码进行形态学膨胀.
//!
//! 这里膨胀的是 **保留** 区域 (头部), 结果是头部掩码的超集.
//! 膨胀保留区域等价于从内侧腐蚀被替换区域, 因此调用者只需要关心
//! "保护掩码以外的体素会被替换" 这一条规则.

mod kernel;

pub use kernel::{disc_offsets, Kernel};

use crate::consts::morph::{DEFAULT_DISC_DIAMETER, DEFAULT_ITERATIONS};
use crate::data::VoxelGrid;
use crate::segment::{step, Connectivity};
use crate::{HeadMask, Idx2d, ProtectiveMask, VeilError, VeilResult};
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 膨胀参数: 结构元与膨胀次数.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dilation {
    /// 结构元.
    pub kernel: Kernel,

    /// 膨胀次数. 为 0 时保护掩码与头部掩码相同.
    pub iterations: usize,
}

impl Default for Dilation {
    /// 直径 35 的逐切片圆盘, 膨胀一次.
    fn default() -> Self {
        Self {
            kernel: Kernel::Disc {
                diameter: DEFAULT_DISC_DIAMETER,
            },
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl Dilation {
    /// 检查参数是否合法.
    pub fn validate(&self) -> VeilResult<()> {
        match self.kernel {
            Kernel::Disc { diameter: 0 } => Err(VeilError::InvalidConfig(
                "圆盘结构元直径必须大于 0".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// 由头部掩码计算保护掩码.
///
/// 以 `dilation.kernel` 对 `head` 膨胀 `dilation.iterations` 次.
/// 返回值总是 `head` 的超集.
pub fn shape_protective_mask(head: &HeadMask, dilation: &Dilation) -> VeilResult<ProtectiveMask> {
    dilation.validate()?;
    let mut cur = head.data().to_owned();

    match dilation.kernel {
        Kernel::Disc { diameter } => {
            let offsets = disc_offsets(diameter);
            for _ in 0..dilation.iterations {
                cur = dilate_planar_once(cur.view(), &offsets);
            }
        }
        kernel => {
            let offsets = kernel.offsets();
            for _ in 0..dilation.iterations {
                cur = dilate_once(cur.view(), &offsets);
            }
        }
    }

    let mask = ProtectiveMask::new(cur);
    debug_assert!(mask.covers(head));
    log::debug!(
        "Protective mask covers {} voxel(s), shell has {} voxel(s)",
        mask.count(),
        mask.shell_count(head)
    );
    Ok(mask)
}

/// 三维膨胀一次.
///
/// 只从前景表面 (6-邻域内存在背景) 体素出发放置结构元, 内部体素的贡献被表面体素覆盖.
fn dilate_once(src: ArrayView3<'_, bool>, offsets: &[(isize, isize, isize)]) -> Array3<bool> {
    let shape = src.dim();
    let face = Connectivity::Face6.offsets();
    let mut dst = src.to_owned();

    for (pos, _) in src.indexed_iter().filter(|(_, p)| **p) {
        let on_surface = face
            .iter()
            .any(|d| step(pos, *d, shape).is_some_and(|n| !src[n]));
        if !on_surface {
            continue;
        }
        for d in offsets.iter() {
            if let Some(n) = step(pos, *d, shape) {
                dst[n] = true;
            }
        }
    }
    dst
}

/// 按偏移量 `(dh, dw)` 移动二维索引 `pos`. 越界时返回 `None`.
#[inline]
fn step_2d((h, w): Idx2d, (dh, dw): (isize, isize), (lh, lw): Idx2d) -> Option<Idx2d> {
    let h = h.checked_add_signed(dh).filter(|v| *v < lh)?;
    let w = w.checked_add_signed(dw).filter(|v| *v < lw)?;
    Some((h, w))
}

/// 单张切片膨胀一次, 结果写入 `dst`.
fn dilate_slice(src: ArrayView2<'_, bool>, mut dst: ArrayViewMut2<'_, bool>, offsets: &[(isize, isize)]) {
    const N4: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

    let shape = src.dim();
    dst.assign(&src);
    for (pos, _) in src.indexed_iter().filter(|(_, p)| **p) {
        let on_surface = N4
            .iter()
            .any(|d| step_2d(pos, *d, shape).is_some_and(|n| !src[n]));
        if !on_surface {
            continue;
        }
        for d in offsets.iter() {
            if let Some(n) = step_2d(pos, *d, shape) {
                dst[n] = true;
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

        /// 逐切片膨胀一次. 借助 `rayon` 并行处理各切片.
        fn dilate_planar_once(src: ArrayView3<'_, bool>, offsets: &[(isize, isize)]) -> Array3<bool> {
            let mut dst = Array3::from_elem(src.dim(), false);
            dst.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(z, d)| dilate_slice(src.index_axis(Axis(0), z), d, offsets));
            dst
        }
    } else {
        /// 逐切片膨胀一次.
        fn dilate_planar_once(src: ArrayView3<'_, bool>, offsets: &[(isize, isize)]) -> Array3<bool> {
            let mut dst = Array3::from_elem(src.dim(), false);
            for (z, d) in dst.axis_iter_mut(Axis(0)).enumerate() {
                dilate_slice(src.index_axis(Axis(0), z), d, offsets);
            }
            dst
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Idx3d;

    fn single_voxel(shape: Idx3d, pos: Idx3d) -> HeadMask {
        let mut data = Array3::from_elem(shape, false);
        data[pos] = true;
        HeadMask::from_array(data)
    }

    /// 逐体素放置结构元的朴素膨胀, 作为对照.
    fn naive(src: ArrayView3<'_, bool>, offsets: &[(isize, isize, isize)]) -> Array3<bool> {
        let shape = src.dim();
        let mut dst = src.to_owned();
        for (pos, _) in src.indexed_iter().filter(|(_, p)| **p) {
            for d in offsets {
                if let Some(n) = step(pos, *d, shape) {
                    dst[n] = true;
                }
            }
        }
        dst
    }

    fn pseudo_random_mask(shape: Idx3d) -> HeadMask {
        HeadMask::from_array(Array3::from_shape_fn(shape, |(z, h, w)| {
            (z * 31 + h * 17 + w * 7 + h * w) % 11 < 3
        }))
    }

    #[test]
    fn test_disc_single_voxel() {
        let head = single_voxel((3, 7, 7), (1, 3, 3));
        let dil = Dilation {
            kernel: Kernel::Disc { diameter: 3 },
            iterations: 1,
        };
        let mask = shape_protective_mask(&head, &dil).unwrap();
        assert_eq!(mask.count(), 5);
        assert!(mask[(1, 2, 3)] && mask[(1, 4, 3)] && mask[(1, 3, 2)] && mask[(1, 3, 4)]);
        assert!(!mask[(0, 3, 3)] && !mask[(2, 3, 3)]);
        assert!(!mask[(1, 2, 2)]);
    }

    #[test]
    fn test_disc_iterations() {
        let head = single_voxel((1, 9, 9), (0, 4, 4));
        let dil = Dilation {
            kernel: Kernel::Disc { diameter: 3 },
            iterations: 2,
        };
        // 两次十字膨胀得到半径为 2 的菱形.
        let mask = shape_protective_mask(&head, &dil).unwrap();
        assert_eq!(mask.count(), 13);
        assert!(mask[(0, 4, 6)]);
        assert!(mask[(0, 5, 5)]);
        assert!(!mask[(0, 6, 5)]);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let head = pseudo_random_mask((3, 6, 6));
        let dil = Dilation {
            kernel: Kernel::Ball { radius: 2 },
            iterations: 0,
        };
        let mask = shape_protective_mask(&head, &dil).unwrap();
        assert_eq!(mask.data(), head.data());
        assert_eq!(mask.shell_count(&head), 0);
    }

    #[test]
    fn test_superset_for_all_kernels() {
        let head = pseudo_random_mask((4, 12, 10));
        for kernel in [
            Kernel::Disc { diameter: 5 },
            Kernel::Disc { diameter: 4 },
            Kernel::Ball { radius: 2 },
            Kernel::Cross,
        ] {
            let dil = Dilation {
                kernel,
                iterations: 2,
            };
            let mask = shape_protective_mask(&head, &dil).unwrap();
            assert!(mask.covers(&head), "{kernel:?}");
            assert!(mask.count() >= head.count());
        }
    }

    #[test]
    fn test_surface_dilation_matches_naive() {
        let head = pseudo_random_mask((5, 16, 13));
        for kernel in [
            Kernel::Disc { diameter: 7 },
            Kernel::Ball { radius: 2 },
            Kernel::Cross,
        ] {
            let dil = Dilation {
                kernel,
                iterations: 1,
            };
            let mask = shape_protective_mask(&head, &dil).unwrap();
            let expected = naive(head.data(), &kernel.offsets());
            assert_eq!(mask.data(), expected.view(), "{kernel:?}");
        }
    }

    #[test]
    fn test_ball_spreads_across_slices() {
        let head = single_voxel((5, 5, 5), (2, 2, 2));
        let dil = Dilation {
            kernel: Kernel::Ball { radius: 1 },
            iterations: 1,
        };
        let mask = shape_protective_mask(&head, &dil).unwrap();
        assert_eq!(mask.count(), 7);
        assert!(mask[(1, 2, 2)] && mask[(3, 2, 2)]);
    }

    #[test]
    fn test_invalid_disc() {
        let head = single_voxel((1, 2, 2), (0, 0, 0));
        let dil = Dilation {
            kernel: Kernel::Disc { diameter: 0 },
            iterations: 1,
        };
        assert!(matches!(
            shape_protective_mask(&head, &dil),
            Err(VeilError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_dilation() {
        let dil = Dilation::default();
        assert_eq!(dil.kernel, Kernel::Disc { diameter: 35 });
        assert_eq!(dil.iterations, 1);
        assert!(dil.validate().is_ok());
    }
}
