//! 头部分割.
//!
//! 以 HU 阈值二值化体数据, 标记三维连通前景区域, 保留体素个数最多的区域作为头部.
//! 其余前景区域 (检查床、设备、伪影等) 全部视为背景.

use crate::data::VoxelGrid;
use crate::{CtVolume, HeadMask, Idx3d, VeilError, VeilResult};
use itertools::iproduct;
use ndarray::{Array3, ArrayView3, Zip};
use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 三维体素邻接规则.
///
/// 两种规则在对角接触处结果不同: 仅以棱或顶点相接的两个区域,
/// 在 `Full26` 下属于同一区域, 在 `Face6` 下属于不同区域.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connectivity {
    /// 共面邻接, 即前后上下左右 6 个体素.
    Face6,

    /// 完全邻接, 即 3x3x3 立方体中除自身外的 26 个体素.
    #[default]
    Full26,
}

impl Connectivity {
    /// 邻居偏移量 (dz, dh, dw).
    pub fn offsets(self) -> Vec<(isize, isize, isize)> {
        match self {
            Connectivity::Face6 => vec![
                (-1, 0, 0),
                (1, 0, 0),
                (0, -1, 0),
                (0, 1, 0),
                (0, 0, -1),
                (0, 0, 1),
            ],
            Connectivity::Full26 => iproduct!(-1..=1, -1..=1, -1..=1)
                .filter(|d| *d != (0, 0, 0))
                .collect(),
        }
    }
}

/// 按偏移量 `d` 移动 `pos`. 越界时返回 `None`.
#[inline]
pub(crate) fn step(
    (z, h, w): Idx3d,
    (dz, dh, dw): (isize, isize, isize),
    (lz, lh, lw): Idx3d,
) -> Option<Idx3d> {
    let z = z.checked_add_signed(dz).filter(|v| *v < lz)?;
    let h = h.checked_add_signed(dh).filter(|v| *v < lh)?;
    let w = w.checked_add_signed(dw).filter(|v| *v < lw)?;
    Some((z, h, w))
}

/// 二值化: HU 值不小于 `threshold` 的体素为前景 (`true`).
pub fn binarize(volume: &CtVolume, threshold: i16) -> Array3<bool> {
    volume.data().mapv(|hu| hu >= threshold)
}

/// 三维连通区域标记结果.
///
/// 标签 0 为背景, 前景区域的标签从 1 开始, 按照各区域第一个体素在
/// (z, 高, 宽) 行优先扫描中出现的先后顺序分配.
#[derive(Debug, Clone)]
pub struct Components {
    labels: Array3<u32>,
    sizes: Vec<usize>,
}

impl Components {
    /// 前景区域个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// 是否不存在前景区域.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// 标签为 `label` 的区域体素个数. 标签不存在时返回 `None`.
    #[inline]
    pub fn size_of(&self, label: u32) -> Option<usize> {
        (label as usize)
            .checked_sub(1)
            .and_then(|i| self.sizes.get(i))
            .copied()
    }

    /// 获得标签数组的一份不可变 shallow copy.
    #[inline]
    pub fn labels(&self) -> ArrayView3<'_, u32> {
        self.labels.view()
    }

    /// 体素个数最多的区域标签.
    ///
    /// 若多个区域体素个数相同, 返回其中标签最小者 (即扫描中最先遇到者).
    /// 不存在前景时返回 `None`.
    pub fn largest(&self) -> Option<u32> {
        let mut best: Option<(usize, usize)> = None;
        for (i, &size) in self.sizes.iter().enumerate() {
            // 严格大于: 相同大小时保留先遇到的区域.
            if best.map_or(true, |(_, s)| size > s) {
                best = Some((i, size));
            }
        }
        best.map(|(i, _)| i as u32 + 1)
    }

    /// 仅包含标签为 `label` 的区域的布尔掩码.
    pub fn mask_of(&self, label: u32) -> Array3<bool> {
        self.labels.mapv(|l| l == label && label != 0)
    }
}

/// 以广度优先搜索标记 `foreground` 中的三维连通区域.
pub fn label_components(foreground: ArrayView3<'_, bool>, connectivity: Connectivity) -> Components {
    let shape = foreground.dim();
    let offsets = connectivity.offsets();
    let mut labels = Array3::<u32>::zeros(shape);
    let mut sizes = Vec::new();
    let mut bfs_q: VecDeque<Idx3d> = VecDeque::with_capacity(64);

    for (pos, &fg) in foreground.indexed_iter() {
        if !fg || labels[pos] != 0 {
            continue;
        }
        let label = sizes.len() as u32 + 1;
        let mut size = 0usize;
        labels[pos] = label;
        bfs_q.push_back(pos);

        while let Some(cur) = bfs_q.pop_front() {
            size += 1;
            for d in offsets.iter() {
                let Some(next) = step(cur, *d, shape) else {
                    continue;
                };
                if foreground[next] && labels[next] == 0 {
                    labels[next] = label;
                    bfs_q.push_back(next);
                }
            }
        }
        sizes.push(size);
    }

    Components { labels, sizes }
}

/// 分割头部, 返回头部掩码.
///
/// 以 `threshold` 二值化 `volume`, 按 `connectivity` 标记连通区域,
/// 保留体素个数最多的区域 (并列时取扫描中最先遇到者).
/// 函数对相同输入总是产生相同结果.
///
/// # 错误
///
/// 若不存在任何前景体素, 返回 [`VeilError::Segmentation`], 而不是返回全背景掩码.
pub fn segment_head(
    volume: &CtVolume,
    threshold: i16,
    connectivity: Connectivity,
) -> VeilResult<HeadMask> {
    let foreground = binarize(volume, threshold);
    let components = label_components(foreground.view(), connectivity);
    let Some(head) = components.largest() else {
        return Err(VeilError::Segmentation);
    };
    log::debug!(
        "Found {} foreground component(s), head has {} of {} voxel(s)",
        components.len(),
        components.size_of(head).unwrap_or_default(),
        volume.size()
    );

    let mut mask = foreground;
    Zip::from(&mut mask)
        .and(&components.labels)
        .for_each(|m, &l| *m = l == head);
    Ok(HeadMask::from_array(mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::hu;

    fn air(shape: Idx3d) -> Array3<i16> {
        Array3::from_elem(shape, hu::AIR)
    }

    fn fill(data: &mut Array3<i16>, z: std::ops::Range<usize>, h: std::ops::Range<usize>, w: std::ops::Range<usize>, v: i16) {
        for pos in iproduct!(z, h, w) {
            data[pos] = v;
        }
    }

    #[test]
    fn test_binarize_threshold_inclusive() {
        let mut data = air((1, 1, 3));
        data[(0, 0, 1)] = -800;
        data[(0, 0, 2)] = -801;
        let fg = binarize(&CtVolume::from_array(data), -800);
        assert_eq!(fg.as_slice().unwrap(), &[false, true, false]);
    }

    #[test]
    fn test_uniform_air_fails() {
        let vol = CtVolume::from_array(air((4, 8, 8)));
        let r = segment_head(&vol, hu::DEFAULT_AIR_THRESHOLD, Connectivity::Full26);
        assert!(matches!(r, Err(VeilError::Segmentation)));
    }

    #[test]
    fn test_largest_component_kept() {
        let mut data = air((6, 10, 10));
        // 头部: 4x5x5 = 100
        fill(&mut data, 1..5, 1..6, 1..6, 40);
        // 检查床: 1x1x4 = 4
        fill(&mut data, 5..6, 9..10, 2..6, 300);
        let vol = CtVolume::from_array(data);

        let mask = segment_head(&vol, -800, Connectivity::Full26).unwrap();
        assert_eq!(mask.count(), 100);
        assert!(mask[(1, 1, 1)]);
        assert!(mask[(4, 5, 5)]);
        assert!(!mask[(5, 9, 3)]);
        assert_eq!(mask.shape(), vol.shape());
    }

    #[test]
    fn test_equal_size_tie_break_first_encountered() {
        let mut data = air((2, 6, 6));
        // 在行优先扫描中先遇到的区域 (左上).
        fill(&mut data, 0..2, 0..2, 0..2, 10);
        // 同样大小的第二个区域 (右下).
        fill(&mut data, 0..2, 4..6, 4..6, 20);
        let vol = CtVolume::from_array(data);

        let fg = binarize(&vol, -800);
        let comps = label_components(fg.view(), Connectivity::Full26);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps.size_of(1), Some(8));
        assert_eq!(comps.size_of(2), Some(8));
        assert_eq!(comps.labels()[(0, 0, 0)], 1);
        assert_eq!(comps.labels()[(0, 4, 4)], 2);
        assert_eq!(comps.largest(), Some(1));

        let mask = segment_head(&vol, -800, Connectivity::Full26).unwrap();
        assert!(mask[(1, 1, 1)]);
        assert!(!mask[(1, 5, 5)]);
        assert_eq!(mask.count(), 8);
    }

    #[test]
    fn test_diagonal_contact() {
        let mut data = air((1, 3, 3));
        data[(0, 0, 0)] = 0;
        data[(0, 1, 1)] = 0;
        data[(0, 2, 2)] = 0;
        let fg = binarize(&CtVolume::from_array(data), -800);

        let full = label_components(fg.view(), Connectivity::Full26);
        assert_eq!(full.len(), 1);
        assert_eq!(full.size_of(1), Some(3));

        let face = label_components(fg.view(), Connectivity::Face6);
        assert_eq!(face.len(), 3);
        assert_eq!(face.size_of(0), None);
        assert_eq!(face.size_of(4), None);
        assert_eq!(face.mask_of(2).iter().filter(|p| **p).count(), 1);
    }

    #[test]
    fn test_segmentation_idempotent() {
        let data = Array3::from_shape_fn((5, 7, 7), |(z, h, w)| {
            if (z + h * 3 + w * 7) % 5 < 2 {
                50
            } else {
                hu::AIR
            }
        });
        let vol = CtVolume::from_array(data);
        let a = segment_head(&vol, -800, Connectivity::Full26).unwrap();
        let b = segment_head(&vol, -800, Connectivity::Full26).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_offsets_len() {
        assert_eq!(Connectivity::Face6.offsets().len(), 6);
        assert_eq!(Connectivity::Full26.offsets().len(), 26);
        assert_eq!(Connectivity::default(), Connectivity::Full26);
    }
}
