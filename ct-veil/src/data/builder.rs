//! 体数据构建: 将同一检查的二维切片堆叠为三维体数据.

use super::{CtSlice, CtVolume, VoxelGrid};
use crate::{VeilError, VeilResult};
use itertools::Itertools;
use ndarray::{Array2, Array3, Axis};
use ordered_float::OrderedFloat;

/// 体数据下标到原切片元信息的映射.
///
/// 第 `z` 个元素即体数据第 `z` 层切片的元信息.
#[derive(Debug, Clone)]
pub struct SliceIndex<A> {
    attrs: Vec<A>,
    positions: Vec<f64>,
}

impl<A> SliceIndex<A> {
    /// 切片个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// 是否为空. 由 [`build_volume`] 得到的映射总是非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// 第 `z_index` 层切片的元信息. 越界时返回 `None`.
    #[inline]
    pub fn attrs_at(&self, z_index: usize) -> Option<&A> {
        self.attrs.get(z_index)
    }

    /// 第 `z_index` 层切片的排序键. 越界时返回 `None`.
    #[inline]
    pub fn position_at(&self, z_index: usize) -> Option<f64> {
        self.positions.get(z_index).copied()
    }

    /// 将体数据拆分回二维切片, 并与原元信息逐一配对.
    ///
    /// 如果 `volume` 的切片数与映射不符, 则程序 panic.
    pub fn pair_with(self, volume: CtVolume) -> Vec<(Array2<i16>, A)> {
        assert_eq!(volume.len_z(), self.len(), "体数据与切片映射长度不一致");
        volume.into_slices().into_iter().zip(self.attrs).collect()
    }
}

/// 将切片按排序键升序堆叠为 (z, 高, 宽) 体数据.
///
/// 排序是稳定的, 排序键相同的切片保持输入顺序. 所有切片必须具有相同的二维形状.
///
/// # 错误
///
/// 1. `slices` 为空时返回 [`VeilError::NoSlices`] (路径为空).
/// 2. 形状不一致时返回 [`VeilError::InputShape`], 此时不会构建任何体数据.
pub fn build_volume<A>(slices: Vec<CtSlice<A>>) -> VeilResult<(CtVolume, SliceIndex<A>)> {
    let slices: Vec<CtSlice<A>> = slices
        .into_iter()
        .sorted_by_key(|s| OrderedFloat(s.position()))
        .collect();

    let Some(expected) = slices.first().map(CtSlice::shape) else {
        return Err(VeilError::NoSlices(Default::default()));
    };
    if let Some((index, found)) = slices
        .iter()
        .map(CtSlice::shape)
        .enumerate()
        .find(|(_, sh)| *sh != expected)
    {
        return Err(VeilError::InputShape {
            index,
            expected,
            found,
        });
    }

    let (h, w) = expected;
    let mut data = Array3::<i16>::zeros((slices.len(), h, w));
    let mut attrs = Vec::with_capacity(slices.len());
    let mut positions = Vec::with_capacity(slices.len());

    for (mut dst, sli) in data.axis_iter_mut(Axis(0)).zip(slices) {
        let (pixels, position, a) = sli.into_parts();
        dst.assign(&pixels);
        attrs.push(a);
        positions.push(position);
    }
    log::debug!("Built volume of shape {:?}", data.dim());

    Ok((CtVolume::from_array(data), SliceIndex { attrs, positions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sli(v: i16, position: f64, tag: &'static str) -> CtSlice<&'static str> {
        CtSlice::new(Array2::from_elem((2, 3), v), position, tag)
    }

    #[test]
    fn test_build_sorted_by_position() {
        let slices = vec![sli(3, 7.5, "c"), sli(1, -2.0, "a"), sli(2, 0.0, "b")];
        let (vol, index) = build_volume(slices).unwrap();

        assert_eq!(vol.shape(), (3, 2, 3));
        assert_eq!(vol[(0, 0, 0)], 1);
        assert_eq!(vol[(1, 1, 2)], 2);
        assert_eq!(vol[(2, 0, 1)], 3);
        assert_eq!(index.attrs_at(0), Some(&"a"));
        assert_eq!(index.attrs_at(2), Some(&"c"));
        assert_eq!(index.position_at(1), Some(0.0));
        assert_eq!(index.attrs_at(3), None);
    }

    #[test]
    fn test_equal_positions_keep_input_order() {
        let slices = vec![sli(0, 1.0, "first"), sli(0, 1.0, "second")];
        let (_, index) = build_volume(slices).unwrap();
        assert_eq!(index.attrs_at(0), Some(&"first"));
        assert_eq!(index.attrs_at(1), Some(&"second"));
    }

    #[test]
    fn test_shape_mismatch() {
        let slices = vec![
            sli(0, 0.0, "a"),
            CtSlice::new(Array2::zeros((3, 2)), 1.0, "b"),
        ];
        match build_volume(slices) {
            Err(VeilError::InputShape {
                index,
                expected,
                found,
            }) => {
                assert_eq!(index, 1);
                assert_eq!(expected, (2, 3));
                assert_eq!(found, (3, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let r = build_volume::<()>(vec![]);
        assert!(matches!(r, Err(VeilError::NoSlices(_))));
    }

    #[test]
    fn test_decompose_recovers_slices() {
        let a = array![[1i16, 2], [3, 4]];
        let b = array![[5i16, 6], [7, 8]];
        let slices = vec![
            CtSlice::new(b.clone(), 2.0, 20u32),
            CtSlice::new(a.clone(), 1.0, 10u32),
        ];
        let (vol, index) = build_volume(slices).unwrap();
        let pairs = index.pair_with(vol);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], (a, 10));
        assert_eq!(pairs[1], (b, 20));
    }
}
