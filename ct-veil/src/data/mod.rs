use std::ops::{Index, IndexMut};

use ndarray::{Array2, Array3, ArrayView3, ArrayViewMut3, Axis};

use crate::{Idx2d, Idx3d};

pub mod builder;
pub mod slice;
pub mod window;

pub use slice::VolumeSlice;

#[cfg(feature = "preview")]
pub use slice::ImgWriteVis;

pub use window::CtWindow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 三维网格数据 (体数据、掩码) 的共用属性.
///
/// 所有网格均按照 (z, 高, 宽) 模式访问, z 为切片顺序.
pub trait VoxelGrid {
    /// 获取数据形状大小.
    fn shape(&self) -> Idx3d;

    /// 获取水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }
}

#[inline]
fn shape_of<T>(data: &Array3<T>) -> Idx3d {
    data.dim()
}

/// 单张输入切片: HU 值二维网格、排序键 (扫描轴上的位置) 和不透明的元信息 `A`.
///
/// 元信息在输出时除像素数据外保持不变.
#[derive(Debug, Clone)]
pub struct CtSlice<A> {
    pixels: Array2<i16>,
    position: f64,
    attrs: A,
}

impl<A> CtSlice<A> {
    /// 直接创建切片.
    #[inline]
    pub fn new(pixels: Array2<i16>, position: f64, attrs: A) -> Self {
        Self {
            pixels,
            position,
            attrs,
        }
    }

    /// 像素 (HU) 网格.
    #[inline]
    pub fn pixels(&self) -> &Array2<i16> {
        &self.pixels
    }

    /// 切片在扫描轴上的位置, 用作排序键.
    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// 切片元信息.
    #[inline]
    pub fn attrs(&self) -> &A {
        &self.attrs
    }

    /// 切片的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.pixels.dim()
    }

    /// 拆分为 (像素, 位置, 元信息).
    #[inline]
    pub fn into_parts(self) -> (Array2<i16>, f64, A) {
        (self.pixels, self.position, self.attrs)
    }
}

/// 三维 CT 体数据, 体素值为 HU (`i16`).
///
/// 体数据由一次运行独占, 从不在运行之间共享.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CtVolume {
    data: Array3<i16>,
}

impl VoxelGrid for CtVolume {
    #[inline]
    fn shape(&self) -> Idx3d {
        shape_of(&self.data)
    }
}

impl Index<Idx3d> for CtVolume {
    type Output = i16;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for CtVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl From<Array3<i16>> for CtVolume {
    #[inline]
    fn from(data: Array3<i16>) -> Self {
        Self { data }
    }
}

impl CtVolume {
    /// 以 (z, 高, 宽) 排列的数组直接创建体数据.
    #[inline]
    pub fn from_array(data: Array3<i16>) -> Self {
        data.into()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, i16> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, i16> {
        self.data.view_mut()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<i16> {
        self.data
    }

    /// 获取第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> VolumeSlice<'_> {
        VolumeSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = VolumeSlice<'_>> {
        self.data.axis_iter(Axis(0)).map(VolumeSlice::new)
    }

    /// 按 z 升序拆分为拥有所有权的二维切片.
    pub fn into_slices(self) -> Vec<Array2<i16>> {
        self.data
            .axis_iter(Axis(0))
            .map(|s| s.to_owned())
            .collect()
    }
}

/// 头部二值掩码: `true` 代表属于头部的体素.
///
/// 由 [`crate::segment`] 计算, 每次运行重新计算, 从不持久化.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadMask {
    data: Array3<bool>,
}

impl VoxelGrid for HeadMask {
    #[inline]
    fn shape(&self) -> Idx3d {
        shape_of(&self.data)
    }
}

impl Index<Idx3d> for HeadMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl HeadMask {
    /// 直接由布尔数组创建掩码.
    #[inline]
    pub fn from_array(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 前景 (头部) 体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }
}

/// 保护掩码: 头部掩码膨胀后的结果.
///
/// 只能由 [`crate::morph`] 从 [`HeadMask`] 生成, 因此总满足
/// "保护掩码 ⊇ 头部掩码". 掩码值为 `true` 的体素在替换时原样保留.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectiveMask {
    data: Array3<bool>,
}

impl VoxelGrid for ProtectiveMask {
    #[inline]
    fn shape(&self) -> Idx3d {
        shape_of(&self.data)
    }
}

impl Index<Idx3d> for ProtectiveMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl ProtectiveMask {
    /// 仅供形态学模块使用.
    #[inline]
    pub(crate) fn new(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 保护体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 判断 `head` 的每个前景体素是否都被保护.
    pub fn covers(&self, head: &HeadMask) -> bool {
        self.shape() == head.shape()
            && self
                .data
                .iter()
                .zip(head.data.iter())
                .all(|(&guard, &inside)| guard || !inside)
    }

    /// 外壳体素个数, 即 "保护掩码 \ 头部掩码".
    pub fn shell_count(&self, head: &HeadMask) -> usize {
        debug_assert_eq!(self.shape(), head.shape());
        self.data
            .iter()
            .zip(head.data.iter())
            .filter(|(&guard, &inside)| guard && !inside)
            .count()
    }
}
