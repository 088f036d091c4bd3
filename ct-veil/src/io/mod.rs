//! 切片读写.
//!
//! 流程只依赖 [`SliceReader`] 与 [`SliceWriter`] 两个 trait,
//! 具体的文件格式由实现者决定. [`dicom`] 模块提供 DICOM 序列的实现.

use crate::{CtSlice, VeilResult};
use ndarray::Array2;
use std::path::Path;

pub mod dicom;

pub use dicom::{DicomAttrs, DicomSeriesReader, DicomSeriesWriter};

/// 切片来源.
pub trait SliceReader {
    /// 切片元信息类型, 在流程中原样传递给 [`SliceWriter`].
    type Attrs;

    /// 读取一次检查的全部切片. 返回顺序任意, 由体数据构建阶段排序.
    fn read_slices(&self) -> VeilResult<Vec<CtSlice<Self::Attrs>>>;
}

/// 切片去向.
pub trait SliceWriter<A> {
    /// 将 `slices` 逐张写入 `out_dir`, 返回写入的切片个数.
    ///
    /// `slices` 已按体数据 z 升序排列. 调用者保证 `out_dir` 已存在.
    fn write_slices(&self, out_dir: &Path, slices: Vec<(Array2<i16>, A)>) -> VeilResult<usize>;
}
