#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对头部 CT 序列进行面部去识别化 (de-identification).
//!
//! 处理对象是一次头部 CT 检查的全部水平切片. 库将切片堆叠为三维体数据,
//! 以 HU 阈值分割出头部, 对头部掩码做形态学膨胀得到保护掩码,
//! 再将保护掩码以外的所有体素按替换策略改写, 最后按原切片逐张写回.
//! 切片的元信息 (除像素数据外) 保持不变.
//!
//! # 注意
//!
//! 1. 该 crate 只改写像素数据, 不处理任何身份相关的元信息字段.
//! 2. 整个流程是同步的, 只有圆盘膨胀在 `rayon` feature 下逐切片并行.
//!   多个检查可以由调用者并行地分别处理, 它们之间没有共享的可变状态.
//!
//! # 流程
//!
//! ### 体数据构建 ✅
//!
//! 按切片位置排序并堆叠, 同时保留 "体数据下标 -> 原切片元信息" 的映射.
//!
//! 实现位于 `ct-veil/src/data/builder.rs`.
//!
//! ### 头部分割 ✅
//!
//! 阈值二值化, 三维 26-连通 (可选 6-连通) 区域标记, 保留体素最多的区域.
//!
//! 实现位于 `ct-veil/src/segment.rs`.
//!
//! ### 保护掩码 ✅
//!
//! 对头部掩码进行膨胀. 膨胀 "保留区域" 等价于从内侧腐蚀 "丢弃区域".
//!
//! 实现位于 `ct-veil/src/morph`.
//!
//! ### 体素替换 ✅
//!
//! `face` / `air` / 整数常量三种策略. `face` 策略的随机源由调用者传入.
//!
//! 实现位于 `ct-veil/src/substitute.rs`.
//!
//! ### DICOM 读写 ✅
//!
//! 流程本身只依赖 `SliceReader` / `SliceWriter`, DICOM 是其中一种实现.
//!
//! 实现位于 `ct-veil/src/io`.
//!
//! ### 流程 ✅
//!
//! 暂存目录写出, 成功后重命名. 实现位于 `ct-veil/src/pipeline.rs`.
//!
//! ### 结果预览 ✅
//!
//! 以 CT 窗口将去识别化后的切片导出为 8-bit 灰度 PNG (`preview` feature).
//!
//! 实现位于 `ct-veil/src/data/slice/save.rs`.

/// 二维索引 (高, 宽).
pub type Idx2d = (usize, usize);

/// 三维索引 (z, 高, 宽).
pub type Idx3d = (usize, usize, usize);

/// 体数据、掩码与切片等基础数据结构.
mod data;

pub use data::builder::{build_volume, SliceIndex};
pub use data::{CtSlice, CtVolume, CtWindow, HeadMask, ProtectiveMask, VolumeSlice, VoxelGrid};

#[cfg(feature = "preview")]
pub use data::ImgWriteVis;

pub mod consts;

mod error;

pub use error::{VeilError, VeilResult};

pub mod io;
pub mod morph;
pub mod params;
pub mod pipeline;
pub mod prelude;
pub mod segment;
pub mod substitute;

pub use pipeline::{deidentify, deidentify_with};
