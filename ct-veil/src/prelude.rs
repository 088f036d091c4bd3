//! 🧣欢迎光临🎭
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::builder::{build_volume, SliceIndex};
pub use crate::data::window::CtWindow;
pub use crate::data::{CtSlice, CtVolume, HeadMask, ProtectiveMask, VolumeSlice, VoxelGrid};

#[cfg(feature = "preview")]
pub use crate::data::slice::ImgWriteVis;

pub use crate::consts::hu::{AIR, DEFAULT_AIR_THRESHOLD};

pub use crate::io::{DicomSeriesReader, DicomSeriesWriter, SliceReader, SliceWriter};
pub use crate::morph::{shape_protective_mask, Dilation, Kernel};
pub use crate::params::{DeidParams, PreviewWindow};
pub use crate::pipeline::{deidentify, deidentify_with, run, RunSummary};
pub use crate::segment::{segment_head, Connectivity};
pub use crate::substitute::{substitute, PoolWindow, Replacer};

pub use crate::{VeilError, VeilResult};
