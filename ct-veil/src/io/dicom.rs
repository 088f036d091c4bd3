//! DICOM 序列读写.
//!
//! 只支持未压缩、小端序、单通道 16-bit 的切片. 其它文件在读取时被跳过并记录警告.

use super::{SliceReader, SliceWriter};
use crate::consts::{hu::OUTSIDE_SCAN_PADDING, output::FILE_PREFIX};
use crate::{CtSlice, VeilError, VeilResult};
use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::{open_file, DefaultDicomObject};
use ndarray::{Array2, ArrayView2};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 隐式 VR 小端序.
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";

/// 显式 VR 小端序.
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

/// 单个文件不可用的原因. 只用于日志.
#[derive(Debug, Error)]
enum Unusable {
    #[error("not a readable DICOM file ({0})")]
    NotDicom(String),

    #[error("unsupported transfer syntax `{0}`")]
    TransferSyntax(String),

    #[error("missing or malformed {0}")]
    Missing(&'static str),

    #[error("{0}")]
    Unsupported(String),
}

/// DICOM 切片的元信息: 原始数据集及像素换算参数.
///
/// 写出时只替换 Pixel Data, 数据集中的其它元素保持不变.
#[derive(Debug, Clone)]
pub struct DicomAttrs {
    object: DefaultDicomObject,
    source: PathBuf,
    slope: f64,
    intercept: f64,
    signed: bool,
}

impl DicomAttrs {
    /// 原始数据集.
    #[inline]
    pub fn object(&self) -> &DefaultDicomObject {
        &self.object
    }

    /// 来源文件路径.
    #[inline]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Rescale Slope.
    #[inline]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Rescale Intercept.
    #[inline]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// 存储值是否为有符号整数 (Pixel Representation = 1).
    #[inline]
    pub fn signed(&self) -> bool {
        self.signed
    }

    /// 存储值到 HU.
    ///
    /// 扫描范围外的填充值 -2000 先被置为 0, 再按 `stored * slope + intercept` 换算,
    /// 结果饱和到 `i16`.
    #[inline]
    pub fn to_hu(&self, stored: i32) -> i16 {
        let stored = if stored == OUTSIDE_SCAN_PADDING as i32 {
            0
        } else {
            stored
        };
        saturate(stored as f64 * self.slope + self.intercept, i16::MIN, i16::MAX) as i16
    }

    /// HU 到存储值, 四舍五入并饱和到存储类型的范围.
    #[inline]
    pub fn to_stored(&self, hu: i16) -> i32 {
        let v = (hu as f64 - self.intercept) / self.slope;
        if self.signed {
            saturate(v, i16::MIN, i16::MAX)
        } else {
            saturate(v, u16::MIN, u16::MAX)
        }
    }

    /// 将一张 HU 切片编码为小端序的 Pixel Data.
    fn encode(&self, pixels: ArrayView2<'_, i16>) -> Vec<u8> {
        let mut buf = Vec::with_capacity(pixels.len() * 2);
        for &hu in pixels.iter() {
            let stored = self.to_stored(hu);
            if self.signed {
                buf.extend_from_slice(&(stored as i16).to_le_bytes());
            } else {
                buf.extend_from_slice(&(stored as u16).to_le_bytes());
            }
        }
        buf
    }
}

#[inline]
fn saturate<T: Into<f64>>(v: f64, min: T, max: T) -> i32 {
    v.round().clamp(min.into(), max.into()) as i32
}

/// 读取目录下全部 DICOM 切片.
///
/// 子目录被忽略. 不可用的文件被跳过, 并以 `warn` 级别记录原因.
#[derive(Debug, Clone)]
pub struct DicomSeriesReader {
    dir: PathBuf,
}

impl DicomSeriesReader {
    /// 以 `dir` 为输入目录.
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 输入目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SliceReader for DicomSeriesReader {
    type Attrs = DicomAttrs;

    fn read_slices(&self) -> VeilResult<Vec<CtSlice<DicomAttrs>>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| VeilError::io(&self.dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| VeilError::io(&self.dir, e))?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut slices = Vec::with_capacity(paths.len());
        for path in paths {
            match read_slice(&path) {
                Ok(s) => slices.push(s),
                Err(reason) => log::warn!("Skipping `{}`: {reason}", path.display()),
            }
        }

        if slices.is_empty() {
            return Err(VeilError::NoSlices(self.dir.clone()));
        }
        log::debug!(
            "Read {} slice(s) from `{}`",
            slices.len(),
            self.dir.display()
        );
        Ok(slices)
    }
}

fn u16_of(obj: &DefaultDicomObject, tag: Tag, name: &'static str) -> Result<u16, Unusable> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok())
        .ok_or(Unusable::Missing(name))
}

fn f64_of(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

/// 扫描轴上的位置: Image Position (Patient) 的 z 分量, 缺失时取 Slice Location.
fn position_of(obj: &DefaultDicomObject) -> Option<f64> {
    obj.element(tags::IMAGE_POSITION_PATIENT)
        .ok()
        .and_then(|e| e.to_multi_float64().ok())
        .and_then(|v| v.get(2).copied())
        .or_else(|| f64_of(obj, tags::SLICE_LOCATION))
}

fn read_slice(path: &Path) -> Result<CtSlice<DicomAttrs>, Unusable> {
    let object = open_file(path).map_err(|e| Unusable::NotDicom(e.to_string()))?;

    let ts = object.meta().transfer_syntax().trim_end_matches('\0');
    if ts != IMPLICIT_VR_LE && ts != EXPLICIT_VR_LE {
        return Err(Unusable::TransferSyntax(ts.to_string()));
    }

    let samples = u16_or(&object, tags::SAMPLES_PER_PIXEL, "Samples per Pixel", 1)?;
    if samples != 1 {
        return Err(Unusable::Unsupported(format!("{samples} samples per pixel")));
    }
    let bits = u16_of(&object, tags::BITS_ALLOCATED, "Bits Allocated")?;
    if bits != 16 {
        return Err(Unusable::Unsupported(format!("{bits} bits allocated")));
    }
    let signed = u16_or(&object, tags::PIXEL_REPRESENTATION, "Pixel Representation", 0)? == 1;
    let rows = u16_of(&object, tags::ROWS, "Rows")? as usize;
    let cols = u16_of(&object, tags::COLUMNS, "Columns")? as usize;

    let slope = f64_of(&object, tags::RESCALE_SLOPE).unwrap_or(1.0);
    let intercept = f64_of(&object, tags::RESCALE_INTERCEPT).unwrap_or(0.0);
    if slope == 0.0 || !slope.is_finite() || !intercept.is_finite() {
        return Err(Unusable::Unsupported(format!(
            "rescale slope {slope}, intercept {intercept}"
        )));
    }
    let position = position_of(&object).ok_or(Unusable::Missing("slice position"))?;

    let attrs = DicomAttrs {
        object,
        source: path.to_path_buf(),
        slope,
        intercept,
        signed,
    };

    let bytes = attrs
        .object
        .element(tags::PIXEL_DATA)
        .ok()
        .and_then(|e| e.to_bytes().ok())
        .ok_or(Unusable::Missing("Pixel Data"))?;
    let n = rows * cols;
    if bytes.len() < n * 2 {
        return Err(Unusable::Unsupported(format!(
            "pixel data has {} byte(s), expected {}",
            bytes.len(),
            n * 2
        )));
    }

    let hu: Vec<i16> = bytes
        .chunks_exact(2)
        .take(n)
        .map(|b| {
            let stored = if signed {
                i16::from_le_bytes([b[0], b[1]]) as i32
            } else {
                u16::from_le_bytes([b[0], b[1]]) as i32
            };
            attrs.to_hu(stored)
        })
        .collect();
    let pixels = Array2::from_shape_vec((rows, cols), hu)
        .map_err(|e| Unusable::Unsupported(e.to_string()))?;

    Ok(CtSlice::new(pixels, position, attrs))
}

/// 读取可选的 `u16` 元素, 缺失时取 `default`.
fn u16_or(
    obj: &DefaultDicomObject,
    tag: Tag,
    name: &'static str,
    default: u16,
) -> Result<u16, Unusable> {
    match obj.element(tag) {
        Ok(e) => e.to_int::<u16>().map_err(|_| Unusable::Missing(name)),
        Err(_) => Ok(default),
    }
}

/// 将切片写为 DICOM 文件 `new_image_{i}.dcm`, `i` 为体数据中的 z 下标.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomSeriesWriter;

impl SliceWriter<DicomAttrs> for DicomSeriesWriter {
    fn write_slices(
        &self,
        out_dir: &Path,
        slices: Vec<(Array2<i16>, DicomAttrs)>,
    ) -> VeilResult<usize> {
        let total = slices.len();
        for (i, (pixels, attrs)) in slices.into_iter().enumerate() {
            let path = out_dir.join(format!("{FILE_PREFIX}{i}.dcm"));
            let bytes = attrs.encode(pixels.view());
            let mut object = attrs.object;
            object.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::from(bytes),
            ));
            object
                .write_to_file(&path)
                .map_err(|e| VeilError::dicom(&path, e))?;
        }
        log::debug!("Wrote {total} slice(s) to `{}`", out_dir.display());
        Ok(total)
    }
}
