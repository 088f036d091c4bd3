//! 去识别化流程.
//!
//! `读取 -> 构建体数据 -> 头部分割 -> 保护掩码 -> 体素替换 -> 写出 -> 报告`
//!
//! 各阶段严格串行, 任何一个阶段失败都会中止整次运行, 不做重试.
//! 输出先写入目标目录旁的临时目录, 全部切片写完后才被重命名为目标目录.
//! 因此失败的运行不会在目标路径留下任何目录. 预览图在写出之前导出,
//! 写出失败时一并删除.

use crate::consts::output::DEFAULT_SUFFIX;
use crate::data::VoxelGrid;
use crate::io::{DicomSeriesReader, DicomSeriesWriter, SliceReader, SliceWriter};
use crate::morph::shape_protective_mask;
use crate::params::DeidParams;
use crate::segment::segment_head;
use crate::substitute::{substitute, Replacer};
use crate::{build_volume, CtVolume, Idx3d, VeilError, VeilResult};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// 阶段个数 (不含报告).
const STAGES: u64 = 6;

/// 一次运行的统计信息.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// 输出目录.
    pub output: PathBuf,

    /// 体数据形状 (z, 高, 宽), z 即写出的切片个数.
    pub shape: Idx3d,

    /// 头部体素个数.
    pub head_voxels: usize,

    /// 保护体素个数.
    pub protected_voxels: usize,

    /// 被改写的体素个数.
    pub replaced_voxels: usize,

    /// `face` 策略下采样池的大小.
    pub pool_size: Option<usize>,

    /// 总耗时.
    pub elapsed: Duration,
}

impl RunSummary {
    /// 写出的切片个数.
    #[inline]
    pub fn slices(&self) -> usize {
        self.shape.0
    }
}

/// 对 `in_path` 目录下的 DICOM 序列去识别化.
///
/// `out_path` 缺省为 `in_path` 后加 `_d`. `replacer` 取 `face`, `air` 或整数 HU 值,
/// 非法时在读取任何文件之前返回 [`VeilError::InvalidPolicy`].
/// 其余参数取默认值, 且不显示进度条.
pub fn deidentify(in_path: &Path, out_path: Option<&Path>, replacer: &str) -> VeilResult<()> {
    let replacer: Replacer = replacer.parse()?;
    let params = DeidParams::default()
        .with_replacer(replacer)
        .with_progress(false);
    deidentify_with(in_path, out_path, &params).map(|_| ())
}

/// 以给定参数对 `in_path` 目录下的 DICOM 序列去识别化.
///
/// # 错误
///
/// 1. 输出路径与输入路径相同时返回 [`VeilError::InvalidConfig`].
/// 2. 输出目录已存在且非空时返回 [`VeilError::OutputNotEmpty`].
/// 3. 其余错误见 [`run`].
pub fn deidentify_with(
    in_path: &Path,
    out_path: Option<&Path>,
    params: &DeidParams,
) -> VeilResult<RunSummary> {
    let out_dir = match out_path {
        Some(p) => p.to_path_buf(),
        None => default_output(in_path),
    };
    if same_path(in_path, &out_dir) {
        return Err(VeilError::InvalidConfig(format!(
            "输出目录 `{}` 不能与输入目录相同",
            out_dir.display()
        )));
    }
    run(
        &DicomSeriesReader::new(in_path),
        &DicomSeriesWriter,
        &out_dir,
        params,
    )
}

/// 默认输出目录: 输入路径后加 `_d`.
pub fn default_output(in_path: &Path) -> PathBuf {
    // 去掉末尾的路径分隔符.
    let mut s = in_path.components().as_path().as_os_str().to_owned();
    s.push(DEFAULT_SUFFIX);
    PathBuf::from(s)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.components().eq(b.components()),
    }
}

/// 以任意的读写实现执行完整流程.
///
/// # 错误
///
/// 各阶段的错误原样返回. 写出阶段失败时, 已写出的部分会被删除.
pub fn run<R, W>(
    reader: &R,
    writer: &W,
    out_dir: &Path,
    params: &DeidParams,
) -> VeilResult<RunSummary>
where
    R: SliceReader + ?Sized,
    W: SliceWriter<R::Attrs> + ?Sized,
{
    let start = Instant::now();
    params.validate()?;
    let staging = check_target(out_dir)?;
    check_preview(params, out_dir, &staging)?;
    let pb = progress_bar(params.progress);

    pb.set_message("reading");
    let slices = reader.read_slices()?;
    pb.inc(1);

    pb.set_message("stacking");
    let (volume, index) = build_volume(slices)?;
    pb.inc(1);

    pb.set_message("segmenting");
    let head = segment_head(&volume, params.air_threshold, params.connectivity)?;
    pb.inc(1);

    pb.set_message("dilating");
    let protective = shape_protective_mask(&head, &params.dilation)?;
    pb.inc(1);

    pb.set_message("replacing");
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let (volume, report) = substitute(
        &volume,
        &head,
        &protective,
        params.replacer,
        params.pool_window,
        &mut rng,
    )?;
    let previews = export_preview(&volume, params)?;
    pb.inc(1);

    pb.set_message("writing");
    let shape = volume.shape();
    if let Err(e) = write_staged(writer, &staging, out_dir, index.pair_with(volume)) {
        previews.discard();
        return Err(e);
    }
    pb.inc(1);
    pb.finish_and_clear();

    let summary = RunSummary {
        output: out_dir.to_path_buf(),
        shape,
        head_voxels: head.count(),
        protected_voxels: protective.count(),
        replaced_voxels: report.replaced,
        pool_size: report.pool_size,
        elapsed: start.elapsed(),
    };
    log::info!(
        "De-identified {} slice(s) into `{}` in {:.2?}",
        summary.slices(),
        out_dir.display(),
        summary.elapsed
    );
    Ok(summary)
}

fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(STAGES);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg:>10} [{bar:30}] {pos}/{len}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// 检查输出目录, 返回临时目录的路径.
fn check_target(out_dir: &Path) -> VeilResult<PathBuf> {
    let Some(name) = out_dir.file_name() else {
        return Err(VeilError::InvalidConfig(format!(
            "`{}` 不能作为输出目录",
            out_dir.display()
        )));
    };
    if out_dir.is_file() {
        return Err(VeilError::InvalidConfig(format!(
            "输出路径 `{}` 是一个文件",
            out_dir.display()
        )));
    }
    if out_dir.is_dir() {
        let mut entries = fs::read_dir(out_dir).map_err(|e| VeilError::io(out_dir, e))?;
        if entries.next().is_some() {
            return Err(VeilError::OutputNotEmpty(out_dir.to_path_buf()));
        }
    }

    let mut staging = name.to_owned();
    staging.push(".partial");
    let mut hidden = std::ffi::OsString::from(".");
    hidden.push(staging);
    Ok(out_dir.with_file_name(hidden))
}

/// 预览目录不能位于输出目录或临时目录之内.
fn check_preview(params: &DeidParams, out_dir: &Path, staging: &Path) -> VeilResult<()> {
    let Some((dir, _)) = &params.preview else {
        return Ok(());
    };
    let preview = absolute(dir)?;
    for target in [out_dir, staging] {
        if preview.starts_with(absolute(target)?) {
            return Err(VeilError::InvalidConfig(format!(
                "预览目录 `{}` 不能位于输出目录 `{}` 之内",
                dir.display(),
                out_dir.display()
            )));
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> VeilResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| VeilError::io(path, e))?;
    Ok(cwd.join(path))
}

/// 写入 `staging`, 成功后重命名为 `out_dir`. 失败时删除 `staging`.
fn write_staged<A, W>(
    writer: &W,
    staging: &Path,
    out_dir: &Path,
    slices: Vec<(ndarray::Array2<i16>, A)>,
) -> VeilResult<usize>
where
    W: SliceWriter<A> + ?Sized,
{
    if staging.exists() {
        log::warn!("Removing stale staging directory `{}`", staging.display());
        fs::remove_dir_all(staging).map_err(|e| VeilError::io(staging, e))?;
    }
    fs::create_dir_all(staging).map_err(|e| VeilError::io(staging, e))?;

    let result = writer.write_slices(staging, slices).and_then(|n| {
        if out_dir.is_dir() {
            fs::remove_dir(out_dir).map_err(|e| VeilError::io(out_dir, e))?;
        }
        fs::rename(staging, out_dir).map_err(|e| VeilError::io(out_dir, e))?;
        Ok(n)
    });

    if result.is_err() {
        if let Err(e) = fs::remove_dir_all(staging) {
            log::warn!(
                "Failed to remove staging directory `{}`: {e}",
                staging.display()
            );
        }
    }
    result
}

/// 本次运行导出的预览图.
#[derive(Debug, Default)]
struct Previews {
    /// 本次运行新建的最上层目录.
    created: Option<PathBuf>,
    files: Vec<PathBuf>,
}

impl Previews {
    /// 删除本次运行导出的全部文件以及新建的目录.
    fn discard(self) {
        if let Some(dir) = &self.created {
            if let Err(e) = fs::remove_dir_all(dir) {
                log::warn!("Failed to remove preview directory `{}`: {e}", dir.display());
            }
            return;
        }
        for path in &self.files {
            match fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    log::warn!("Failed to remove preview `{}`: {e}", path.display());
                }
                _ => {}
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "preview")] {
        use crate::ImgWriteVis;

        /// 将去识别化后的切片按 z 顺序导出为 `slice_{z}.png`.
        ///
        /// 中途失败时删除已导出的文件.
        fn export_preview(volume: &CtVolume, params: &DeidParams) -> VeilResult<Previews> {
            let Some((dir, window)) = &params.preview else {
                return Ok(Previews::default());
            };
            let mut previews = Previews {
                created: dir
                    .ancestors()
                    .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
                    .last()
                    .map(Path::to_path_buf),
                files: Vec::with_capacity(volume.len_z()),
            };
            if let Err(e) = fs::create_dir_all(dir) {
                previews.discard();
                return Err(VeilError::io(dir, e));
            }
            for (z, s) in volume.slice_iter().enumerate() {
                let path = dir.join(format!("slice_{z:04}.png"));
                previews.files.push(path.clone());
                if let Err(source) = s.save_with(&path, (*window).into()) {
                    previews.discard();
                    return Err(VeilError::Preview { path, source });
                }
            }
            log::debug!("Exported {} preview(s) to `{}`", volume.len_z(), dir.display());
            Ok(previews)
        }
    } else {
        fn export_preview(_volume: &CtVolume, params: &DeidParams) -> VeilResult<Previews> {
            if params.preview.is_some() {
                log::warn!("Preview export requested, but the `preview` feature is disabled");
            }
            Ok(Previews::default())
        }
    }
}
