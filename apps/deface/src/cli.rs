use clap::{Parser, ValueEnum};
use ct_veil::consts::{hu, morph};
use ct_veil::prelude::*;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "deface")]
#[command(version, about = "Remove facial features from a head CT series", long_about = None)]
pub struct Cli {
    /// Directory holding the DICOM slices of one scan
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output directory (defaults to INPUT with a `_d` suffix)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Replacement policy: `face`, `air` or an integer HU value
    #[arg(short, long, value_name = "POLICY", default_value = "face", allow_hyphen_values = true)]
    pub replacer: String,

    /// Air/tissue threshold in HU
    #[arg(long, value_name = "HU", default_value_t = hu::DEFAULT_AIR_THRESHOLD, allow_negative_numbers = true)]
    pub threshold: i16,

    /// Structuring element used to grow the head mask
    #[arg(long, value_enum, default_value_t = KernelArg::Disc)]
    pub kernel: KernelArg,

    /// Disc diameter or ball radius, in voxels
    #[arg(long, value_name = "N", default_value_t = morph::DEFAULT_DISC_DIAMETER)]
    pub size: usize,

    /// Number of dilation passes
    #[arg(long, value_name = "N", default_value_t = morph::DEFAULT_ITERATIONS)]
    pub iterations: usize,

    /// Voxel adjacency used to find the head
    #[arg(long, value_enum, default_value_t = ConnectivityArg::Full)]
    pub connectivity: ConnectivityArg,

    /// Restrict `face` sampling to an open HU range, `MIN,MAX` or `skin-fat`
    #[arg(long, value_name = "MIN,MAX", allow_hyphen_values = true)]
    pub pool_window: Option<String>,

    /// Seed for the `face` sampler
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Also export the de-identified slices as PNG into this directory
    #[arg(long, value_name = "DIR")]
    pub preview: Option<PathBuf>,

    /// CT window for the preview images
    #[arg(long, value_enum, default_value_t = WindowArg::SoftTissue)]
    pub preview_window: WindowArg,

    /// Log every stage
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum KernelArg {
    /// Per-slice disc, sized by diameter
    Disc,
    /// 3D ball, sized by radius
    Ball,
    /// 3D six-neighbour cross, size ignored
    Cross,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConnectivityArg {
    /// Face neighbours only
    #[value(name = "6")]
    Face,
    /// Face, edge and corner neighbours
    #[value(name = "26")]
    Full,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WindowArg {
    SoftTissue,
    Brain,
    Bone,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }

    pub fn kernel(&self) -> Kernel {
        match self.kernel {
            KernelArg::Disc => Kernel::Disc {
                diameter: self.size,
            },
            KernelArg::Ball => Kernel::Ball { radius: self.size },
            KernelArg::Cross => Kernel::Cross,
        }
    }

    pub fn pool_window(&self) -> VeilResult<Option<PoolWindow>> {
        let Some(s) = self.pool_window.as_deref() else {
            return Ok(None);
        };
        if s.eq_ignore_ascii_case("skin-fat") {
            return Ok(Some(PoolWindow::skin_fat()));
        }
        let invalid = || VeilError::InvalidConfig(format!("invalid pool window `{s}`"));
        let (min, max) = s.split_once(',').ok_or_else(invalid)?;
        let min = min.trim().parse().map_err(|_| invalid())?;
        let max = max.trim().parse().map_err(|_| invalid())?;
        PoolWindow::new(min, max).map(Some).ok_or_else(invalid)
    }

    pub fn params(&self) -> VeilResult<DeidParams> {
        let mut params = DeidParams::default()
            .with_replacer(self.replacer.parse()?)
            .with_air_threshold(self.threshold)
            .with_connectivity(match self.connectivity {
                ConnectivityArg::Face => Connectivity::Face6,
                ConnectivityArg::Full => Connectivity::Full26,
            })
            .with_dilation(self.kernel(), self.iterations)
            .with_pool_window(self.pool_window()?)
            .with_seed(self.seed)
            .with_progress(!self.no_progress && !self.quiet);
        if let Some(dir) = &self.preview {
            let window = match self.preview_window {
                WindowArg::SoftTissue => PreviewWindow::SoftTissue,
                WindowArg::Brain => PreviewWindow::Brain,
                WindowArg::Bone => PreviewWindow::Bone,
            };
            params = params.with_preview(dir.clone(), window);
        }
        params.validate()?;
        Ok(params)
    }
}
