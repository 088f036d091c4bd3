//! 体素替换.
//!
//! 保护掩码以外的体素按替换策略改写, 保护掩码以内的体素原样保留.

use crate::consts::hu;
use crate::data::VoxelGrid;
use crate::{CtVolume, HeadMask, ProtectiveMask, VeilError, VeilResult};
use ndarray::Zip;
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 替换策略. 每次运行开始时选定, 之后不可变.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Replacer {
    /// 从皮肤/脂肪外壳的 HU 值中有放回地均匀随机抽取.
    #[default]
    Face,

    /// 以空气 (-1000 HU) 填充.
    Air,

    /// 以给定 HU 值填充.
    Constant(i16),
}

impl FromStr for Replacer {
    type Err = VeilError;

    /// 接受 `face`, `air` (不区分大小写) 或 i16 范围内的整数.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("face") {
            Ok(Replacer::Face)
        } else if t.eq_ignore_ascii_case("air") {
            Ok(Replacer::Air)
        } else {
            t.parse::<i16>()
                .map(Replacer::Constant)
                .map_err(|_| VeilError::InvalidPolicy(s.to_string()))
        }
    }
}

impl fmt::Display for Replacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacer::Face => f.write_str("face"),
            Replacer::Air => f.write_str("air"),
            Replacer::Constant(c) => write!(f, "{c}"),
        }
    }
}

/// 采样池的 HU 开区间 `(min, max)`.
///
/// 以 `(min, max)` 二元组序列化, 反序列化时同样要求 `min < max`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "(i16, i16)", into = "(i16, i16)"))]
pub struct PoolWindow {
    min: i16,
    max: i16,
}

impl PoolWindow {
    /// 构建开区间. 要求 `min < max`, 否则返回 `None`.
    pub fn new(min: i16, max: i16) -> Option<Self> {
        (min < max).then_some(Self { min, max })
    }

    /// 皮肤及皮下脂肪的常见范围 (-125, 50).
    #[inline]
    pub const fn skin_fat() -> Self {
        Self {
            min: hu::SKIN_FAT_MIN,
            max: hu::SKIN_FAT_MAX,
        }
    }

    /// 开区间下界.
    #[inline]
    pub fn min(&self) -> i16 {
        self.min
    }

    /// 开区间上界.
    #[inline]
    pub fn max(&self) -> i16 {
        self.max
    }

    /// `value` 是否严格位于区间内.
    #[inline]
    pub fn contains(&self, value: i16) -> bool {
        self.min < value && value < self.max
    }
}

impl TryFrom<(i16, i16)> for PoolWindow {
    type Error = VeilError;

    fn try_from((min, max): (i16, i16)) -> Result<Self, Self::Error> {
        Self::new(min, max).ok_or_else(|| {
            VeilError::InvalidConfig(format!("采样区间 ({min}, {max}) 要求 min < max"))
        })
    }
}

impl From<PoolWindow> for (i16, i16) {
    #[inline]
    fn from(w: PoolWindow) -> Self {
        (w.min, w.max)
    }
}

/// `face` 策略的采样池: 外壳 (保护掩码 \ 头部掩码) 中出现过的不同 HU 值, 升序.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IntensityPool {
    values: Vec<i16>,
}

impl IntensityPool {
    /// 从当前体数据的外壳中收集采样池. 若给定 `window`, 只保留落在其中的值.
    pub fn from_shell(
        volume: &CtVolume,
        head: &HeadMask,
        protective: &ProtectiveMask,
        window: Option<PoolWindow>,
    ) -> Self {
        let mut set = BTreeSet::new();
        Zip::from(volume.data())
            .and(head.data())
            .and(protective.data())
            .for_each(|&hu, &inside, &guard| {
                if guard && !inside && window.map_or(true, |w| w.contains(hu)) {
                    set.insert(hu);
                }
            });
        Self {
            values: set.into_iter().collect(),
        }
    }

    /// 升序排列的全部候选值.
    #[inline]
    pub fn values(&self) -> &[i16] {
        &self.values
    }

    /// 候选值个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 采样池是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `value` 是否在采样池中.
    #[inline]
    pub fn contains(&self, value: i16) -> bool {
        self.values.binary_search(&value).is_ok()
    }

    /// 均匀随机抽取一个候选值. 采样池为空时返回 `None`.
    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<i16> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values[rng.gen_range(0..self.values.len())])
    }
}

/// 一次替换的统计信息.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SubstitutionReport {
    /// 被改写的体素个数.
    pub replaced: usize,

    /// `face` 策略下采样池的大小, 其它策略为 `None`.
    pub pool_size: Option<usize>,
}

/// 改写保护掩码以外的全部体素, 返回新的体数据.
///
/// 保护掩码以内的体素 (包括整个头部) 逐位保留. 只有 `Replacer::Face` 会使用 `rng`.
///
/// # 错误
///
/// `Replacer::Face` 且采样池为空时返回 [`VeilError::EmptyPool`], 此时不会改写任何体素.
///
/// # 注意
///
/// 三者形状必须一致, 否则程序 panic.
pub fn substitute<R: Rng + ?Sized>(
    volume: &CtVolume,
    head: &HeadMask,
    protective: &ProtectiveMask,
    replacer: Replacer,
    window: Option<PoolWindow>,
    rng: &mut R,
) -> VeilResult<(CtVolume, SubstitutionReport)> {
    assert_eq!(volume.shape(), head.shape(), "体数据与头部掩码形状不一致");
    assert_eq!(volume.shape(), protective.shape(), "体数据与保护掩码形状不一致");

    let mut out = volume.clone();
    let mut replaced = 0usize;

    let pool_size = match replacer {
        Replacer::Face => {
            let pool = IntensityPool::from_shell(volume, head, protective, window);
            if pool.is_empty() {
                return Err(VeilError::EmptyPool);
            }
            let values = pool.values();
            Zip::from(out.data_mut())
                .and(protective.data())
                .for_each(|hu, &guard| {
                    if !guard {
                        *hu = values[rng.gen_range(0..values.len())];
                        replaced += 1;
                    }
                });
            Some(pool.len())
        }
        Replacer::Air | Replacer::Constant(_) => {
            let fill = match replacer {
                Replacer::Constant(c) => c,
                _ => hu::AIR,
            };
            Zip::from(out.data_mut())
                .and(protective.data())
                .for_each(|hu, &guard| {
                    if !guard {
                        *hu = fill;
                        replaced += 1;
                    }
                });
            None
        }
    };
    log::debug!("Replaced {replaced} voxel(s) with policy `{replacer}`");

    Ok((out, SubstitutionReport { replaced, pool_size }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::{shape_protective_mask, Dilation, Kernel};
    use crate::segment::{segment_head, Connectivity};
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 球形 "头部": 半径 4 以内为组织, 半径 (4, 5] 为空气中的外壳区域,
    /// 外壳取若干已知的不同 HU 值, 其余为空气.
    fn sphere() -> CtVolume {
        let shell = [-990, -960, -930, -900];
        CtVolume::from_array(Array3::from_shape_fn((13, 13, 13), |(z, h, w)| {
            let d2 = [z, h, w].iter().map(|v| (*v as i32 - 6).pow(2)).sum::<i32>();
            if d2 <= 16 {
                40
            } else if d2 <= 25 {
                shell[(z + h + w) % shell.len()]
            } else {
                hu::AIR
            }
        }))
    }

    fn masks(vol: &CtVolume, kernel: Kernel) -> (HeadMask, ProtectiveMask) {
        let head = segment_head(vol, -800, Connectivity::Full26).unwrap();
        let dil = Dilation {
            kernel,
            iterations: 1,
        };
        let protective = shape_protective_mask(&head, &dil).unwrap();
        (head, protective)
    }

    #[test]
    fn test_parse_replacer() {
        assert_eq!("face".parse::<Replacer>().unwrap(), Replacer::Face);
        assert_eq!(" AIR ".parse::<Replacer>().unwrap(), Replacer::Air);
        assert_eq!("-50".parse::<Replacer>().unwrap(), Replacer::Constant(-50));
        assert_eq!(Replacer::default(), Replacer::Face);
        assert!(matches!(
            "skin".parse::<Replacer>(),
            Err(VeilError::InvalidPolicy(s)) if s == "skin"
        ));
        assert!("1.5".parse::<Replacer>().is_err());
        assert!("40000".parse::<Replacer>().is_err());
        assert_eq!(Replacer::Constant(-7).to_string(), "-7");
    }

    #[test]
    fn test_pool_window() {
        assert!(PoolWindow::new(5, 5).is_none());
        let w = PoolWindow::skin_fat();
        assert!(!w.contains(-125));
        assert!(w.contains(-124));
        assert!(w.contains(49));
        assert!(!w.contains(50));
    }

    #[test]
    fn test_pool_window_from_tuple() {
        assert_eq!(PoolWindow::try_from((-125, 50)).unwrap(), PoolWindow::skin_fat());
        assert_eq!(<(i16, i16)>::from(PoolWindow::skin_fat()), (-125, 50));
        assert!(matches!(
            PoolWindow::try_from((50, -125)),
            Err(VeilError::InvalidConfig(_))
        ));
        assert!(PoolWindow::try_from((7, 7)).is_err());
    }

    #[test]
    fn test_air_policy() {
        let vol = sphere();
        let (head, protective) = masks(&vol, Kernel::Cross);
        let mut rng = StdRng::seed_from_u64(0);
        let (out, report) =
            substitute(&vol, &head, &protective, Replacer::Air, None, &mut rng).unwrap();

        assert_eq!(report.replaced, vol.size() - protective.count());
        assert_eq!(report.pool_size, None);
        for (pos, &v) in out.data().indexed_iter() {
            if head[pos] || protective[pos] {
                assert_eq!(v, vol[pos]);
            } else {
                assert_eq!(v, hu::AIR);
            }
        }
    }

    #[test]
    fn test_constant_policy() {
        let vol = sphere();
        let (head, protective) = masks(&vol, Kernel::Cross);
        let mut rng = StdRng::seed_from_u64(0);
        let (out, _) = substitute(
            &vol,
            &head,
            &protective,
            Replacer::Constant(123),
            None,
            &mut rng,
        )
        .unwrap();
        for (pos, &v) in out.data().indexed_iter() {
            if !protective[pos] {
                assert_eq!(v, 123);
            } else {
                assert_eq!(v, vol[pos]);
            }
        }
    }

    #[test]
    fn test_face_policy_draws_from_shell() {
        let vol = sphere();
        let (head, protective) = masks(&vol, Kernel::Cross);
        let pool = IntensityPool::from_shell(&vol, &head, &protective, None);
        assert!(!pool.is_empty());
        assert!(pool.values().windows(2).all(|w| w[0] < w[1]));
        for v in pool.values() {
            assert!([-990, -960, -930, -900].contains(v), "unexpected {v}");
        }

        let mut rng = StdRng::seed_from_u64(7);
        let (out, report) =
            substitute(&vol, &head, &protective, Replacer::Face, None, &mut rng).unwrap();
        assert_eq!(report.pool_size, Some(pool.len()));
        assert!(report.replaced > 0);

        for (pos, &v) in out.data().indexed_iter() {
            if head[pos] {
                assert_eq!(v, vol[pos]);
            }
            if protective[pos] {
                assert_eq!(v, vol[pos]);
            } else {
                assert!(pool.contains(v), "{v} at {pos:?} is not from the shell");
            }
        }
    }

    #[test]
    fn test_face_policy_reproducible_with_seed() {
        let vol = sphere();
        let (head, protective) = masks(&vol, Kernel::Cross);
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            substitute(&vol, &head, &protective, Replacer::Face, None, &mut rng)
                .unwrap()
                .0
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_face_policy_empty_pool() {
        let vol = sphere();
        let (head, protective) = masks(&vol, Kernel::Cross);
        let mut rng = StdRng::seed_from_u64(0);

        // 外壳全部为空气附近的值, 皮肤/脂肪窗口内没有候选.
        let r = substitute(
            &vol,
            &head,
            &protective,
            Replacer::Face,
            Some(PoolWindow::skin_fat()),
            &mut rng,
        );
        assert!(matches!(r, Err(VeilError::EmptyPool)));
    }

    #[test]
    fn test_pool_sample() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(IntensityPool::default().sample(&mut rng), None);

        let vol = sphere();
        let (head, protective) = masks(&vol, Kernel::Cross);
        let pool = IntensityPool::from_shell(&vol, &head, &protective, None);
        for _ in 0..32 {
            let v = pool.sample(&mut rng).unwrap();
            assert!(pool.contains(v));
        }
    }
}
