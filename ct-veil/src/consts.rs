//! 通用常量.
//!
//! 阈值和膨胀核大小是针对头部 CT 标定过的默认值. 可以通过
//! [`crate::params::DeidParams`] 覆盖, 但不应在未经临床验证时修改这里的默认值.

/// HU 值相关常量.
pub mod hu {
    /// 空气的 HU 值. `air` 替换策略以此值填充.
    pub const AIR: i16 = -1000;

    /// 默认的空气/组织分割阈值. 小于该值的体素视为背景 (空气).
    pub const DEFAULT_AIR_THRESHOLD: i16 = -800;

    /// 部分设备用于标记扫描视野以外区域的存储值. 转换为 HU 之前会被置为 0.
    pub const OUTSIDE_SCAN_PADDING: i16 = -2000;

    /// 皮肤及皮下脂肪常见的 HU 下界 (开区间).
    pub const SKIN_FAT_MIN: i16 = -125;

    /// 皮肤及皮下脂肪常见的 HU 上界 (开区间).
    pub const SKIN_FAT_MAX: i16 = 50;
}

/// 形态学相关常量.
pub mod morph {
    /// 默认的逐切片圆盘结构元直径 (像素).
    ///
    /// 该值覆盖常见头部 CT 分辨率下的皮肤 + 皮下脂肪厚度.
    pub const DEFAULT_DISC_DIAMETER: usize = 35;

    /// 默认膨胀次数.
    pub const DEFAULT_ITERATIONS: usize = 1;
}

/// 输出相关常量.
pub mod output {
    /// 未指定输出目录时, 在输入目录名后追加的后缀.
    pub const DEFAULT_SUFFIX: &str = "_d";

    /// 输出 DICOM 文件名前缀. 完整文件名为 `{前缀}{下标}.dcm`.
    pub const FILE_PREFIX: &str = "new_image_";
}
