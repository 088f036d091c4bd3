//! 体数据水平切片视图的操作.

mod core;

pub use core::VolumeSlice;

cfg_if::cfg_if! {
    if #[cfg(feature = "preview")] {
        mod save;

        pub use save::ImgWriteVis;
    }
}
