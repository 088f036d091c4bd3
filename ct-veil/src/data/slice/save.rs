//! 切片的可视化预览导出.

use super::VolumeSlice;
use crate::CtWindow;
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 以 HU 存储的切片在保存时会经过 CT 窗口规范化为 8-bit 灰度图.
pub trait ImgWriteVis {
    /// 按照 `window` 将图片保存到 `path` 路径. 图片格式由扩展名决定.
    fn save_with<P: AsRef<Path>>(&self, path: P, window: CtWindow) -> ImageResult<()>;

    /// 按照软组织窗将图片保存到 `path` 路径.
    #[inline]
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        self.save_with(path, CtWindow::from_soft_tissue())
    }
}

impl ImgWriteVis for VolumeSlice<'_> {
    fn save_with<P: AsRef<Path>>(&self, path: P, window: CtWindow) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &hu) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([window.eval(hu)]));
        }
        buf.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::ImgWriteVis;
    use crate::consts::hu;
    use crate::CtVolume;
    use ndarray::Array3;

    #[test]
    fn test_save_png() {
        let mut data = Array3::from_elem((1, 4, 5), hu::AIR);
        data[(0, 1, 2)] = 1000;
        let vol = CtVolume::from_array(data);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        vol.slice_at(0).save(&path).unwrap();

        let img = image::open(&path).unwrap().into_luma8();
        assert_eq!(img.dimensions(), (5, 4));
        assert_eq!(img.get_pixel(2, 1).0, [255]);
        assert_eq!(img.get_pixel(0, 0).0, [0]);
    }
}
