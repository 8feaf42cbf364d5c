//! 图像归一化 - 把任意栅格图像压成两种标准像素缓冲之一
//!
//! 通知后端只认两种像素布局: 8-bpp 灰度, 或 8-bpp 非预乘 RGBA。

use image::{DynamicImage, GrayImage, RgbaImage};

use crate::error::{Error, Result};

/// 归一化结果
#[derive(Debug, Clone)]
pub enum NormalizedImage {
    /// 单通道 8-bpp 灰度
    Gray(GrayImage),
    /// 8-bpp 非预乘 RGBA
    Rgba(RgbaImage),
}

impl NormalizedImage {
    /// 像素宽度
    pub fn width(&self) -> u32 {
        match self {
            NormalizedImage::Gray(img) => img.width(),
            NormalizedImage::Rgba(img) => img.width(),
        }
    }

    /// 像素高度
    pub fn height(&self) -> u32 {
        match self {
            NormalizedImage::Gray(img) => img.height(),
            NormalizedImage::Rgba(img) => img.height(),
        }
    }

    /// 编码为 PNG 字节流, 用于作为 GNTP 资源上传
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buf = std::io::Cursor::new(Vec::new());
        let dynamic = match self {
            NormalizedImage::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
            NormalizedImage::Rgba(img) => DynamicImage::ImageRgba8(img.clone()),
        };
        dynamic.write_to(&mut buf, image::ImageOutputFormat::Png)?;
        Ok(buf.into_inner())
    }
}

/// 把 `img` 归一化为灰度或 RGBA。
///
/// 单通道灰度输入保持灰度, 其余受支持的布局统一转为非预乘 RGBA。
/// 输出尺寸与输入一致。空图像与未知像素布局返回 `UnsupportedImage`。
pub fn normalize(img: &DynamicImage) -> Result<NormalizedImage> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::UnsupportedImage("empty bounds"));
    }
    match img {
        DynamicImage::ImageLuma8(gray) => Ok(NormalizedImage::Gray(gray.clone())),
        DynamicImage::ImageLuma16(_) => Ok(NormalizedImage::Gray(img.to_luma8())),
        // 带透明度的灰度与全部彩色布局统一走 RGBA
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageRgb32F(_)
        | DynamicImage::ImageRgba32F(_) => Ok(NormalizedImage::Rgba(img.to_rgba8())),
        _ => Err(Error::UnsupportedImage("unknown pixel layout")),
    }
}
