use std::path::Path;

use ::image::imageops::{self, FilterType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] ::image::ImageError),
    #[error("image is empty")]
    Empty,
    #[error("pixel buffer has {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize { width: usize, height: usize, expected: usize, actual: usize },
    #[error("row range {start}..{end} out of bounds for height {height}")]
    RowRange { start: usize, end: usize, height: usize },
}

/// 8 位三通道图像，按行存储，每个像素为 B,G,R
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl BgrImage {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(ImageError::BufferSize { width, height, expected, actual: data.len() });
        }
        Ok(Self { width, height, data })
    }

    /// 使用同一种颜色填充的图像
    pub fn filled(width: usize, height: usize, bgr: [u8; 3]) -> Self {
        let data = bgr.iter().copied().cycle().take(width * height * 3).collect();
        Self { width, height, data }
    }

    /// 逐像素调用 `f(x, y)` 生成图像
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> [u8; 3],
    ) -> Self {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        3
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width * 3..(y + 1) * self.width * 3]
    }

    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    /// 复制 `start..end` 行组成一张新图像
    pub fn rows(&self, start: usize, end: usize) -> Result<Self, ImageError> {
        if start > end || end > self.height {
            return Err(ImageError::RowRange { start, end, height: self.height });
        }
        let data = self.data[start * self.width * 3..end * self.width * 3].to_vec();
        Ok(Self { width: self.width, height: end - start, data })
    }

    /// 转换为单通道灰度图，系数与 OpenCV 的 BGR2GRAY 定点实现一致
    pub fn to_gray(&self) -> GrayImage {
        let data = self.pixels().map(|[b, g, r]| luminance(b, g, r)).collect();
        GrayImage { width: self.width, height: self.height, data }
    }

    /// 双线性（三角滤波）缩放
    pub fn resize(&self, width: usize, height: usize) -> Result<Self, ImageError> {
        if self.is_empty() || width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }
        let rgb = ::image::RgbImage::from(self);
        let resized = imageops::resize(&rgb, width as u32, height as u32, FilterType::Triangle);
        Ok(resized.into())
    }
}

impl From<::image::RgbImage> for BgrImage {
    fn from(img: ::image::RgbImage) -> Self {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let mut data = img.into_raw();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Self { width, height, data }
    }
}

impl From<&BgrImage> for ::image::RgbImage {
    fn from(img: &BgrImage) -> Self {
        let mut data = img.data.clone();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        ::image::RgbImage::from_raw(img.width as u32, img.height as u32, data)
            .expect("buffer size checked on construction")
    }
}

/// 单通道 8 位图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl GrayImage {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// 三通道有符号 16 位图像，用于保存梯度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradImage {
    width: usize,
    height: usize,
    data: Vec<i16>,
}

impl GradImage {
    pub(crate) fn zeros(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![0; width * height * 3] }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        3
    }

    pub fn data(&self) -> &[i16] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [i16] {
        &mut self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> [i16; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// 读取图片文件，统一转换为 BGR 三通道
pub fn imread(path: impl AsRef<Path>) -> Result<BgrImage, ImageError> {
    let img = ::image::open(path)?.to_rgb8();
    checked(img.into())
}

/// 从内存中解码图片
pub fn imdecode(bytes: &[u8]) -> Result<BgrImage, ImageError> {
    let img = ::image::load_from_memory(bytes)?.to_rgb8();
    checked(img.into())
}

/// 将 BGR 图像保存为文件，格式由后缀名决定
pub fn imwrite(path: impl AsRef<Path>, img: &BgrImage) -> Result<(), ImageError> {
    ::image::RgbImage::from(img).save(path)?;
    Ok(())
}

fn checked(img: BgrImage) -> Result<BgrImage, ImageError> {
    if img.is_empty() { Err(ImageError::Empty) } else { Ok(img) }
}

#[inline(always)]
fn luminance(b: u8, g: u8, r: u8) -> u8 {
    // 0.114, 0.587, 0.299 的 14 位定点表示
    const SHIFT: u32 = 14;
    let y = b as u32 * 1868 + g as u32 * 9617 + r as u32 * 4899 + (1 << (SHIFT - 1));
    (y >> SHIFT) as u8
}

/// OpenCV 约定的 8 位 HSV：H ∈ [0, 180)，S、V ∈ [0, 255]
pub fn bgr_to_hsv([b, g, r]: [u8; 3]) -> [u8; 3] {
    let v = b.max(g).max(r);
    let min = b.min(g).min(r);
    let diff = (v - min) as f32;
    let s = if v == 0 { 0. } else { 255. * diff / v as f32 };
    let mut h = if diff == 0. {
        0.
    } else if v == r {
        60. * (g as f32 - b as f32) / diff
    } else if v == g {
        120. + 60. * (b as f32 - r as f32) / diff
    } else {
        240. + 60. * (r as f32 - g as f32) / diff
    };
    if h < 0. {
        h += 360.;
    }
    let h = (h / 2.).round() as u32 % 180;
    [h as u8, s.round() as u8, v]
}
