use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::distance::{CompositeWeights, TextureColorWeights};
use crate::embedding::{EMBEDDING_LEN, Embedder};
use crate::histogram::{self, HistogramError};
use crate::mat::{BgrImage, bgr_to_hsv};

/// 中心像素块的半径，块大小为 (2 * 3 + 1)²
pub const PATCH_RADIUS: usize = 3;
pub const PATCH_SIZE: usize = 2 * PATCH_RADIUS + 1;
pub const PATCH_LEN: usize = PATCH_SIZE * PATCH_SIZE * 3;

/// 蓝色像素的 HSV 阈值：H ∈ [100, 130]，S > 30，V > 50
pub const BLUE_HUE: (u8, u8) = (100, 130);
pub const BLUE_MIN_SATURATION: u8 = 30;
pub const BLUE_MIN_VALUE: u8 = 50;

pub const BLUE_SCENE_TEXTURE_BINS: usize = 16;
pub const BLUE_SCENE_SPATIAL_BINS: usize = 8;
/// 1 个蓝色比例 + 16 个纹理箱 + 3 个 8x8 色度直方图
pub const BLUE_SCENE_LEN: usize =
    1 + BLUE_SCENE_TEXTURE_BINS + 3 * BLUE_SCENE_SPATIAL_BINS * BLUE_SCENE_SPATIAL_BINS;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("image is empty")]
    Empty,
    #[error("image {width}x{height} is smaller than {min}x{min}")]
    TooSmall { width: usize, height: usize, min: usize },
    #[error(transparent)]
    Histogram(#[from] HistogramError),
    #[error("feature has {actual} values, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("embedding features are produced by an external model")]
    External,
    #[error("embedding model failed: {0:#}")]
    Embedder(anyhow::Error),
}

/// 特征类型的命令行标记
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    /// 图像中心 7x7 像素块，使用 SSD 距离
    FixedPatch,
    /// 全图 rg 色度直方图，使用直方图交距离
    Chromaticity,
    /// 上下两半各一个色度直方图，使用加权直方图交距离
    SplitRegion,
    /// 色度直方图 + 梯度幅值直方图
    ColorTexture,
    /// 外部预训练网络输出的 512 维向量，使用余弦距离
    Embedding,
    /// 蓝色比例 + 纹理 + 三段空间色度直方图，并联合 512 维向量
    BlueScene,
}

/// 带参数的特征类型，每个变体同时决定提取算法和距离度量
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureType {
    FixedPatch,
    Chromaticity { bins: usize },
    SplitRegion { bins: usize, weights: [f32; 2] },
    ColorTexture { color_bins: usize, texture_bins: usize, weights: TextureColorWeights },
    Embedding,
    BlueScene { weights: CompositeWeights },
}

impl From<FeatureKind> for FeatureType {
    fn from(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::FixedPatch => Self::FixedPatch,
            FeatureKind::Chromaticity => Self::Chromaticity { bins: 16 },
            FeatureKind::SplitRegion => Self::SplitRegion { bins: 8, weights: [0.5, 0.5] },
            FeatureKind::ColorTexture => Self::ColorTexture {
                color_bins: 16,
                texture_bins: 16,
                weights: TextureColorWeights::DEFAULT,
            },
            FeatureKind::Embedding => Self::Embedding,
            FeatureKind::BlueScene => Self::BlueScene { weights: CompositeWeights::DEFAULT },
        }
    }
}

impl FeatureType {
    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::FixedPatch => FeatureKind::FixedPatch,
            Self::Chromaticity { .. } => FeatureKind::Chromaticity,
            Self::SplitRegion { .. } => FeatureKind::SplitRegion,
            Self::ColorTexture { .. } => FeatureKind::ColorTexture,
            Self::Embedding => FeatureKind::Embedding,
            Self::BlueScene { .. } => FeatureKind::BlueScene,
        }
    }

    /// 特征向量的长度
    pub fn dim(&self) -> usize {
        match self {
            Self::FixedPatch => PATCH_LEN,
            Self::Chromaticity { bins } => bins * bins,
            Self::SplitRegion { bins, .. } => 2 * bins * bins,
            Self::ColorTexture { color_bins, texture_bins, .. } => {
                color_bins * color_bins + texture_bins
            }
            Self::Embedding => EMBEDDING_LEN,
            Self::BlueScene { .. } => BLUE_SCENE_LEN,
        }
    }

    /// 计算距离时是否需要额外联合 embedding 数据库
    pub fn joins_embeddings(&self) -> bool {
        matches!(self, Self::BlueScene { .. })
    }

    /// 在本地提取特征，embedding 类型需要使用 [`FeatureType::extract_with`]
    pub fn extract(&self, image: &BgrImage) -> Result<Vec<f32>, ExtractError> {
        if image.is_empty() {
            return Err(ExtractError::Empty);
        }
        let feature = match self {
            Self::FixedPatch => fixed_patch(image)?,
            Self::Chromaticity { bins } => histogram::chromaticity(image, *bins)?,
            Self::SplitRegion { bins, .. } => split_region(image, *bins)?,
            Self::ColorTexture { color_bins, texture_bins, .. } => {
                let mut feature = histogram::chromaticity(image, *color_bins)?;
                feature.extend(histogram::gradient_magnitude(image, *texture_bins)?);
                feature
            }
            Self::Embedding => return Err(ExtractError::External),
            Self::BlueScene { .. } => blue_scene(image)?,
        };
        self.check_len(feature)
    }

    /// 提取特征，embedding 类型交给外部模型计算
    pub fn extract_with(
        &self,
        image: &BgrImage,
        embedder: Option<&dyn Embedder>,
    ) -> Result<Vec<f32>, ExtractError> {
        match (self, embedder) {
            (Self::Embedding, Some(embedder)) => {
                if image.is_empty() {
                    return Err(ExtractError::Empty);
                }
                let feature = embedder.embed(image).map_err(ExtractError::Embedder)?;
                self.check_len(feature)
            }
            _ => self.extract(image),
        }
    }

    fn check_len(&self, feature: Vec<f32>) -> Result<Vec<f32>, ExtractError> {
        if feature.len() != self.dim() {
            return Err(ExtractError::Length { expected: self.dim(), actual: feature.len() });
        }
        Ok(feature)
    }
}

/// 以中心像素为中心的 7x7 像素块，按行输出每个像素的 B,G,R
pub fn fixed_patch(image: &BgrImage) -> Result<Vec<f32>, ExtractError> {
    let (w, h) = (image.width(), image.height());
    if w < PATCH_SIZE || h < PATCH_SIZE {
        return Err(ExtractError::TooSmall { width: w, height: h, min: PATCH_SIZE });
    }
    let (cx, cy) = (w / 2, h / 2);
    let mut feature = Vec::with_capacity(PATCH_LEN);
    for y in cy - PATCH_RADIUS..=cy + PATCH_RADIUS {
        let row = image.row(y);
        let start = (cx - PATCH_RADIUS) * 3;
        let end = (cx + PATCH_RADIUS + 1) * 3;
        feature.extend(row[start..end].iter().map(|&v| v as f32));
    }
    Ok(feature)
}

/// 在中间行处分为上下两半，上半部分取 floor(h / 2) 行，各自计算色度直方图后拼接
pub fn split_region(image: &BgrImage, bins: usize) -> Result<Vec<f32>, ExtractError> {
    let mid = image.height() / 2;
    let top = image.rows(0, mid).map_err(|_| ExtractError::Empty)?;
    let bottom = image.rows(mid, image.height()).map_err(|_| ExtractError::Empty)?;
    let mut feature = histogram::chromaticity(&top, bins)?;
    feature.extend(histogram::chromaticity(&bottom, bins)?);
    Ok(feature)
}

/// HSV 空间中属于蓝色的像素比例
pub fn blue_fraction(image: &BgrImage) -> Result<f32, ExtractError> {
    if image.is_empty() {
        return Err(ExtractError::Empty);
    }
    let blue = image
        .pixels()
        .map(bgr_to_hsv)
        .filter(|&[h, s, v]| {
            (BLUE_HUE.0..=BLUE_HUE.1).contains(&h)
                && s > BLUE_MIN_SATURATION
                && v > BLUE_MIN_VALUE
        })
        .count();
    Ok(blue as f32 / (image.width() * image.height()) as f32)
}

/// 蓝色场景描述子：蓝色比例、全图纹理直方图、上中下三段色度直方图
///
/// 每段高度为 floor(h / 3)，余下的行全部归入底部。
pub fn blue_scene(image: &BgrImage) -> Result<Vec<f32>, ExtractError> {
    let mut feature = Vec::with_capacity(BLUE_SCENE_LEN);
    feature.push(blue_fraction(image)?);
    feature.extend(histogram::gradient_magnitude(image, BLUE_SCENE_TEXTURE_BINS)?);

    let h = image.height();
    let band = h / 3;
    for (start, end) in [(0, band), (band, 2 * band), (2 * band, h)] {
        let region = image.rows(start, end).map_err(|_| ExtractError::Empty)?;
        feature.extend(histogram::chromaticity(&region, BLUE_SCENE_SPATIAL_BINS)?);
    }
    Ok(feature)
}
