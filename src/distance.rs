//! 特征向量之间的距离度量，所有距离越小越相似

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::EMBEDDING_LEN;
use crate::features::{BLUE_SCENE_LEN, BLUE_SCENE_TEXTURE_BINS, FeatureType};

/// 余弦距离中视为零向量的范数阈值
pub const COSINE_EPSILON: f64 = 1e-10;
/// 权重之和与 1 的允许偏差，超过时只打印警告
pub const WEIGHT_SUM_TOLERANCE: f32 = 0.01;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DistanceError {
    #[error("feature vectors are empty")]
    Empty,
    #[error("feature vectors have different lengths: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("feature length {len} is not {expected}")]
    UnexpectedLength { len: usize, expected: usize },
    #[error("feature length {len} cannot be split into {chunks} histograms")]
    UnevenChunks { len: usize, chunks: usize },
    #[error("got {weights} weights for {chunks} histograms")]
    WeightCount { weights: usize, chunks: usize },
    #[error("missing embedding vector")]
    MissingEmbedding,
}

/// 纹理-颜色距离的权重
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TextureColorWeights {
    pub color: f32,
    pub texture: f32,
}

impl TextureColorWeights {
    pub const DEFAULT: Self = Self { color: 0.5, texture: 0.5 };
}

impl Default for TextureColorWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 蓝色场景距离的固定权重
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CompositeWeights {
    pub blue: f32,
    pub texture: f32,
    pub spatial: f32,
    pub embedding: f32,
    /// 上中下三段空间直方图的权重
    pub thirds: [f32; 3],
}

impl CompositeWeights {
    pub const DEFAULT: Self = Self {
        blue: 0.40,
        texture: 0.20,
        spatial: 0.20,
        embedding: 0.20,
        thirds: [0.33, 0.34, 0.33],
    };
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn check_pair(a: &[f32], b: &[f32]) -> Result<(), DistanceError> {
    if a.len() != b.len() {
        return Err(DistanceError::LengthMismatch(a.len(), b.len()));
    }
    if a.is_empty() {
        return Err(DistanceError::Empty);
    }
    Ok(())
}

fn check_weight_sum(weights: &[f32]) -> bool {
    let sum: f32 = weights.iter().sum();
    if (sum - 1.).abs() > WEIGHT_SUM_TOLERANCE {
        warn!("weights {:?} sum to {:.4} instead of 1", weights, sum);
        return false;
    }
    true
}

/// 差的平方和
pub fn ssd(a: &[f32], b: &[f32]) -> Result<f32, DistanceError> {
    check_pair(a, b)?;
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    Ok(sum as f32)
}

/// 直方图交距离 1 - Σ min(a, b)，结果限制在 [0, 1]
pub fn histogram_intersection(a: &[f32], b: &[f32]) -> Result<f32, DistanceError> {
    check_pair(a, b)?;
    let inter: f64 = a.iter().zip(b).map(|(&x, &y)| x.min(y) as f64).sum();
    Ok((1. - inter).clamp(0., 1.) as f32)
}

/// 将向量均分为 `weights.len()` 段，分别计算直方图交距离后加权求和
pub fn weighted_histogram(a: &[f32], b: &[f32], weights: &[f32]) -> Result<f32, DistanceError> {
    check_pair(a, b)?;
    let chunks = weights.len();
    if chunks == 0 {
        return Err(DistanceError::WeightCount { weights: 0, chunks });
    }
    if a.len() % chunks != 0 {
        return Err(DistanceError::UnevenChunks { len: a.len(), chunks });
    }
    let size = a.len() / chunks;
    let mut total = 0.;
    for ((ca, cb), w) in a.chunks_exact(size).zip(b.chunks_exact(size)).zip(weights) {
        total += w * histogram_intersection(ca, cb)?;
    }
    Ok(total)
}

/// 同 [`weighted_histogram`]，但显式检查直方图数量与权重数量一致
pub fn multi_histogram(
    a: &[f32],
    b: &[f32],
    num_histograms: usize,
    weights: &[f32],
) -> Result<f32, DistanceError> {
    if weights.len() != num_histograms {
        return Err(DistanceError::WeightCount { weights: weights.len(), chunks: num_histograms });
    }
    weighted_histogram(a, b, weights)
}

/// 前 `color_size` 个值为颜色直方图，后 `texture_size` 个值为纹理直方图
pub fn texture_color(
    a: &[f32],
    b: &[f32],
    color_size: usize,
    texture_size: usize,
    weights: TextureColorWeights,
) -> Result<f32, DistanceError> {
    check_pair(a, b)?;
    let expected = color_size + texture_size;
    if a.len() != expected {
        return Err(DistanceError::UnexpectedLength { len: a.len(), expected });
    }
    let color = histogram_intersection(&a[..color_size], &b[..color_size])?;
    let texture = histogram_intersection(&a[color_size..], &b[color_size..])?;
    Ok(weights.color * color + weights.texture * texture)
}

/// 余弦距离 1 - cos(a, b)，任意一个向量接近零向量时返回 1
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32, DistanceError> {
    check_pair(a, b)?;
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na.sqrt() < COSINE_EPSILON || nb.sqrt() < COSINE_EPSILON {
        return Ok(1.);
    }
    // sqrt(na * nb) 保证 a == b 时相似度恰好为 1
    let similarity = (dot / (na * nb).sqrt()).clamp(-1., 1.);
    Ok((1. - similarity) as f32)
}

/// 蓝色场景距离，同时需要 209 维自定义特征和 512 维 embedding
///
/// 蓝色比例取绝对差，纹理取直方图交，三段空间直方图取加权直方图交，embedding 取余弦距离。
pub fn blue_scene(
    a: &[f32],
    b: &[f32],
    ea: &[f32],
    eb: &[f32],
    weights: &CompositeWeights,
) -> Result<f32, DistanceError> {
    for v in [a, b] {
        if v.len() != BLUE_SCENE_LEN {
            return Err(DistanceError::UnexpectedLength { len: v.len(), expected: BLUE_SCENE_LEN });
        }
    }
    for v in [ea, eb] {
        if v.len() != EMBEDDING_LEN {
            return Err(DistanceError::UnexpectedLength { len: v.len(), expected: EMBEDDING_LEN });
        }
    }

    let texture_end = 1 + BLUE_SCENE_TEXTURE_BINS;
    let blue = (a[0] - b[0]).abs();
    let texture = histogram_intersection(&a[1..texture_end], &b[1..texture_end])?;
    let spatial = multi_histogram(&a[texture_end..], &b[texture_end..], 3, &weights.thirds)?;
    let embedding = cosine(ea, eb)?;

    Ok(weights.blue * blue
        + weights.texture * texture
        + weights.spatial * spatial
        + weights.embedding * embedding)
}

/// 参与距离计算的一方：特征向量以及（可选的）联合 embedding
#[derive(Debug, Clone, Copy)]
pub struct Probe<'a> {
    pub feature: &'a [f32],
    pub embedding: Option<&'a [f32]>,
}

impl<'a> Probe<'a> {
    pub fn new(feature: &'a [f32]) -> Self {
        Self { feature, embedding: None }
    }

    pub fn joined(feature: &'a [f32], embedding: &'a [f32]) -> Self {
        Self { feature, embedding: Some(embedding) }
    }
}

impl FeatureType {
    /// 检查权重之和是否为 1，不为 1 时打印一次警告，但仍按给定权重计算
    pub fn check_weights(&self) -> bool {
        match self {
            Self::SplitRegion { weights, .. } => check_weight_sum(weights),
            Self::ColorTexture { weights, .. } => {
                check_weight_sum(&[weights.color, weights.texture])
            }
            Self::BlueScene { weights } => {
                let parts = [weights.blue, weights.texture, weights.spatial, weights.embedding];
                check_weight_sum(&parts) & check_weight_sum(&weights.thirds)
            }
            _ => true,
        }
    }

    /// 按特征类型选择距离度量
    pub fn distance(&self, a: Probe, b: Probe) -> Result<f32, DistanceError> {
        match self {
            Self::FixedPatch => ssd(a.feature, b.feature),
            Self::Chromaticity { .. } => histogram_intersection(a.feature, b.feature),
            Self::SplitRegion { weights, .. } => {
                multi_histogram(a.feature, b.feature, weights.len(), weights)
            }
            Self::ColorTexture { color_bins, texture_bins, weights } => {
                let color_size = color_bins * color_bins;
                texture_color(a.feature, b.feature, color_size, *texture_bins, *weights)
            }
            Self::Embedding => cosine(a.feature, b.feature),
            Self::BlueScene { weights } => {
                let (Some(ea), Some(eb)) = (a.embedding, b.embedding) else {
                    return Err(DistanceError::MissingEmbedding);
                };
                blue_scene(a.feature, b.feature, ea, eb, weights)
            }
        }
    }
}
