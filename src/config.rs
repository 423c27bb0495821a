use anyhow::bail;
use clap::{Parser, Subcommand};

use crate::cli::*;
use crate::distance::{CompositeWeights, TextureColorWeights};
use crate::features::{FeatureKind, FeatureType};

#[derive(Parser, Debug, Clone)]
pub struct FeatureOptions {
    /// 特征类型
    #[arg(short = 'f', long = "feature", value_name = "KIND", value_enum, default_value_t = FeatureKind::FixedPatch)]
    pub kind: FeatureKind,
    /// 色度直方图每个维度的分箱数量（chromaticity / color-texture）
    #[arg(long, value_name = "N", default_value_t = 16, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub color_bins: u16,
    /// 上下两半色度直方图的分箱数量（split-region）
    #[arg(long, value_name = "N", default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub split_bins: u16,
    /// 梯度幅值直方图的分箱数量（color-texture）
    #[arg(long, value_name = "N", default_value_t = 16, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub texture_bins: u16,
    /// 上下两半的权重，用逗号分隔
    #[arg(long, value_name = "TOP,BOTTOM", default_value = "0.5,0.5", value_parser = parse_pair)]
    pub split_weights: (f32, f32),
    /// 色度部分的权重（color-texture）
    #[arg(long, value_name = "WEIGHT", default_value_t = TextureColorWeights::DEFAULT.color)]
    pub color_weight: f32,
    /// 纹理部分的权重（color-texture）
    #[arg(long, value_name = "WEIGHT", default_value_t = TextureColorWeights::DEFAULT.texture)]
    pub texture_weight: f32,
}

impl FeatureOptions {
    pub fn feature_type(&self) -> FeatureType {
        match self.kind {
            FeatureKind::FixedPatch => FeatureType::FixedPatch,
            FeatureKind::Chromaticity => {
                FeatureType::Chromaticity { bins: self.color_bins as usize }
            }
            FeatureKind::SplitRegion => FeatureType::SplitRegion {
                bins: self.split_bins as usize,
                weights: [self.split_weights.0, self.split_weights.1],
            },
            FeatureKind::ColorTexture => FeatureType::ColorTexture {
                color_bins: self.color_bins as usize,
                texture_bins: self.texture_bins as usize,
                weights: TextureColorWeights {
                    color: self.color_weight,
                    texture: self.texture_weight,
                },
            },
            FeatureKind::Embedding => FeatureType::Embedding,
            FeatureKind::BlueScene => FeatureType::BlueScene { weights: CompositeWeights::DEFAULT },
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cbir", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 并行计算使用的线程数，默认为 CPU 核心数
    #[arg(short = 'j', long, value_name = "N", global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 提取目录下所有图片的特征并写入特征数据库
    Extract(ExtractCommand),
    /// 在特征数据库中查找与目标图片最相似的图片
    Query(QueryCommand),
    /// 对比两个 embedding 数据库对同一组图片的检索结果
    Compare(CompareCommand),
}

fn parse_pair(s: &str) -> anyhow::Result<(f32, f32)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        bail!("无效的权重: {}", s);
    }
    Ok((parts[0].trim().parse()?, parts[1].trim().parse()?))
}
