//! 检索流程：准备目标特征 -> 计算与数据库中每条记录的距离 -> 升序排序 -> 取前 K 个
//!
//! 单个目标的错误会让整个查询失败；针对数据库中某条记录的错误只会跳过该记录。

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::distance::{DistanceError, Probe};
use crate::features::{ExtractError, FeatureType};
use crate::mat::BgrImage;
use crate::store::{FeatureStore, StoreIndex};

/// 查询所处的阶段，用于标记失败位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    LoadTarget,
    LoadStore,
    LoadJoinStore,
    ComputeDistances,
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("failed to extract target feature: {0}")]
    Extract(#[from] ExtractError),
    #[error("{0} not found in the feature store")]
    TargetNotFound(String),
    #[error("{0} not found in the embedding store")]
    EmbeddingNotFound(String),
    #[error("{0:?} feature must be extracted from the query image")]
    ImageRequired(crate::features::FeatureKind),
    #[error("feature store is empty")]
    EmptyStore,
    #[error("{0:?} feature requires an embedding store")]
    MissingJoinStore(crate::features::FeatureKind),
    #[error("target feature is invalid: {0}")]
    Distance(#[from] DistanceError),
}

impl RetrievalError {
    pub fn stage(&self) -> QueryStage {
        match self {
            Self::Extract(_)
            | Self::TargetNotFound(_)
            | Self::EmbeddingNotFound(_)
            | Self::ImageRequired(_) => QueryStage::LoadTarget,
            Self::EmptyStore => QueryStage::LoadStore,
            Self::MissingJoinStore(_) => QueryStage::LoadJoinStore,
            Self::Distance(_) => QueryStage::ComputeDistances,
        }
    }
}

/// 查询目标
#[derive(Debug, Clone, Copy)]
pub enum QueryTarget<'a> {
    /// 查询图片以及它的文件名，文件名用于在 embedding 数据库中查找
    Image { name: &'a str, image: &'a BgrImage },
    /// 只给出文件名，特征从数据库中查找，仅适用于 embedding 类型
    Name(&'a str),
    /// 已经提取好的特征向量
    Feature { feature: &'a [f32], embedding: Option<&'a [f32]> },
}

/// 一条匹配结果
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub name: String,
    pub distance: f32,
}

/// 排序后的结果，以及因距离计算失败或缺少 embedding 而被跳过的记录数量
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub matches: Vec<MatchResult>,
    pub skipped: usize,
}

pub struct Retriever<'a> {
    feature_type: &'a FeatureType,
    store: &'a FeatureStore,
    embeddings: Option<StoreIndex<'a>>,
}

impl<'a> Retriever<'a> {
    /// # Arguments
    ///
    /// * `feature_type` - 特征类型，决定距离度量
    /// * `store` - 主数据库，embedding 类型时即为 embedding 数据库
    pub fn new(feature_type: &'a FeatureType, store: &'a FeatureStore) -> Self {
        Self { feature_type, store, embeddings: None }
    }

    /// 设置联合查找的 embedding 数据库
    pub fn with_embeddings(mut self, embeddings: &'a FeatureStore) -> Self {
        self.embeddings = Some(embeddings.index());
        self
    }

    /// 执行查询并返回前 `count` 个结果
    pub fn query(&self, target: QueryTarget, count: usize) -> Result<Ranking, RetrievalError> {
        let mut ranking = self.rank(target)?;
        ranking.matches.truncate(count);
        Ok(ranking)
    }

    /// 执行查询，返回全部排序结果
    pub fn rank(&self, target: QueryTarget) -> Result<Ranking, RetrievalError> {
        debug!("{:?}: preparing target", QueryStage::LoadTarget);
        let owned;
        let probe = match target {
            QueryTarget::Feature { feature, embedding } => Probe { feature, embedding },
            QueryTarget::Image { name, image } => {
                owned = self.target_feature(name, Some(image))?;
                Probe { feature: owned.0.as_slice(), embedding: owned.1 }
            }
            QueryTarget::Name(name) => {
                owned = self.target_feature(name, None)?;
                Probe { feature: owned.0.as_slice(), embedding: owned.1 }
            }
        };

        debug!("{:?}: {} records", QueryStage::LoadStore, self.store.len());
        if self.store.is_empty() {
            return Err(RetrievalError::EmptyStore);
        }
        if self.feature_type.joins_embeddings() {
            debug!("{:?}", QueryStage::LoadJoinStore);
            if self.embeddings.is_none() {
                return Err(RetrievalError::MissingJoinStore(self.feature_type.kind()));
            }
            if probe.embedding.is_none() {
                return Err(RetrievalError::Distance(DistanceError::MissingEmbedding));
            }
        }
        // 目标本身的长度不对时，所有记录都会失败，直接报错
        if probe.feature.len() != self.feature_type.dim() {
            return Err(RetrievalError::Distance(DistanceError::UnexpectedLength {
                len: probe.feature.len(),
                expected: self.feature_type.dim(),
            }));
        }

        debug!("{:?}", QueryStage::ComputeDistances);
        self.feature_type.check_weights();
        let results = self
            .store
            .records()
            .par_iter()
            .map(|record| {
                let candidate = match &self.embeddings {
                    Some(index) if self.feature_type.joins_embeddings() => {
                        match index.get(&record.name) {
                            Some(embedding) => Probe::joined(&record.feature, embedding),
                            None => {
                                warn!("{} 不在 embedding 数据库中，已跳过", record.name);
                                return None;
                            }
                        }
                    }
                    _ => Probe::new(&record.feature),
                };
                match self.feature_type.distance(probe, candidate) {
                    Ok(distance) if distance.is_finite() => {
                        Some(MatchResult { name: record.name.clone(), distance })
                    }
                    Ok(distance) => {
                        warn!("{} 的距离为 {}，已跳过", record.name, distance);
                        None
                    }
                    Err(e) => {
                        warn!("计算 {} 的距离失败: {}", record.name, e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        let total = results.len();
        let mut matches: Vec<MatchResult> = results.into_iter().flatten().collect();
        let skipped = total - matches.len();
        if skipped > 0 {
            warn!("跳过 {} 条记录", skipped);
        }

        // 稳定排序，距离相同的记录保持数据库中的顺序
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(Ranking { matches, skipped })
    }

    /// 从查询图片准备目标特征
    ///
    /// embedding 类型直接在主数据库中按文件名查找；蓝色场景类型在本地提取 209 维特征，
    /// 同时从 embedding 数据库中查找 512 维向量。
    fn target_feature(
        &self,
        name: &str,
        image: Option<&BgrImage>,
    ) -> Result<(Vec<f32>, Option<&'a [f32]>), RetrievalError> {
        let extract = |image: Option<&BgrImage>| -> Result<Vec<f32>, RetrievalError> {
            match image {
                Some(image) => Ok(self.feature_type.extract(image)?),
                None => Err(RetrievalError::ImageRequired(self.feature_type.kind())),
            }
        };
        match self.feature_type {
            FeatureType::Embedding => {
                let record = self
                    .store
                    .get(name)
                    .ok_or_else(|| RetrievalError::TargetNotFound(name.to_owned()))?;
                Ok((record.feature.clone(), None))
            }
            FeatureType::BlueScene { .. } => {
                let index = self
                    .embeddings
                    .as_ref()
                    .ok_or(RetrievalError::MissingJoinStore(self.feature_type.kind()))?;
                let embedding = index
                    .get(name)
                    .ok_or_else(|| RetrievalError::EmbeddingNotFound(name.to_owned()))?;
                Ok((extract(image)?, Some(embedding)))
            }
            _ => Ok((extract(image)?, None)),
        }
    }
}
