use std::path::Path;

use anyhow::Result;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::warn;
use rayon::prelude::*;

use crate::embedding::Embedder;
use crate::features::FeatureType;
use crate::mat::{self, BgrImage};
use crate::store::{FeatureRecord, FeatureStore};

/// 批量提取的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractReport {
    pub found: usize,
    pub extracted: usize,
    pub failed: usize,
}

/// 批量提取特征
///
/// 每张图片独立计算，可以并行；结果按输入顺序排列，失败的图片只打印警告并跳过。
pub struct Extractor<'a> {
    feature_type: &'a FeatureType,
    embedder: Option<&'a dyn Embedder>,
    pb: ProgressBar,
}

impl<'a> Extractor<'a> {
    pub fn new(feature_type: &'a FeatureType) -> Self {
        Self { feature_type, embedder: None, pb: ProgressBar::hidden() }
    }

    pub fn embedder(mut self, embedder: &'a dyn Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// 提取一张图片的特征
    pub fn extract_one(&self, image: &BgrImage) -> Result<Vec<f32>> {
        Ok(self.feature_type.extract_with(image, self.embedder)?)
    }

    /// 对已经解码好的图片提取特征
    pub fn extract_images(&self, images: &[(String, BgrImage)]) -> (FeatureStore, ExtractReport) {
        self.run(images.len(), |i| {
            let (name, image) = &images[i];
            (name.as_str(), self.extract_one(image))
        })
    }

    /// 依次读取目录下的图片并提取特征
    ///
    /// # Arguments
    ///
    /// * `dir` - 图片所在目录
    /// * `names` - 目录下的文件名，同时作为记录的标识
    pub fn extract_dir(&self, dir: &Path, names: &[String]) -> (FeatureStore, ExtractReport) {
        self.run(names.len(), |i| {
            let name = names[i].as_str();
            let feature = mat::imread(dir.join(name))
                .map_err(anyhow::Error::from)
                .and_then(|image| self.extract_one(&image));
            (name, feature)
        })
    }

    fn run<'n, F>(&self, total: usize, f: F) -> (FeatureStore, ExtractReport)
    where
        F: Fn(usize) -> (&'n str, Result<Vec<f32>>) + Sync,
    {
        self.pb.set_length(total as u64);
        let results = (0..total)
            .into_par_iter()
            .progress_with(self.pb.clone())
            .map(|i| match f(i) {
                (name, Ok(feature)) => Some(FeatureRecord::new(name, feature)),
                (name, Err(e)) => {
                    warn!("提取 {} 失败: {:#}", name, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        let store: FeatureStore = results.into_iter().flatten().collect();
        let report =
            ExtractReport { found: total, extracted: store.len(), failed: total - store.len() };
        (store, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureKind;

    #[test]
    fn test_extract_images_keeps_order_and_skips_failures() {
        let feature_type = FeatureType::from(FeatureKind::FixedPatch);
        let images = vec![
            ("a.jpg".to_string(), BgrImage::filled(9, 9, [1, 2, 3])),
            ("small.jpg".to_string(), BgrImage::filled(3, 3, [1, 2, 3])),
            ("b.jpg".to_string(), BgrImage::filled(7, 7, [4, 5, 6])),
        ];
        let (store, report) = Extractor::new(&feature_type).extract_images(&images);
        assert_eq!(report, ExtractReport { found: 3, extracted: 2, failed: 1 });
        let names: Vec<_> = store.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.jpg"]);
        assert_eq!(&store.records()[1].feature[..3], &[4., 5., 6.]);
    }

    #[test]
    fn test_embedding_without_embedder_fails() {
        let feature_type = FeatureType::Embedding;
        let images = vec![("a.jpg".to_string(), BgrImage::filled(9, 9, [1, 2, 3]))];
        let (store, report) = Extractor::new(&feature_type).extract_images(&images);
        assert!(store.is_empty());
        assert_eq!(report.failed, 1);
    }

    struct ConstEmbedder(usize);

    impl Embedder for ConstEmbedder {
        fn embed(&self, _image: &BgrImage) -> Result<Vec<f32>> {
            Ok(vec![1.; self.0])
        }
    }

    #[test]
    fn test_embedding_length_checked() {
        let feature_type = FeatureType::Embedding;
        let images = vec![("a.jpg".to_string(), BgrImage::filled(9, 9, [1, 2, 3]))];

        let good = ConstEmbedder(512);
        let (store, _) = Extractor::new(&feature_type).embedder(&good).extract_images(&images);
        assert_eq!(store.records()[0].feature.len(), 512);

        let bad = ConstEmbedder(511);
        let (store, report) = Extractor::new(&feature_type).embedder(&bad).extract_images(&images);
        assert!(store.is_empty());
        assert_eq!(report.failed, 1);
    }
}
