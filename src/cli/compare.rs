use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::warn;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::embedding::EMBEDDING_LEN;
use crate::features::FeatureType;
use crate::retrieval::{MatchResult, QueryTarget, Retriever};
use crate::store::FeatureStore;

#[derive(Parser, Debug, Clone)]
pub struct CompareCommand {
    /// 第一个 embedding 数据库
    pub first: PathBuf,
    /// 第二个 embedding 数据库
    pub second: PathBuf,
    /// 查询的图片文件名
    #[arg(required = true)]
    pub queries: Vec<String>,
    /// 每个数据库显示的结果数量
    #[arg(short = 'n', long, value_name = "COUNT", default_value_t = 3)]
    pub count: usize,
}

impl SubCommandExtend for CompareCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let (first, _) = FeatureStore::load(&self.first, Some(EMBEDDING_LEN))?;
        let (second, _) = FeatureStore::load(&self.second, Some(EMBEDDING_LEN))?;

        for query in &self.queries {
            let left = top_matches(&first, query, self.count);
            let right = top_matches(&second, query, self.count);

            println!("== {} ==", query);
            println!("{:<40} {}", self.first.display().to_string(), self.second.display());
            for i in 0..left.len().max(right.len()) {
                let cell = |matches: &[MatchResult]| {
                    matches
                        .get(i)
                        .map(|m| format!("{}. {} ({:.6})", i + 1, m.name, m.distance))
                        .unwrap_or_else(|| "-".to_string())
                };
                println!("{:<40} {}", cell(&left[..]), cell(&right[..]));
            }
        }
        Ok(())
    }
}

/// 按余弦距离排序，去掉查询本身；查询不在数据库中时返回空结果
fn top_matches(store: &FeatureStore, query: &str, count: usize) -> Vec<MatchResult> {
    let feature_type = FeatureType::Embedding;
    match Retriever::new(&feature_type, store).rank(QueryTarget::Name(query)) {
        Ok(ranking) => {
            ranking.matches.into_iter().filter(|m| m.name != query).take(count).collect()
        }
        Err(e) => {
            warn!("{}", e);
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FeatureRecord;

    fn unit(i: usize) -> Vec<f32> {
        let mut v = vec![0.; EMBEDDING_LEN];
        v[i] = 1.;
        v
    }

    #[test]
    fn test_top_matches_excludes_query() {
        let mut near = unit(0);
        near[1] = 1.;
        let store = FeatureStore::new(vec![
            FeatureRecord::new("q.jpg", unit(0)),
            FeatureRecord::new("far.jpg", unit(2)),
            FeatureRecord::new("near.jpg", near),
        ]);
        let matches = top_matches(&store, "q.jpg", 5);
        let names: Vec<_> = matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["near.jpg", "far.jpg"]);
        assert!((matches[1].distance - 1.).abs() < 1e-6);
    }

    #[test]
    fn test_top_matches_unknown_query() {
        let store = FeatureStore::new(vec![FeatureRecord::new("a.jpg", unit(0))]);
        assert!(top_matches(&store, "missing.jpg", 3).is_empty());
    }
}
