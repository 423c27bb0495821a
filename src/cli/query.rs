use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};

use crate::cli::SubCommandExtend;
use crate::config::{FeatureOptions, Opts};
use crate::embedding::EMBEDDING_LEN;
use crate::features::FeatureType;
use crate::mat::imread;
use crate::retrieval::{MatchResult, QueryTarget, Retriever};
use crate::store::FeatureStore;

#[derive(Parser, Debug, Clone)]
pub struct QueryCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 查询图片路径，embedding 类型只使用文件名在数据库中查找
    pub target: PathBuf,
    /// 特征数据库
    pub store: PathBuf,
    /// 显示的结果数量
    #[arg(short = 'n', long, value_name = "COUNT", default_value_t = 3)]
    pub count: usize,
    /// 联合查找的 embedding 数据库（blue-scene）
    #[arg(long, value_name = "CSV")]
    pub embeddings: Option<PathBuf>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
    /// 不显示与查询图片同名的结果
    #[arg(long)]
    pub exclude_self: bool,
}

impl SubCommandExtend for QueryCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let feature_type = self.feature.feature_type();
        let name = self
            .target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .with_context(|| format!("无效的图片路径: {}", self.target.display()))?;

        let (store, _) = FeatureStore::load(&self.store, Some(feature_type.dim()))?;
        let embeddings = match &self.embeddings {
            Some(path) if feature_type.joins_embeddings() => {
                Some(FeatureStore::load(path, Some(EMBEDDING_LEN))?.0)
            }
            _ => None,
        };

        let mut retriever = Retriever::new(&feature_type, &store);
        if let Some(embeddings) = &embeddings {
            retriever = retriever.with_embeddings(embeddings);
        }

        let ranking = if feature_type == FeatureType::Embedding {
            retriever.rank(QueryTarget::Name(&name))
        } else {
            let image = imread(&self.target)?;
            retriever.rank(QueryTarget::Image { name: &name, image: &image })
        };
        let ranking = ranking.map_err(|e| {
            debug!("query failed at {:?}", e.stage());
            e
        })?;
        if ranking.skipped > 0 {
            info!("{} 条记录因无法计算距离被跳过", ranking.skipped);
        }

        let result: Vec<MatchResult> = ranking
            .matches
            .into_iter()
            .filter(|m| !self.exclude_self || m.name != name)
            .take(self.count)
            .collect();
        print_result(&result, self)
    }
}

fn print_result(result: &[MatchResult], opts: &QueryCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for (i, m) in result.iter().enumerate() {
                println!("{}. {} (distance: {:.6})", i + 1, m.name, m.distance);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}
