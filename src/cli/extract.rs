use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{FeatureOptions, Opts};
use crate::embedding::CommandEmbedder;
use crate::extract::Extractor;
use crate::features::FeatureKind;
use crate::utils::{IMAGE_SUFFIXES, list_images, pb_style, suffix_regex};

#[derive(Parser, Debug, Clone)]
pub struct ExtractCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 图片所在目录，不递归扫描子目录
    pub dir: PathBuf,
    /// 输出的特征数据库
    pub output: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = IMAGE_SUFFIXES)]
    pub suffix: String,
    /// 计算 embedding 的外部程序及其参数，程序从标准输入读取 .npy 格式的张量，
    /// 并在标准输出中打印 512 个浮点数
    /// 例：`--embed-cmd python3 embed.py`
    #[arg(long, value_name = "PROGRAM", num_args = 1.., allow_hyphen_values = true, verbatim_doc_comment)]
    pub embed_cmd: Vec<String>,
}

impl SubCommandExtend for ExtractCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let feature_type = self.feature.feature_type();
        let names = list_images(&self.dir, &suffix_regex(&self.suffix))?;
        if names.is_empty() {
            bail!("{} 中没有找到图片", self.dir.display());
        }

        let embedder = match (self.feature.kind, self.embed_cmd.split_first()) {
            (FeatureKind::Embedding, Some((program, args))) => {
                Some(CommandEmbedder::new(program, args.to_vec()))
            }
            (FeatureKind::Embedding, None) => {
                bail!("embedding 特征需要通过 --embed-cmd 指定外部程序")
            }
            _ => None,
        };

        let pb = ProgressBar::new(names.len() as u64).with_style(pb_style());
        let mut extractor = Extractor::new(&feature_type).progress(pb.clone());
        if let Some(embedder) = &embedder {
            extractor = extractor.embedder(embedder);
        }
        let (store, report) = extractor.extract_dir(&self.dir, &names);
        pb.finish_and_clear();

        println!("找到图片: {}", report.found);
        println!("提取成功: {}", report.extracted);
        println!("提取失败: {}", report.failed);

        if store.is_empty() {
            bail!("没有成功提取任何特征");
        }
        store.save(&self.output)?;
        info!("{:?} 特征已写入 {}", self.feature.kind, self.output.display());
        Ok(())
    }
}
