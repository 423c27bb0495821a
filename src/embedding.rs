//! 外部预训练网络的边界
//!
//! 本地只负责预处理：缩放到 224x224、交换为 RGB、减均值并乘以缩放系数，
//! 得到 1x3x224x224 的 NCHW 张量。网络推理由外部程序完成，返回 512 个浮点数。

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use ndarray::Array4;
use ndarray_npy::WriteNpyExt;

use crate::mat::BgrImage;

/// 网络倒数第二层（展平/池化层）输出的维度
pub const EMBEDDING_LEN: usize = 512;

/// 输入网络前的预处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocess {
    /// 缩放后的边长，不做中心裁剪
    pub size: usize,
    /// 交换通道后按 R, G, B 顺序减去的均值
    pub mean: [f32; 3],
    pub scale: f32,
    /// 是否将 BGR 交换为 RGB
    pub swap_rb: bool,
}

impl Preprocess {
    pub const DEFAULT: Self = Self {
        size: 224,
        mean: [124., 116., 104.],
        scale: (1. / 255.) * (1. / 0.226),
        swap_rb: true,
    };
}

impl Default for Preprocess {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 将图片转换为网络输入张量，形状为 (1, 3, size, size)
pub fn blob_from_image(image: &BgrImage, params: &Preprocess) -> Result<Array4<f32>> {
    let resized = image.resize(params.size, params.size)?;
    let size = params.size;
    let mut blob = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let px = resized.pixel(x, y);
            for c in 0..3 {
                let src = if params.swap_rb { 2 - c } else { c };
                blob[[0, c, y, x]] = (px[src] as f32 - params.mean[c]) * params.scale;
            }
        }
    }
    Ok(blob)
}

/// 给定一张图片，返回其 embedding 向量
pub trait Embedder: Send + Sync {
    fn embed(&self, image: &BgrImage) -> Result<Vec<f32>>;
}

/// 调用外部程序计算 embedding
///
/// 预处理后的张量以 `.npy` 格式写入子进程的标准输入，
/// 子进程需要在标准输出中打印以空白或逗号分隔的浮点数。
#[derive(Debug, Clone)]
pub struct CommandEmbedder {
    program: PathBuf,
    args: Vec<String>,
    params: Preprocess,
}

impl CommandEmbedder {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, params: Preprocess::DEFAULT }
    }

    pub fn with_preprocess(mut self, params: Preprocess) -> Self {
        self.params = params;
        self
    }
}

impl Embedder for CommandEmbedder {
    fn embed(&self, image: &BgrImage) -> Result<Vec<f32>> {
        let blob = blob_from_image(image, &self.params)?;
        let mut npy = Vec::with_capacity(blob.len() * 4 + 128);
        blob.write_npy(&mut npy)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        // stdin 在这个语句结束时关闭
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&npy).context("failed to write the input tensor"),
            None => Err(anyhow!("stdin of the embedding program is unavailable")),
        };
        if let Err(e) = written {
            // 写入失败时同样需要回收子进程
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            bail!("{} exited with {}", self.program.display(), output.status);
        }
        let stdout = String::from_utf8(output.stdout)?;
        let values = parse_floats(&stdout)?;
        debug!("embedding program returned {} values", values.len());
        Ok(values)
    }
}

fn parse_floats(s: &str) -> Result<Vec<f32>> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<f32>().with_context(|| format!("invalid float: {}", token)))
        .collect()
}
