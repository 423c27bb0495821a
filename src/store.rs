//! 特征数据库的纯文本格式
//!
//! 每行一条记录：`文件名,v1,v2,...,vN`，没有表头，不做转义，数值固定保留 6 位小数。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

/// 一张图片的特征
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub name: String,
    pub feature: Vec<f32>,
}

impl FeatureRecord {
    pub fn new(name: impl Into<String>, feature: Vec<f32>) -> Self {
        Self { name: name.into(), feature }
    }
}

/// 加载过程中的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    /// 被跳过的行（格式错误、数值数量不符或没有任何有效数值）
    pub skipped_lines: usize,
    /// 被跳过的无法解析或不是有限值的数值
    pub skipped_values: usize,
}

/// 某一种特征类型的全部记录，按写入顺序排列
///
/// 不检查文件名是否重复，重复时按名称查找返回第一条。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeatureStore {
    records: Vec<FeatureRecord>,
}

impl FeatureStore {
    pub fn new(records: Vec<FeatureRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: FeatureRecord) {
        self.records.push(record);
    }

    /// 线性查找第一条同名记录
    pub fn get(&self, name: &str) -> Option<&FeatureRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// 从文件加载
    ///
    /// # Arguments
    ///
    /// * `path` - 数据库文件路径
    /// * `dim` - 期望的特征长度，为 `None` 时不检查
    pub fn load(path: impl AsRef<Path>, dim: Option<usize>) -> Result<(Self, LoadReport)> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("无法打开 {}", path.display()))?;
        let (store, report) = Self::read_from(BufReader::new(file), dim)?;
        info!(
            "从 {} 读取 {} 条特征，跳过 {} 行",
            path.display(),
            report.loaded,
            report.skipped_lines
        );
        Ok((store, report))
    }

    /// 逐行解析，格式错误的行或数值只打印警告并跳过
    pub fn read_from<R: BufRead>(reader: R, dim: Option<usize>) -> Result<(Self, LoadReport)> {
        let mut records = vec![];
        let mut report = LoadReport::default();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = i + 1;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let mut tokens = line.split(',');
            let name = tokens.next().unwrap_or_default().trim();
            if name.is_empty() {
                warn!("第 {} 行格式错误：缺少文件名", lineno);
                report.skipped_lines += 1;
                continue;
            }

            let mut feature = vec![];
            for token in tokens {
                match token.trim().parse::<f32>() {
                    Ok(v) if v.is_finite() => feature.push(v),
                    _ => {
                        warn!("第 {} 行包含无效数值：{:?}", lineno, token);
                        report.skipped_values += 1;
                    }
                }
            }

            if feature.is_empty() {
                warn!("第 {} 行没有任何特征值", lineno);
                report.skipped_lines += 1;
                continue;
            }
            if let Some(dim) = dim {
                if feature.len() != dim {
                    warn!("第 {} 行有 {} 个特征值，应为 {}", lineno, feature.len(), dim);
                    report.skipped_lines += 1;
                    continue;
                }
            }

            records.push(FeatureRecord { name: name.to_owned(), feature });
        }

        report.loaded = records.len();
        Ok((Self { records }, report))
    }

    /// 保存到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!("写入 {} 条特征到 {}", self.records.len(), path.display());
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for record in &self.records {
            write!(writer, "{}", record.name)?;
            for v in &record.feature {
                write!(writer, ",{:.6}", v)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// 构建按文件名查找的索引
    pub fn index(&self) -> StoreIndex<'_> {
        StoreIndex::new(self)
    }
}

impl FromIterator<FeatureRecord> for FeatureStore {
    fn from_iter<T: IntoIterator<Item = FeatureRecord>>(iter: T) -> Self {
        Self { records: iter.into_iter().collect() }
    }
}

/// 文件名到特征的映射，文件名重复时保留第一条
pub struct StoreIndex<'a> {
    map: HashMap<&'a str, &'a [f32]>,
}

impl<'a> StoreIndex<'a> {
    pub fn new(store: &'a FeatureStore) -> Self {
        let mut map = HashMap::with_capacity(store.len());
        for record in &store.records {
            map.entry(record.name.as_str()).or_insert(record.feature.as_slice());
        }
        Self { map }
    }

    pub fn get(&self, name: &str) -> Option<&'a [f32]> {
        self.map.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(s: &str, dim: Option<usize>) -> (FeatureStore, LoadReport) {
        FeatureStore::read_from(s.as_bytes(), dim).unwrap()
    }

    #[test]
    fn test_parse_line() {
        let (store, report) = read("img.jpg,1.0,2.0,3.0\n", None);
        assert_eq!(store.records(), &[FeatureRecord::new("img.jpg", vec![1., 2., 3.])]);
        assert_eq!(report, LoadReport { loaded: 1, skipped_lines: 0, skipped_values: 0 });
    }

    #[test]
    fn test_skip_invalid_values() {
        let (store, report) = read("a.jpg,1.0,abc,3.0\n", None);
        assert_eq!(store.records()[0].feature, vec![1., 3.]);
        assert_eq!(report.skipped_values, 1);
    }

    #[test]
    fn test_skip_non_finite_values() {
        let (store, report) = read("a.jpg,1,inf,2\nb.jpg,NaN,-inf\n", None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].feature, vec![1., 2.]);
        assert_eq!(report.skipped_values, 3);
        assert_eq!(report.skipped_lines, 1);

        let (store, report) = read("a.jpg,1,inf\n", Some(2));
        assert!(store.is_empty());
        assert_eq!(report.skipped_lines, 1);
    }

    #[test]
    fn test_skip_lines_without_values() {
        let (store, report) = read("a.jpg,x,y\nb.jpg\n\nc.jpg,1\n", None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].name, "c.jpg");
        assert_eq!(report.skipped_lines, 2);
    }

    #[test]
    fn test_skip_wrong_dimension() {
        let (store, report) = read("a.jpg,1,2,3\nb.jpg,1,2\nc.jpg,4,5,6\n", Some(3));
        let names: Vec<_> = store.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a.jpg", "c.jpg"]);
        assert_eq!(report.skipped_lines, 1);
    }

    #[test]
    fn test_crlf() {
        let (store, _) = read("a.jpg,1.5\r\nb.jpg,2.5\r\n", Some(1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[1].feature, vec![2.5]);
    }

    #[test]
    fn test_write_fixed_point() {
        let store = FeatureStore::new(vec![FeatureRecord::new("x.png", vec![1., 0.1234567, -2.5])]);
        let mut out = vec![];
        store.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x.png,1.000000,0.123457,-2.500000\n");
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let store = FeatureStore::new(vec![
            FeatureRecord::new("a.jpg", vec![1.]),
            FeatureRecord::new("a.jpg", vec![2.]),
        ]);
        assert_eq!(store.get("a.jpg").unwrap().feature, vec![1.]);
        let index = store.index();
        assert_eq!(index.get("a.jpg"), Some(&[1.][..]));
        assert_eq!(index.len(), 1);
        assert!(!index.contains("b.jpg"));
    }
}
