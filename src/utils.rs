use std::path::Path;

use anyhow::{Result, bail};
use indicatif::ProgressStyle;
use log::info;
use regex::Regex;
use walkdir::WalkDir;

/// 默认识别的图片后缀
pub const IMAGE_SUFFIXES: &str = "jpg,jpeg,png,bmp";

/// 由逗号分隔的后缀列表构建忽略大小写的正则
pub fn suffix_regex(suffix: &str) -> Regex {
    let alternatives: Vec<String> = suffix.split(',').map(|s| regex::escape(s.trim())).collect();
    let re = format!("(?i)^({})$", alternatives.join("|"));
    Regex::new(&re).expect("failed to build regex")
}

/// 列出目录下（不递归）后缀匹配的图片文件名，按字典序排序
pub fn list_images(dir: impl AsRef<Path>, suffix: &Regex) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        bail!("目录不存在: {}", dir.display());
    }
    let mut names = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| suffix.is_match(&ext.to_string_lossy()))
        })
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    names.sort();
    info!("在 {} 中找到 {} 张图片", dir.display(), names.len());
    Ok(names)
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .expect("invalid progress bar template")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_suffix_regex() {
        let re = suffix_regex(IMAGE_SUFFIXES);
        assert!(re.is_match("jpg"));
        assert!(re.is_match("JPEG"));
        assert!(re.is_match("Png"));
        assert!(!re.is_match("jpgx"));
        assert!(!re.is_match("txt"));

        let re = suffix_regex("jp.g, png");
        assert!(re.is_match("PNG"));
        assert!(!re.is_match("jpeg"));
    }

    #[test]
    fn test_list_images() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.JPG", "a.png", "c.txt", "d.bmp"] {
            fs::write(dir.path().join(name), b"")?;
        }
        fs::create_dir(dir.path().join("sub.jpg"))?;
        fs::write(dir.path().join("sub.jpg").join("e.jpg"), b"")?;

        let names = list_images(dir.path(), &suffix_regex(IMAGE_SUFFIXES))?;
        assert_eq!(names, ["a.png", "b.JPG", "d.bmp"]);
        Ok(())
    }

    #[test]
    fn test_list_images_missing_dir() {
        let re = suffix_regex(IMAGE_SUFFIXES);
        assert!(list_images("/definitely/not/here", &re).is_err());
    }
}
