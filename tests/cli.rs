use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 生成几张纯色并带有简单纹理的测试图片
fn dataset(dir: &Path) -> Result<()> {
    let colors = [
        ("red.png", [220u8, 30, 30]),
        ("green.png", [30, 200, 40]),
        ("blue.png", [20, 40, 210]),
    ];
    for (name, [r, g, b]) in colors {
        let img = image::RgbImage::from_fn(32, 24, |x, y| {
            let d = ((x + y) % 4) as u8 * 5;
            image::Rgb([r.saturating_sub(d), g.saturating_sub(d), b.saturating_sub(d)])
        });
        img.save(dir.join(name))?;
    }
    fs::write(dir.join("notes.txt"), "not an image")?;
    Ok(())
}

#[rstest]
#[case::fixed_patch("fixed-patch")]
#[case::chromaticity("chromaticity")]
#[case::split_region("split-region")]
#[case::color_texture("color-texture")]
fn extract_then_query(#[case] kind: &str) -> Result<()> {
    let dir = TempDir::new()?;
    dataset(dir.path())?;
    let db = dir.path().join("db.csv");

    cargo_run!("cbir", "extract", "-f", kind, dir.path(), &db)
        .success()
        .stdout(predicate::str::contains("找到图片: 3"))
        .stdout(predicate::str::contains("提取成功: 3"));

    let content = fs::read_to_string(&db)?;
    assert_eq!(content.lines().count(), 3);
    assert!(content.starts_with("blue.png,"));

    cargo_run!("cbir", "query", "-f", kind, "-n", "2", dir.path().join("green.png"), &db)
        .success()
        .stdout(predicate::str::starts_with("1. green.png (distance: 0.000000)"))
        .stdout(predicate::str::contains("3. ").not());

    Ok(())
}

#[test]
fn query_json_exclude_self() -> Result<()> {
    let dir = TempDir::new()?;
    dataset(dir.path())?;
    let db = dir.path().join("db.csv");

    cargo_run!("cbir", "extract", "-f", "chromaticity", dir.path(), &db).success();

    let output = Command::cargo_bin("cbir")?
        .args(["query", "-f", "chromaticity", "--exclude-self", "--output-format", "json"])
        .arg(dir.path().join("red.png"))
        .arg(&db)
        .output()?;
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let result = result.as_array().unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.iter().all(|m| m["name"] != "red.png"));
    assert!(result[0]["distance"].as_f64().unwrap() <= result[1]["distance"].as_f64().unwrap());

    Ok(())
}

#[test]
fn extract_empty_dir() -> Result<()> {
    let dir = TempDir::new()?;
    cargo_run!("cbir", "extract", dir.path(), dir.path().join("db.csv")).failure();
    assert!(!dir.path().join("db.csv").exists());
    Ok(())
}

#[test]
fn extract_embedding_requires_command() -> Result<()> {
    let dir = TempDir::new()?;
    dataset(dir.path())?;
    cargo_run!("cbir", "extract", "-f", "embedding", dir.path(), dir.path().join("db.csv"))
        .failure()
        .stderr(predicate::str::contains("--embed-cmd"));
    Ok(())
}

#[test]
fn blue_scene_requires_embeddings() -> Result<()> {
    let dir = TempDir::new()?;
    dataset(dir.path())?;
    let db = dir.path().join("db.csv");

    cargo_run!("cbir", "extract", "-f", "blue-scene", dir.path(), &db).success();
    assert!(fs::read_to_string(&db)?.lines().all(|line| line.split(',').count() == 210));

    cargo_run!("cbir", "query", "-f", "blue-scene", dir.path().join("blue.png"), &db)
        .failure()
        .stderr(predicate::str::contains("embedding store"));
    Ok(())
}

#[test]
fn query_missing_store() -> Result<()> {
    let dir = TempDir::new()?;
    dataset(dir.path())?;
    cargo_run!("cbir", "query", dir.path().join("red.png"), dir.path().join("missing.csv"))
        .failure();
    Ok(())
}

/// 用一个输出 512 个常数的脚本代替预训练网络
#[cfg(unix)]
fn extract_embeddings(dir: &Path, db: &Path) -> Result<()> {
    let script = "cat > /dev/null; for i in $(seq 512); do echo 0.25; done";
    Command::cargo_bin("cbir")?
        .arg("extract")
        .arg(dir)
        .arg(db)
        .args(["-f", "embedding", "--embed-cmd", "sh", "-c", script])
        .assert()
        .success()
        .stdout(predicate::str::contains("提取成功: 3"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn blue_scene_with_embeddings() -> Result<()> {
    let dir = TempDir::new()?;
    dataset(dir.path())?;
    let db = dir.path().join("db.csv");
    let embeddings = dir.path().join("embeddings.csv");

    cargo_run!("cbir", "extract", "-f", "blue-scene", dir.path(), &db).success();
    extract_embeddings(dir.path(), &embeddings)?;

    let target = dir.path().join("blue.png");
    cargo_run!("cbir", "query", "-f", "blue-scene", "--embeddings", &embeddings, target, &db)
        .success()
        .stdout(predicate::str::starts_with("1. blue.png (distance: 0.000000)"))
        .stdout(predicate::str::contains("3. "));
    Ok(())
}

#[cfg(unix)]
#[test]
fn embedding_extract_query_compare() -> Result<()> {
    let dir = TempDir::new()?;
    dataset(dir.path())?;
    let db = dir.path().join("embeddings.csv");
    extract_embeddings(dir.path(), &db)?;

    // 文件名在数据库中查找，不需要读取图片
    cargo_run!("cbir", "query", "-f", "embedding", "-n", "3", "green.png", &db)
        .success()
        .stdout(predicate::str::contains("(distance: 0.000000)").count(3));

    cargo_run!("cbir", "query", "-f", "embedding", "missing.png", &db)
        .failure()
        .stderr(predicate::str::contains("not found"));

    cargo_run!("cbir", "compare", &db, &db, "red.png", "-n", "1")
        .success()
        .stdout(predicate::str::contains("== red.png =="))
        .stdout(predicate::str::contains("1. blue.png (0.000000)").count(2));

    Ok(())
}
