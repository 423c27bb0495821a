use std::hint::black_box;

use cbir::features::{FeatureKind, FeatureType};
use cbir::mat::{BgrImage, imdecode};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_image(width: usize, height: usize) -> BgrImage {
    let mut rng = StdRng::seed_from_u64(42);
    BgrImage::from_fn(width, height, |_, _| rng.random())
}

fn bench_extract(c: &mut Criterion) {
    let img = random_image(640, 480);

    let mut group = c.benchmark_group("特征提取");
    group.throughput(Throughput::Elements(1));
    for kind in [
        FeatureKind::FixedPatch,
        FeatureKind::Chromaticity,
        FeatureKind::SplitRegion,
        FeatureKind::ColorTexture,
        FeatureKind::BlueScene,
    ] {
        let feature_type = FeatureType::from(kind);
        group.bench_function(format!("{:?}", kind), |b| {
            b.iter(|| feature_type.extract(black_box(&img)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let img = random_image(640, 480);
    let mut png = vec![];
    image::RgbImage::from(&img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let mut group = c.benchmark_group("图像处理");
    group.throughput(Throughput::Bytes(png.len() as u64));
    group.bench_function("PNG 解码", |b| b.iter(|| imdecode(black_box(&png)).unwrap()));
    group.bench_function("缩放到 224x224", |b| b.iter(|| img.resize(224, 224).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_extract, bench_decode);
criterion_main!(benches);
