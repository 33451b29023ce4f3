//! Dimension equalization and scratch-directory handling of the preprocessor.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use pixcon_core::{ComparisonTarget, ImagePreprocessor, ImageSource};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 60, 30])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[test]
fn test_output_is_min_width_by_min_height() {
    let cases = [
        ((800, 600), (1200, 400), (800, 400)),
        ((1200, 400), (800, 600), (800, 400)),
        ((64, 64), (32, 128), (32, 64)),
        ((10, 10), (10, 9), (10, 9)),
    ];
    let preprocessor = ImagePreprocessor::new();

    for ((aw, ah), (bw, bh), expected) in cases {
        let target = ComparisonTarget::new(
            ImageSource::bytes("a", png(aw, ah)),
            ImageSource::bytes("b", png(bw, bh)),
        );
        let pair = preprocessor.normalize(&target).unwrap();
        assert_eq!((pair.meta.width, pair.meta.height), expected);
        assert!(pair.meta.resized);

        let reference = image::open(pair.reference()).unwrap();
        let candidate = image::open(pair.candidate()).unwrap();
        assert_eq!(reference.dimensions(), expected);
        assert_eq!(candidate.dimensions(), expected);
        assert_eq!(reference.color(), candidate.color());
    }
}

#[test]
fn test_each_run_gets_its_own_scratch_dir() {
    let root = tempfile::tempdir().unwrap();
    let preprocessor = ImagePreprocessor::with_scratch_root(root.path().join("scratch"));
    let target = ComparisonTarget::new(
        ImageSource::bytes("a", png(8, 8)),
        ImageSource::bytes("b", png(8, 8)),
    );

    let first = preprocessor.normalize(&target).unwrap();
    let second = preprocessor.normalize(&target).unwrap();
    assert_ne!(first.dir(), second.dir());
    assert!(first.dir().starts_with(root.path().join("scratch")));

    let first_dir = first.dir().to_path_buf();
    drop(first);
    assert!(!first_dir.exists());
    assert!(second.dir().exists());
}

#[test]
fn test_originals_are_never_modified() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    std::fs::write(&a, png(30, 20)).unwrap();
    std::fs::write(&b, png(20, 30)).unwrap();
    let before = (std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());

    let pair = ImagePreprocessor::new()
        .normalize(&ComparisonTarget::new(a.clone(), b.clone()))
        .unwrap();
    assert_eq!((pair.meta.width, pair.meta.height), (20, 20));
    assert_eq!(pair.targets.reference.source, a.display().to_string());

    let after = (std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    assert_eq!(before, after);
}
