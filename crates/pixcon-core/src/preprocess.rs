//! Input decoding and normalization.
//!
//! Both images are decoded, converted to 8-bit RGB (alpha is dropped) and,
//! when their dimensions differ, resampled down to the common minimum width
//! and height with a Lanczos filter. Nothing is ever upscaled. The working
//! copies live in a per-run temporary directory that is removed when the
//! [`NormalizedImagePair`] is dropped.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::debug;

use crate::domain::{CompareError, ImageInfo, NormalizedMeta, Result, TargetMeta, TargetSide};

const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;
const RESAMPLE_FILTER_NAME: &str = "lanczos3";
const NORMALIZED_MODE: &str = "rgb8";

/// One input image: a file on disk or an in-memory encoded buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { label: String, data: Vec<u8> },
}

impl ImageSource {
    pub fn bytes(label: impl Into<String>, data: Vec<u8>) -> Self {
        ImageSource::Bytes {
            label: label.into(),
            data,
        }
    }

    /// Path, or the caller-supplied label for buffers.
    pub fn label(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Bytes { label, .. } => label.clone(),
        }
    }

    fn read(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            ImageSource::Path(path) => std::fs::read(path).map(Cow::Owned),
            ImageSource::Bytes { data, .. } => Ok(Cow::Borrowed(data)),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

/// Ordered input pair. The originals are only ever read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonTarget {
    pub reference: ImageSource,
    pub candidate: ImageSource,
}

impl ComparisonTarget {
    pub fn new(reference: impl Into<ImageSource>, candidate: impl Into<ImageSource>) -> Self {
        Self {
            reference: reference.into(),
            candidate: candidate.into(),
        }
    }
}

/// Working copies handed to the backends.
///
/// Owns the scratch directory; dropping the pair deletes it on every exit
/// path, including panics and cancellation.
#[derive(Debug)]
pub struct NormalizedImagePair {
    dir: TempDir,
    reference: PathBuf,
    candidate: PathBuf,
    pub targets: TargetMeta,
    pub meta: NormalizedMeta,
}

impl NormalizedImagePair {
    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn candidate(&self) -> &Path {
        &self.candidate
    }

    /// Scratch directory holding the working copies.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Copy both working images into `dest`, for debugging.
    pub fn keep_copies(&self, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        std::fs::copy(&self.reference, dest.join("normalized_reference.png"))?;
        std::fs::copy(&self.candidate, dest.join("normalized_candidate.png"))?;
        Ok(())
    }
}

struct Decoded {
    image: DynamicImage,
    info: ImageInfo,
}

/// Decodes and normalizes comparison targets.
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    scratch_root: Option<PathBuf>,
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create per-run scratch directories under `root` instead of the
    /// system temp directory.
    pub fn with_scratch_root(root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: Some(root.into()),
        }
    }

    pub fn normalize(&self, target: &ComparisonTarget) -> Result<NormalizedImagePair> {
        let reference = decode(TargetSide::Reference, &target.reference)?;
        let candidate = decode(TargetSide::Candidate, &target.candidate)?;

        let width = reference.info.width.min(candidate.info.width);
        let height = reference.info.height.min(candidate.info.height);

        let (reference_rgb, reference_resized) = conform(reference.image, width, height);
        let (candidate_rgb, candidate_resized) = conform(candidate.image, width, height);
        let resized = reference_resized || candidate_resized;
        if resized {
            debug!(width, height, "resampled inputs to common dimensions");
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("pixcon-run-");
        let dir = match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let reference_path = dir.path().join("reference.png");
        let candidate_path = dir.path().join("candidate.png");
        write_png(&reference_rgb, &reference_path)?;
        write_png(&candidate_rgb, &candidate_path)?;

        Ok(NormalizedImagePair {
            dir,
            reference: reference_path,
            candidate: candidate_path,
            targets: TargetMeta {
                reference: reference.info,
                candidate: candidate.info,
            },
            meta: NormalizedMeta {
                width,
                height,
                mode: NORMALIZED_MODE.to_string(),
                resized,
                filter: RESAMPLE_FILTER_NAME.to_string(),
            },
        })
    }
}

fn decode(side: TargetSide, source: &ImageSource) -> Result<Decoded> {
    let unreadable = |reason: String| CompareError::UnreadableImage {
        side,
        source_label: source.label(),
        reason,
    };

    let bytes = source.read().map_err(|e| unreadable(e.to_string()))?;
    let image = image::load_from_memory(&bytes).map_err(|e| unreadable(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(unreadable("image has no pixels".to_string()));
    }

    let format = image::guess_format(&bytes).ok().map(|f| format!("{f:?}"));
    let info = ImageInfo {
        source: source.label(),
        width: image.width(),
        height: image.height(),
        color_mode: format!("{:?}", image.color()),
        format,
        sha256: hex::encode(Sha256::digest(&bytes)),
    };
    Ok(Decoded { image, info })
}

/// Convert to RGB and, if needed, resample to exactly `width` x `height`.
fn conform(image: DynamicImage, width: u32, height: u32) -> (DynamicImage, bool) {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    if rgb.width() == width && rgb.height() == height {
        (rgb, false)
    } else {
        (rgb.resize_exact(width, height, RESAMPLE_FILTER), true)
    }
}

fn write_png(image: &DynamicImage, path: &Path) -> Result<()> {
    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(|e| CompareError::Io(std::io::Error::other(e.to_string())))?;
    std::fs::write(path, encoded.into_inner())?;
    Ok(())
}
