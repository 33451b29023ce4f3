//! Backend identity and capability records.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The comparison backends known to the engine.
///
/// Declaration order is registration order: it drives iteration, report
/// ordering and the order critical issues are listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// ImageMagick `compare`: SSIM (MSE fallback), PSNR, MAE.
    PixelDiff,
    /// `dssim`: structural dissimilarity, lower is better.
    StructuralSimilarity,
    /// `perceptualdiff`: pass/fail against a human vision model.
    PerceptualJudge,
    /// `butteraugli`: unbounded perceptual distance, lower is better.
    PerceptualDistance,
    /// `vips avg` / `vips deviate`: per-image intensity statistics.
    StatisticalProfile,
}

impl BackendKind {
    /// All backends in registration order.
    pub const ALL: [BackendKind; 5] = [
        BackendKind::PixelDiff,
        BackendKind::StructuralSimilarity,
        BackendKind::PerceptualJudge,
        BackendKind::PerceptualDistance,
        BackendKind::StatisticalProfile,
    ];

    /// Stable backend name used in reports and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::PixelDiff => "pixel_diff",
            BackendKind::StructuralSimilarity => "structural_similarity",
            BackendKind::PerceptualJudge => "perceptual_judge",
            BackendKind::PerceptualDistance => "perceptual_distance",
            BackendKind::StatisticalProfile => "statistical_profile",
        }
    }

    /// Name of the external tool that implements this backend.
    pub fn tool_name(&self) -> &'static str {
        match self {
            BackendKind::PixelDiff => "imagemagick",
            BackendKind::StructuralSimilarity => "dssim",
            BackendKind::PerceptualJudge => "perceptualdiff",
            BackendKind::PerceptualDistance => "butteraugli",
            BackendKind::StatisticalProfile => "vips",
        }
    }

    /// Candidate invocations probed in order; the first one present wins.
    ///
    /// ImageMagick 7 ships a single `magick` binary, older releases install
    /// `compare` directly.
    pub fn candidate_invocations(&self) -> Vec<Invocation> {
        match self {
            BackendKind::PixelDiff => vec![
                Invocation::new("magick", &["compare"]),
                Invocation::new("compare", &[]),
            ],
            BackendKind::StructuralSimilarity => vec![Invocation::new("dssim", &[])],
            BackendKind::PerceptualJudge => vec![Invocation::new("perceptualdiff", &[])],
            BackendKind::PerceptualDistance => vec![Invocation::new("butteraugli", &[])],
            BackendKind::StatisticalProfile => vec![Invocation::new("vips", &[])],
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    /// Accepts either the backend name or the tool name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        BackendKind::ALL
            .into_iter()
            .find(|k| k.name() == needle || k.tool_name() == needle)
            .ok_or_else(|| format!("unknown backend: {s}"))
    }
}

/// How a backend's external program is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Executable name or path.
    pub program: String,
    /// Arguments always placed before the backend-specific ones.
    pub prefix_args: Vec<String>,
}

impl Invocation {
    pub fn new(program: &str, prefix_args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            prefix_args: prefix_args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Full argument vector: prefix followed by `args`.
    pub fn args_with(&self, args: &[String]) -> Vec<String> {
        let mut all = self.prefix_args.clone();
        all.extend(args.iter().cloned());
        all
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix_args.is_empty() {
            f.write_str(&self.program)
        } else {
            write!(f, "{} {}", self.program, self.prefix_args.join(" "))
        }
    }
}

/// Result of probing the host for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapability {
    pub kind: BackendKind,
    pub available: bool,
    /// Resolved invocation; `None` when unavailable.
    pub invocation: Option<Invocation>,
    /// First line of the tool's version output, if it printed one.
    pub version: Option<String>,
    /// Why the backend is unavailable.
    pub reason: Option<String>,
}

impl BackendCapability {
    pub fn available(kind: BackendKind, invocation: Invocation, version: Option<String>) -> Self {
        Self {
            kind,
            available: true,
            invocation: Some(invocation),
            version,
            reason: None,
        }
    }

    pub fn unavailable(kind: BackendKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            available: false,
            invocation: None,
            version: None,
            reason: Some(reason.into()),
        }
    }
}
