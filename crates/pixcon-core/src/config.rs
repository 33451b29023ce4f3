//! Engine configuration.
//!
//! Layered lowest to highest: [`EngineConfig::default`], a TOML file,
//! `PIXCON_*` environment variables, then per-call [`CompareOptions`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{BackendKind, CompareError, Result};

/// Heuristic constants used when a backend's metric has no exact mapping onto
/// the 0–100 similarity scale. They are approximations, kept configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Approximations {
    /// `ssim ≈ max(0, 1 − mse / mse_scale)` when the installed ImageMagick
    /// cannot report SSIM.
    pub mse_scale: f64,
    /// Statistical similarity is `max(0, 1 − |meanA − meanB| / intensity_range)`.
    pub intensity_range: f64,
    /// Score proxy for a perceptual-judge pass on inputs that are not
    /// pixel-identical.
    pub judge_pass_score: f64,
    /// Score proxy for a perceptual-judge fail.
    pub judge_fail_score: f64,
    /// Score points lost per unit of perceptual distance.
    pub distance_points_per_unit: f64,
}

impl Default for Approximations {
    fn default() -> Self {
        Self {
            mse_scale: 10_000.0,
            intensity_range: 255.0,
            judge_pass_score: 95.0,
            judge_fail_score: 70.0,
            distance_points_per_unit: 10.0,
        }
    }
}

/// Process-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where reports and diff artifacts are written.
    pub output_dir: PathBuf,
    /// Budget for each registry version probe (milliseconds).
    pub probe_timeout_ms: u64,
    /// Default budget for one backend run (milliseconds).
    pub backend_timeout_ms: u64,
    /// Per-backend budgets keyed by backend or tool name.
    pub timeout_overrides_ms: BTreeMap<String, u64>,
    /// Backends never run, by backend or tool name.
    pub skip: Vec<String>,
    /// Copy the normalized pair into the artifact directory.
    pub keep_normalized: bool,
    pub approximations: Approximations,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("visual_diff_results"),
            probe_timeout_ms: 5_000,
            backend_timeout_ms: 60_000,
            timeout_overrides_ms: BTreeMap::new(),
            skip: Vec::new(),
            keep_normalized: false,
            approximations: Approximations::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|e| CompareError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CompareError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps variable names to values.
    ///
    /// Recognised: `PIXCON_OUTPUT_DIR`, `PIXCON_PROBE_TIMEOUT_MS`,
    /// `PIXCON_BACKEND_TIMEOUT_MS`, `PIXCON_SKIP` (comma separated).
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("PIXCON_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup("PIXCON_PROBE_TIMEOUT_MS") {
            self.probe_timeout_ms = parse_ms("PIXCON_PROBE_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("PIXCON_BACKEND_TIMEOUT_MS") {
            self.backend_timeout_ms = parse_ms("PIXCON_BACKEND_TIMEOUT_MS", &ms)?;
        }
        if let Some(list) = lookup("PIXCON_SKIP") {
            self.skip.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_ms == 0 || self.backend_timeout_ms == 0 {
            return Err(CompareError::Config("timeouts must be non-zero".into()));
        }
        let a = &self.approximations;
        if a.mse_scale <= 0.0 || a.intensity_range <= 0.0 {
            return Err(CompareError::Config(
                "mse_scale and intensity_range must be positive".into(),
            ));
        }
        self.skipped_backends()?;
        self.timeout_overrides()?;
        Ok(())
    }

    pub fn skipped_backends(&self) -> Result<BTreeSet<BackendKind>> {
        self.skip
            .iter()
            .map(|name| name.parse::<BackendKind>().map_err(CompareError::Config))
            .collect()
    }

    pub fn timeout_overrides(&self) -> Result<BTreeMap<BackendKind, Duration>> {
        self.timeout_overrides_ms
            .iter()
            .map(|(name, ms)| {
                let kind = name.parse::<BackendKind>().map_err(CompareError::Config)?;
                Ok((kind, Duration::from_millis(*ms)))
            })
            .collect()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

fn parse_ms(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| CompareError::Config(format!("{var} must be an integer, got '{value}'")))
}

/// Per-comparison options supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompareOptions {
    pub skip: BTreeSet<BackendKind>,
    pub timeout_overrides: BTreeMap<BackendKind, Duration>,
}

impl CompareOptions {
    pub fn skip(mut self, kind: BackendKind) -> Self {
        self.skip.insert(kind);
        self
    }

    pub fn with_timeout(mut self, kind: BackendKind, timeout: Duration) -> Self {
        self.timeout_overrides.insert(kind, timeout);
        self
    }
}

/// Fully resolved per-run plan: which backends to skip and each budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub skip: BTreeSet<BackendKind>,
    timeouts: BTreeMap<BackendKind, Duration>,
    default_timeout: Duration,
}

impl RunPlan {
    pub fn resolve(config: &EngineConfig, options: &CompareOptions) -> Result<Self> {
        let mut skip = config.skipped_backends()?;
        skip.extend(options.skip.iter().copied());

        let mut timeouts = config.timeout_overrides()?;
        timeouts.extend(options.timeout_overrides.iter().map(|(k, v)| (*k, *v)));

        Ok(Self {
            skip,
            timeouts,
            default_timeout: config.backend_timeout(),
        })
    }

    pub fn timeout_for(&self, kind: BackendKind) -> Duration {
        self.timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    pub fn is_skipped(&self, kind: BackendKind) -> bool {
        self.skip.contains(&kind)
    }
}
