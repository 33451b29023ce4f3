//! Host capability discovery for the comparison backends.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use crate::backends::{ToolCommand, ToolRunner};
use crate::domain::{BackendCapability, BackendKind};

/// Capability map built by probing each backend's tool once.
///
/// The map is fixed for the life of the registry. Call [`reprobe`](Self::reprobe)
/// or build a new registry to pick up newly installed tools.
pub struct BackendRegistry {
    runner: Arc<dyn ToolRunner>,
    probe_timeout: Duration,
    capabilities: BTreeMap<BackendKind, BackendCapability>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("probe_timeout", &self.probe_timeout)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl BackendRegistry {
    /// Probe every known backend. Never fails: a missing or broken tool is
    /// recorded as unavailable.
    pub async fn probe(runner: Arc<dyn ToolRunner>, probe_timeout: Duration) -> Self {
        let capabilities = probe_all(runner.as_ref(), probe_timeout).await;
        Self {
            runner,
            probe_timeout,
            capabilities,
        }
    }

    pub async fn reprobe(&mut self) {
        self.capabilities = probe_all(self.runner.as_ref(), self.probe_timeout).await;
    }

    pub fn capabilities(&self) -> &BTreeMap<BackendKind, BackendCapability> {
        &self.capabilities
    }

    pub fn capability(&self, kind: BackendKind) -> Option<&BackendCapability> {
        self.capabilities.get(&kind)
    }

    /// Available backends in registration order.
    pub fn available(&self) -> impl Iterator<Item = &BackendCapability> {
        self.capabilities.values().filter(|c| c.available)
    }

    pub fn missing(&self) -> impl Iterator<Item = &BackendCapability> {
        self.capabilities.values().filter(|c| !c.available)
    }

    pub fn runner(&self) -> Arc<dyn ToolRunner> {
        Arc::clone(&self.runner)
    }
}

async fn probe_all(
    runner: &dyn ToolRunner,
    timeout: Duration,
) -> BTreeMap<BackendKind, BackendCapability> {
    let probes = BackendKind::ALL
        .into_iter()
        .map(|kind| probe_one(runner, kind, timeout));
    let capabilities: BTreeMap<_, _> = join_all(probes)
        .await
        .into_iter()
        .map(|cap| (cap.kind, cap))
        .collect();

    info!(
        available = capabilities.values().filter(|c| c.available).count(),
        known = capabilities.len(),
        "backend probe complete"
    );
    capabilities
}

/// Try each candidate invocation in order; the first that answers wins.
///
/// Tools that reject `--version` still count as present: spawning them
/// succeeded, which is all a later comparison needs.
async fn probe_one(runner: &dyn ToolRunner, kind: BackendKind, timeout: Duration) -> BackendCapability {
    let mut reasons = Vec::new();

    for invocation in kind.candidate_invocations() {
        if runner.locate(&invocation.program).is_none() {
            reasons.push(format!("{} not found", invocation.program));
            continue;
        }

        let probe = ToolCommand::new(invocation.program.clone(), vec!["--version".to_string()]);
        match runner.run(&probe, timeout).await {
            Ok(output) => {
                let version = output
                    .success()
                    .then(|| first_line(&output.stdout).or_else(|| first_line(&output.stderr)))
                    .flatten();
                debug!(backend = %kind, %invocation, ?version, "backend available");
                return BackendCapability::available(kind, invocation, version);
            }
            Err(err) => {
                debug!(backend = %kind, %invocation, error = %err, "probe failed");
                reasons.push(err.to_string());
            }
        }
    }

    BackendCapability::unavailable(kind, reasons.join("; "))
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::fakes::{Scripted, ScriptedRunner};
    use crate::domain::Invocation;

    #[tokio::test]
    async fn test_probe_records_versions_and_missing_tools() {
        let runner = ScriptedRunner::new();
        runner.install("dssim", "dssim 3.2.3\nextra");
        runner.install("vips", "vips-8.15.1");

        let registry = BackendRegistry::probe(Arc::new(runner), Duration::from_secs(1)).await;
        assert_eq!(registry.capabilities().len(), 5);

        let dssim = registry.capability(BackendKind::StructuralSimilarity).unwrap();
        assert!(dssim.available);
        assert_eq!(dssim.version.as_deref(), Some("dssim 3.2.3"));

        let im = registry.capability(BackendKind::PixelDiff).unwrap();
        assert!(!im.available);
        assert!(im.reason.as_deref().unwrap().contains("magick not found"));

        let kinds: Vec<_> = registry.available().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![BackendKind::StructuralSimilarity, BackendKind::StatisticalProfile]);
        assert_eq!(registry.missing().count(), 3);
    }

    #[tokio::test]
    async fn test_legacy_imagemagick_fallback() {
        let runner = ScriptedRunner::new();
        runner.install("compare", "Version: ImageMagick 6.9.11-60");

        let registry = BackendRegistry::probe(Arc::new(runner), Duration::from_secs(1)).await;
        let im = registry.capability(BackendKind::PixelDiff).unwrap();
        assert!(im.available);
        assert_eq!(im.invocation, Some(Invocation::new("compare", &[])));
    }

    #[tokio::test]
    async fn test_version_rejection_still_available() {
        let runner = ScriptedRunner::new();
        runner
            .install("butteraugli", "")
            .on("butteraugli", &["--version"], Scripted::stderr(1, "Usage: butteraugli a b"));

        let registry = BackendRegistry::probe(Arc::new(runner), Duration::from_secs(1)).await;
        let cap = registry.capability(BackendKind::PerceptualDistance).unwrap();
        assert!(cap.available);
        assert_eq!(cap.version, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_is_unavailable() {
        let runner = ScriptedRunner::new();
        runner
            .install("perceptualdiff", "")
            .on("perceptualdiff", &["--version"], Scripted::Hang(Duration::from_secs(60)));

        let registry = BackendRegistry::probe(Arc::new(runner), Duration::from_secs(5)).await;
        let cap = registry.capability(BackendKind::PerceptualJudge).unwrap();
        assert!(!cap.available);
        assert!(cap.reason.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_reprobe_observes_new_tools() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut registry = BackendRegistry::probe(runner.clone(), Duration::from_secs(1)).await;
        assert_eq!(registry.available().count(), 0);

        runner.install("dssim", "dssim 3.2.3");
        assert_eq!(registry.available().count(), 0);
        registry.reprobe().await;
        assert_eq!(registry.available().count(), 1);
    }
}
