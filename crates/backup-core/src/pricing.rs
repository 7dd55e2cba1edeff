//! Storage and egress cost estimation.
//!
//! Every figure produced here is an **estimate**: a straight multiplication
//! of size by a per-gigabyte rate with no rounding, minimum charges, free
//! tiers or proration. It is meant for comparing tiers at a glance, never for
//! reconciling an invoice.

use serde::{Deserialize, Serialize};

use crate::models::{Artifact, CostEstimate, CostedArtifact, TierSummary};

/// Bytes per gigabyte (binary).
pub const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Default storage rate, currency units per GB-month.
pub const DEFAULT_STORAGE_RATE: f64 = 0.005;

/// Default egress rate, currency units per GB downloaded.
pub const DEFAULT_EGRESS_RATE: f64 = 0.01;

/// Per-gigabyte rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostRates {
    /// Price per GB stored for one month.
    pub storage_per_gb: f64,
    /// Price per GB downloaded.
    pub egress_per_gb: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            storage_per_gb: DEFAULT_STORAGE_RATE,
            egress_per_gb: DEFAULT_EGRESS_RATE,
        }
    }
}

/// Maps sizes to [`CostEstimate`]s using a fixed set of [`CostRates`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimator {
    rates: CostRates,
}

impl CostEstimator {
    pub fn new(rates: CostRates) -> Self {
        Self { rates }
    }

    /// Estimate the cost of `size_bytes` bytes.
    pub fn estimate(&self, size_bytes: u64) -> CostEstimate {
        self.estimate_gb(size_bytes as f64 / BYTES_PER_GB)
    }

    /// Estimate the cost of a size already expressed in gigabytes, as
    /// reported for hypervisor disks.
    pub fn estimate_gb(&self, size_gb: f64) -> CostEstimate {
        CostEstimate {
            storage: size_gb * self.rates.storage_per_gb,
            egress: size_gb * self.rates.egress_per_gb,
        }
    }

    /// Annotate one artifact with its estimate.
    pub fn cost_artifact(&self, artifact: Artifact) -> CostedArtifact {
        let est = self.estimate(artifact.size_bytes);
        CostedArtifact {
            artifact,
            estimated_storage_cost: est.storage,
            estimated_egress_cost: est.egress,
        }
    }

    /// Annotate every artifact and sum the tier totals.
    ///
    /// Items keep their input order.
    pub fn cost_all(&self, artifacts: Vec<Artifact>) -> (Vec<CostedArtifact>, TierSummary) {
        let mut summary = TierSummary::default();
        let costed: Vec<CostedArtifact> = artifacts
            .into_iter()
            .map(|a| {
                let item = self.cost_artifact(a);
                summary.add(&item);
                item
            })
            .collect();
        (costed, summary)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
