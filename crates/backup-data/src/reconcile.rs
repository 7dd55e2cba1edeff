//! Cross-tier reconciliation.
//!
//! Combines the listings of one logical scope (e.g. configuration archives)
//! from every tier into a single costed view. A failed tier never sinks the
//! view: it shows up empty with its error attached while the other tiers
//! stay fully populated.

use std::collections::BTreeSet;

use backup_core::error::SourceError;
use backup_core::formatting::human_size;
use backup_core::models::{CostedArtifact, Listing, Tier, TierSummary};
use backup_core::pricing::CostEstimator;
use serde::Serialize;
use tracing::warn;

/// Costed contents of one tier within a scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierView {
    pub tier: Tier,
    /// Totals over every artifact the tier reported, including any beyond
    /// the drill-down cap.
    pub summary: TierSummary,
    pub size_human: String,
    pub items: Vec<CostedArtifact>,
    /// `true` when `items` was cut to the drill-down cap.
    pub truncated: bool,
    pub error: Option<SourceError>,
}

impl TierView {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// How much of a scope could be assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeHealth {
    /// Every tier answered.
    Complete,
    /// At least one tier failed and at least one answered.
    Degraded,
    /// Every tier failed; the view is all zeros.
    Unavailable,
}

/// The combined view for one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeView {
    pub scope: String,
    pub health: ScopeHealth,
    pub local: TierView,
    pub remote: TierView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypervisor: Option<TierView>,
    /// Artifact names present locally but not remotely. `None` unless both
    /// tiers answered.
    pub local_only: Option<Vec<String>>,
    /// Artifact names present remotely but not locally. `None` unless both
    /// tiers answered.
    pub remote_only: Option<Vec<String>>,
}

impl ScopeView {
    /// Iterate over every tier present in this scope.
    pub fn tiers(&self) -> impl Iterator<Item = &TierView> {
        [Some(&self.local), Some(&self.remote), self.hypervisor.as_ref()]
            .into_iter()
            .flatten()
    }
}

/// Builds [`ScopeView`]s from tier listings.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationView {
    costs: CostEstimator,
    max_items: Option<usize>,
}

impl ReconciliationView {
    pub fn new(costs: CostEstimator) -> Self {
        Self {
            costs,
            max_items: None,
        }
    }

    /// Cap the drill-down item list of every tier. Summaries still cover
    /// everything.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Cost one tier's listing.
    pub fn tier_view(&self, listing: Listing) -> TierView {
        if let Some(err) = &listing.error {
            warn!(tier = %listing.tier, error = %err, "tier unavailable");
        }
        let (mut items, summary) = self.costs.cost_all(listing.artifacts);
        let truncated = match self.max_items {
            Some(max) if items.len() > max => {
                items.truncate(max);
                true
            }
            _ => false,
        };
        TierView {
            tier: listing.tier,
            size_human: human_size(summary.total_bytes),
            summary,
            items,
            truncated,
            error: listing.error,
        }
    }

    /// Combine the listings of one scope.
    pub fn build_scope(
        &self,
        scope: impl Into<String>,
        local: Listing,
        remote: Listing,
        hypervisor: Option<Listing>,
    ) -> ScopeView {
        let (local_only, remote_only) = if local.is_degraded() || remote.is_degraded() {
            (None, None)
        } else {
            let local_names: BTreeSet<&str> =
                local.artifacts.iter().map(|a| a.name.as_str()).collect();
            let remote_names: BTreeSet<&str> =
                remote.artifacts.iter().map(|a| a.name.as_str()).collect();
            (
                Some(difference(&local_names, &remote_names)),
                Some(difference(&remote_names, &local_names)),
            )
        };

        let local = self.tier_view(local);
        let remote = self.tier_view(remote);
        let hypervisor = hypervisor.map(|l| self.tier_view(l));

        let mut view = ScopeView {
            scope: scope.into(),
            health: ScopeHealth::Complete,
            local,
            remote,
            hypervisor,
            local_only,
            remote_only,
        };
        view.health = health_of(view.tiers());
        view
    }
}

fn difference(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> Vec<String> {
    a.difference(b).map(|s| s.to_string()).collect()
}

fn health_of<'a>(tiers: impl Iterator<Item = &'a TierView>) -> ScopeHealth {
    let (mut total, mut failed) = (0usize, 0usize);
    for t in tiers {
        total += 1;
        if t.is_failed() {
            failed += 1;
        }
    }
    match failed {
        0 => ScopeHealth::Complete,
        f if f == total => ScopeHealth::Unavailable,
        _ => ScopeHealth::Degraded,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
