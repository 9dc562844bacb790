//! Staleness aggregator: groups deals by how long their lenders have gone quiet.
//!
//! For every deal:
//! 1. Keep lenders that are actively tracked and carry a usable `updatedAt`
//! 2. Classify each against the caller's thresholds (via `ThresholdPolicy`)
//! 3. Put the deal in `critical` if any lender is critical, else in `warning`
//!    if any lender is warning, else leave it out
//!
//! The report is derived from scratch on every call. Thresholds and `now`
//! both move between calls, so nothing is cached.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use dealflow_common::types::{Deal, Freshness, LenderUpdate, StalenessThresholds};

use crate::threshold::ThresholdPolicy;

/// One deal in the staleness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleDeal {
    pub deal_id: Uuid,
    pub display_name: String,
    /// Lenders classified warning or critical.
    pub stale_lender_count: usize,
    /// Largest `daysSinceUpdate` among the stale lenders.
    pub max_days_since_update: u32,
}

/// Deals grouped by severity. The two buckets never share a deal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StalenessReport {
    pub critical: Vec<StaleDeal>,
    pub warning: Vec<StaleDeal>,
}

impl StalenessReport {
    pub fn total(&self) -> usize {
        self.critical.len() + self.warning.len()
    }

    pub fn is_empty(&self) -> bool {
        self.critical.is_empty() && self.warning.is_empty()
    }
}

/// Stateless aggregator over an already-fetched deal snapshot.
pub struct StalenessAggregator;

impl StalenessAggregator {
    /// Build the report for `deals` as of `now`.
    pub fn aggregate(
        deals: &[Deal],
        thresholds: &StalenessThresholds,
        now: DateTime<Utc>,
    ) -> StalenessReport {
        if thresholds.is_inverted() {
            tracing::warn!(
                warning_days = thresholds.warning_days,
                critical_days = thresholds.critical_days,
                "Warning threshold exceeds critical threshold; warning band is unreachable"
            );
        }

        let mut report = StalenessReport::default();

        for deal in deals {
            let mut worst = Freshness::Fresh;
            let mut stale_lender_count = 0usize;
            let mut max_days = 0u32;

            for lender in &deal.lenders {
                let Some(days) = Self::days_since_update(lender, now) else {
                    continue;
                };

                let class = ThresholdPolicy::classify_with(days, thresholds);
                if class == Freshness::Fresh {
                    continue;
                }

                stale_lender_count += 1;
                max_days = max_days.max(days);
                worst = worst.max(class);
            }

            let entry = StaleDeal {
                deal_id: deal.id,
                display_name: deal.company.clone(),
                stale_lender_count,
                max_days_since_update: max_days,
            };

            match worst {
                Freshness::Critical => report.critical.push(entry),
                Freshness::Warning => report.warning.push(entry),
                Freshness::Fresh => {}
            }
        }

        tracing::debug!(
            deals = deals.len(),
            critical = report.critical.len(),
            warning = report.warning.len(),
            "Staleness report computed"
        );

        report
    }

    /// Whole days elapsed since the lender's last update, rounded down.
    ///
    /// Returns `None` for lenders that are not considered at all: inactive
    /// ones and ones without a parseable timestamp. Future timestamps count
    /// as zero days.
    pub fn days_since_update(lender: &LenderUpdate, now: DateTime<Utc>) -> Option<u32> {
        if !lender.is_active() {
            return None;
        }

        let updated_at = match lender.last_updated_at() {
            Some(t) => t,
            None => {
                if lender.updated_at.is_some() {
                    tracing::debug!(
                        raw = ?lender.updated_at,
                        "Skipping lender with unparseable updatedAt"
                    );
                }
                return None;
            }
        };

        let days = (now - updated_at).num_days().max(0);
        Some(u32::try_from(days).unwrap_or(u32::MAX))
    }
}
