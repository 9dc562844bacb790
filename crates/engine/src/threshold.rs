//! Threshold policy: classifies a lender update as fresh, warning or critical.
//!
//! The cut-offs are always supplied by the caller. Nothing here falls back to a
//! default; a missing preference is resolved before reaching this module.

use dealflow_common::types::{Freshness, StalenessThresholds};

/// Pure classification of "days since last lender update".
pub struct ThresholdPolicy;

impl ThresholdPolicy {
    /// Classify `days_since_update` against the two cut-offs.
    ///
    /// Boundaries are inclusive and the critical check runs first, so a lender
    /// sitting exactly on a cut-off already gets the stricter class. When
    /// `warning_days > critical_days` the critical check shadows the warning
    /// band entirely.
    pub fn classify(days_since_update: u32, warning_days: u32, critical_days: u32) -> Freshness {
        if days_since_update >= critical_days {
            Freshness::Critical
        } else if days_since_update >= warning_days {
            Freshness::Warning
        } else {
            Freshness::Fresh
        }
    }

    /// Same as [`ThresholdPolicy::classify`] with the cut-offs bundled.
    pub fn classify_with(days_since_update: u32, thresholds: &StalenessThresholds) -> Freshness {
        Self::classify(
            days_since_update,
            thresholds.warning_days,
            thresholds.critical_days,
        )
    }
}
