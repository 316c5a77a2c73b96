//! Economic nexus monitoring.
//!
//! A pure fold over the supplied transaction history: no I/O, no state
//! across calls, results independent of call order.

use crate::config::EngineConfig;
use crate::policy::{JurisdictionPolicy, NexusThreshold, PolicyError};
use crate::transaction::{Jurisdiction, Transaction};
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NexusState {
    /// Activity well under the registration threshold
    Below,
    /// Within the configured ratio (default 80%) of a threshold
    Approaching,
    /// At or over a threshold; both boundaries are inclusive
    Established,
}

/// Nexus standing for one jurisdiction over the monitoring window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NexusStatus {
    pub jurisdiction: Jurisdiction,
    /// Pre-tax revenue within the window
    pub revenue: Decimal,
    /// Transaction count within the window
    pub transaction_count: u32,
    /// None when the jurisdiction has no economic nexus regime
    pub revenue_threshold: Option<Decimal>,
    pub transaction_threshold: Option<u32>,
    pub state: NexusState,
    /// Whether the caller is already registered here
    pub registered: bool,
    /// Established but not registered
    pub action_needed: bool,
}

/// Monitors cumulative activity per jurisdiction against registration
/// thresholds.
pub struct NexusMonitor<'a> {
    policy: &'a dyn JurisdictionPolicy,
    config: &'a EngineConfig,
}

impl<'a> NexusMonitor<'a> {
    pub fn new(policy: &'a dyn JurisdictionPolicy, config: &'a EngineConfig) -> Self {
        NexusMonitor { policy, config }
    }

    /// Assess every jurisdiction appearing in the history or on the
    /// watch-list, folding the transactions dated within the trailing
    /// monitoring window ending at `as_of`.
    ///
    /// Individually invalid transactions are skipped, not fatal.
    pub fn assess(
        &self,
        history: &[Transaction],
        watch: &[Jurisdiction],
        as_of: NaiveDate,
    ) -> Result<Vec<NexusStatus>, PolicyError> {
        let window_start = as_of
            .checked_sub_months(Months::new(self.config.monitoring_window_months))
            .unwrap_or(NaiveDate::MIN);

        let mut activity: BTreeMap<Jurisdiction, (Decimal, u32)> = BTreeMap::new();
        for jurisdiction in watch {
            activity.entry(*jurisdiction).or_insert((Decimal::ZERO, 0));
        }
        for txn in history {
            if let Err(error) = txn.validate() {
                log::warn!("nexus fold skipping transaction {}: {error}", txn.id);
                continue;
            }
            if txn.date <= window_start || txn.date > as_of {
                continue;
            }
            let entry = activity
                .entry(txn.jurisdiction)
                .or_insert((Decimal::ZERO, 0));
            entry.0 += txn.amount;
            entry.1 += 1;
        }

        let mut statuses = Vec::with_capacity(activity.len());
        for (jurisdiction, (revenue, count)) in activity {
            let threshold = self.policy.threshold_for(jurisdiction)?;
            let state = self.classify(revenue, count, threshold);
            let registered = self.config.is_registered(jurisdiction);
            statuses.push(NexusStatus {
                jurisdiction,
                revenue,
                transaction_count: count,
                revenue_threshold: threshold.map(|t| t.revenue),
                transaction_threshold: threshold.and_then(|t| t.transactions),
                state,
                registered,
                action_needed: state == NexusState::Established && !registered,
            });
        }
        Ok(statuses)
    }

    fn classify(
        &self,
        revenue: Decimal,
        count: u32,
        threshold: Option<NexusThreshold>,
    ) -> NexusState {
        let threshold = match threshold {
            Some(t) => t,
            None => return NexusState::Below,
        };
        let established = revenue >= threshold.revenue
            || threshold.transactions.is_some_and(|n| count >= n);
        if established {
            return NexusState::Established;
        }
        let ratio = self.config.approaching_ratio;
        let near_revenue = revenue >= threshold.revenue * ratio;
        let near_count = threshold
            .transactions
            .is_some_and(|n| Decimal::from(count) >= Decimal::from(n) * ratio);
        if near_revenue || near_count {
            NexusState::Approaching
        } else {
            NexusState::Below
        }
    }
}
