use crate::transaction::Jurisdiction;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

/// Caller-supplied knobs shared by the analysis components.
///
/// Everything here is global configuration; per-jurisdiction policy values
/// live behind [`crate::policy::JurisdictionPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Trailing window for nexus monitoring, in months
    pub monitoring_window_months: u32,
    /// Fraction of a nexus threshold at which a jurisdiction counts as approaching
    pub approaching_ratio: Decimal,
    /// Overpayments at or below this amount are treated as rounding noise
    pub overpayment_tolerance: Decimal,
    /// Assumed fraction of a filed refund claim actually recovered
    pub recovery_rate: Decimal,
    /// Jurisdictions where the caller is currently registered to collect tax
    pub registered: BTreeSet<Jurisdiction>,
    /// Days before a filing due date at which its status becomes Due
    pub due_warning_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            monitoring_window_months: 12,
            approaching_ratio: dec!(0.80),
            overpayment_tolerance: dec!(0.01),
            recovery_rate: dec!(0.85),
            registered: BTreeSet::new(),
            due_warning_days: 30,
        }
    }
}

impl EngineConfig {
    pub fn is_registered(&self, jurisdiction: Jurisdiction) -> bool {
        self.registered.contains(&jurisdiction)
    }
}
