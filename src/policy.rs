//! Jurisdiction policy: rates, exemptions, nexus thresholds, filing bands.
//!
//! The engine components only ever see the [`JurisdictionPolicy`] trait, so
//! the data source is fully substitutable. [`TablePolicy`] is the in-memory
//! implementation, validated wholesale at load time; a ready-made US state
//! table lives in [`us`].

pub mod us;

use crate::filing::FilingFrequency;
use crate::transaction::Jurisdiction;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),
    #[error("no rate in effect for {jurisdiction} on {as_of}")]
    NoRateForDate {
        jurisdiction: Jurisdiction,
        as_of: NaiveDate,
    },
    #[error("overlapping effective-date ranges for {jurisdiction} (local: {local:?})")]
    OverlappingRates {
        jurisdiction: Jurisdiction,
        local: Option<String>,
    },
    #[error("rate out of range for {jurisdiction}: {rate}")]
    InvalidRate {
        jurisdiction: Jurisdiction,
        rate: Decimal,
    },
    #[error("exemption fraction out of range for {jurisdiction} {category:?}: {fraction}")]
    InvalidFraction {
        jurisdiction: Jurisdiction,
        category: ExemptionCategory,
        fraction: Decimal,
    },
    #[error("filing due day out of range for {jurisdiction}: {due_day} (expected 1..=28)")]
    InvalidDueDay {
        jurisdiction: Jurisdiction,
        due_day: u32,
    },
    #[error("filing bands out of order for {jurisdiction}: monthly {monthly_at} < quarterly {quarterly_at}")]
    InvalidFilingBands {
        jurisdiction: Jurisdiction,
        monthly_at: Decimal,
        quarterly_at: Decimal,
    },
}

/// Canonical sales tax exemption categories recognized across states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExemptionCategory {
    Grocery,
    Clothing,
    PrescriptionDrug,
    MedicalDevice,
    ManufacturingEquipment,
    Agricultural,
    Resale,
    Nonprofit,
    Government,
    DigitalGoods,
    SoftwareSaas,
}

impl ExemptionCategory {
    /// Map a raw transaction category to its canonical tag.
    ///
    /// Matching is case-insensitive and accepts the common aliases seen in
    /// transaction feeds ("groceries", "rx", "saas", ...). An unrecognized
    /// category means no exemption, not an error.
    pub fn from_alias(raw: &str) -> Option<ExemptionCategory> {
        match raw.trim().to_lowercase().as_str() {
            "grocery" | "groceries" | "food" => Some(ExemptionCategory::Grocery),
            "clothing" | "apparel" => Some(ExemptionCategory::Clothing),
            "prescription" | "prescription_drug" | "rx" => {
                Some(ExemptionCategory::PrescriptionDrug)
            }
            "medical" | "medical_device" => Some(ExemptionCategory::MedicalDevice),
            "manufacturing" | "manufacturing_equipment" => {
                Some(ExemptionCategory::ManufacturingEquipment)
            }
            "agricultural" => Some(ExemptionCategory::Agricultural),
            "resale" => Some(ExemptionCategory::Resale),
            "nonprofit" => Some(ExemptionCategory::Nonprofit),
            "government" => Some(ExemptionCategory::Government),
            "digital" | "digital_goods" => Some(ExemptionCategory::DigitalGoods),
            "software" | "saas" | "software_saas" => Some(ExemptionCategory::SoftwareSaas),
            _ => None,
        }
    }
}

/// Resolved rates for one transaction: state base rate plus local overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateQuote {
    pub base_rate: Decimal,
    pub local_rate: Decimal,
}

impl RateQuote {
    pub fn combined(&self) -> Decimal {
        self.base_rate + self.local_rate
    }
}

/// One effective-dated rate row.
///
/// A row with `local: None` carries the state base rate; a row with a local
/// name carries the overlay for that city/county/district. Ranges are
/// inclusive on both ends; `effective_to: None` means open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub jurisdiction: Jurisdiction,
    pub local: Option<String>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub base_rate: Decimal,
    pub local_rate: Decimal,
}

impl RateEntry {
    fn covers(&self, as_of: NaiveDate) -> bool {
        self.effective_from <= as_of && self.effective_to.map_or(true, |to| as_of <= to)
    }
}

/// One effective-dated exemption row: fraction of the sale amount exempt
/// from tax for the given category, 1 = fully exempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExemptionRule {
    pub jurisdiction: Jurisdiction,
    pub category: ExemptionCategory,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub fraction: Decimal,
}

impl ExemptionRule {
    fn covers(&self, as_of: NaiveDate) -> bool {
        self.effective_from <= as_of && self.effective_to.map_or(true, |to| as_of <= to)
    }
}

/// Economic nexus registration threshold.
///
/// Post-Wayfair, most states use $100k revenue OR 200 transactions; both
/// boundaries are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NexusThreshold {
    pub revenue: Decimal,
    pub transactions: Option<u32>,
}

/// Filing-frequency bands keyed by estimated annual liability.
///
/// Lower liability gets longer filing periods, matching how states actually
/// assign frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilingBands {
    /// Annual liability at or above which filing is monthly
    pub monthly_at: Decimal,
    /// Annual liability at or above which filing is quarterly
    pub quarterly_at: Decimal,
}

impl Default for FilingBands {
    fn default() -> Self {
        // Common state cutoffs: > $400/mo files monthly, > $1,200/yr quarterly
        FilingBands {
            monthly_at: dec!(4800),
            quarterly_at: dec!(1200),
        }
    }
}

impl FilingBands {
    pub fn frequency_for(&self, annual_liability: Decimal) -> FilingFrequency {
        if annual_liability >= self.monthly_at {
            FilingFrequency::Monthly
        } else if annual_liability >= self.quarterly_at {
            FilingFrequency::Quarterly
        } else {
            FilingFrequency::Annual
        }
    }
}

/// Per-jurisdiction scalar policy: nexus threshold, filing bands, refund
/// statute of limitations, filing due day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionEntry {
    pub jurisdiction: Jurisdiction,
    /// None for jurisdictions with no economic nexus regime (no sales tax)
    pub threshold: Option<NexusThreshold>,
    pub filing_bands: FilingBands,
    /// Refund claim statute of limitations, in years from transaction date
    pub sol_years: u32,
    /// Day of the month following period end on which returns are due
    pub due_day: u32,
}

/// Read-only policy queries the engine depends on.
///
/// Implementations must be safely readable by many concurrent callers; any
/// caching is rebuilt wholesale on policy update, never mutated in place.
pub trait JurisdictionPolicy {
    /// Base + local rate in effect on `as_of`.
    ///
    /// An unknown local name falls back to the base rate with no local tax;
    /// an unknown jurisdiction or a date no entry covers is an error.
    fn rate_for(
        &self,
        jurisdiction: Jurisdiction,
        local: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<RateQuote, PolicyError>;

    /// Exempt fraction in [0, 1] for a transaction category; 0 when the
    /// category is absent or unmatched.
    fn exemption_for(
        &self,
        jurisdiction: Jurisdiction,
        category: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<Decimal, PolicyError>;

    /// Economic nexus threshold; None where no nexus regime exists.
    fn threshold_for(&self, jurisdiction: Jurisdiction)
        -> Result<Option<NexusThreshold>, PolicyError>;

    /// Filing frequency for an estimated annual liability.
    fn filing_band_for(
        &self,
        jurisdiction: Jurisdiction,
        annual_liability: Decimal,
    ) -> Result<FilingFrequency, PolicyError>;

    /// Refund claim statute of limitations in years.
    fn sol_years_for(&self, jurisdiction: Jurisdiction) -> Result<u32, PolicyError>;

    /// Day of the month following period end on which a return is due.
    fn due_day_for(&self, jurisdiction: Jurisdiction) -> Result<u32, PolicyError>;
}

type RateKey = (Jurisdiction, Option<String>);

/// In-memory [`JurisdictionPolicy`] backed by effective-dated tables.
///
/// Construction validates the whole table up front: out-of-range rates or
/// fractions and overlapping effective-date ranges are fatal before any
/// calculation runs. The loaded table is immutable.
#[derive(Debug, Clone)]
pub struct TablePolicy {
    jurisdictions: BTreeMap<Jurisdiction, JurisdictionEntry>,
    rates: BTreeMap<RateKey, Vec<RateEntry>>,
    exemptions: BTreeMap<(Jurisdiction, ExemptionCategory), Vec<ExemptionRule>>,
}

impl TablePolicy {
    pub fn new(
        jurisdictions: Vec<JurisdictionEntry>,
        rates: Vec<RateEntry>,
        exemptions: Vec<ExemptionRule>,
    ) -> Result<TablePolicy, PolicyError> {
        let mut jurisdiction_map = BTreeMap::new();
        for entry in jurisdictions {
            if !(1..=28).contains(&entry.due_day) {
                return Err(PolicyError::InvalidDueDay {
                    jurisdiction: entry.jurisdiction,
                    due_day: entry.due_day,
                });
            }
            if entry.filing_bands.monthly_at < entry.filing_bands.quarterly_at {
                return Err(PolicyError::InvalidFilingBands {
                    jurisdiction: entry.jurisdiction,
                    monthly_at: entry.filing_bands.monthly_at,
                    quarterly_at: entry.filing_bands.quarterly_at,
                });
            }
            jurisdiction_map.insert(entry.jurisdiction, entry);
        }

        let mut rate_map: BTreeMap<RateKey, Vec<RateEntry>> = BTreeMap::new();
        for rate in rates {
            if !jurisdiction_map.contains_key(&rate.jurisdiction) {
                return Err(PolicyError::UnknownJurisdiction(
                    rate.jurisdiction.to_string(),
                ));
            }
            for value in [rate.base_rate, rate.local_rate] {
                if value.is_sign_negative() || value > Decimal::ONE {
                    return Err(PolicyError::InvalidRate {
                        jurisdiction: rate.jurisdiction,
                        rate: value,
                    });
                }
            }
            let key = (rate.jurisdiction, rate.local.as_deref().map(str::to_lowercase));
            rate_map.entry(key).or_default().push(rate);
        }
        for ((jurisdiction, local), entries) in rate_map.iter_mut() {
            entries.sort_by_key(|e| e.effective_from);
            if has_overlap(entries.iter().map(|e| (e.effective_from, e.effective_to))) {
                return Err(PolicyError::OverlappingRates {
                    jurisdiction: *jurisdiction,
                    local: local.clone(),
                });
            }
        }

        let mut exemption_map: BTreeMap<(Jurisdiction, ExemptionCategory), Vec<ExemptionRule>> =
            BTreeMap::new();
        for rule in exemptions {
            if !jurisdiction_map.contains_key(&rule.jurisdiction) {
                return Err(PolicyError::UnknownJurisdiction(
                    rule.jurisdiction.to_string(),
                ));
            }
            if rule.fraction.is_sign_negative() || rule.fraction > Decimal::ONE {
                return Err(PolicyError::InvalidFraction {
                    jurisdiction: rule.jurisdiction,
                    category: rule.category,
                    fraction: rule.fraction,
                });
            }
            exemption_map
                .entry((rule.jurisdiction, rule.category))
                .or_default()
                .push(rule);
        }
        for ((jurisdiction, _), rules) in exemption_map.iter_mut() {
            rules.sort_by_key(|r| r.effective_from);
            if has_overlap(rules.iter().map(|r| (r.effective_from, r.effective_to))) {
                return Err(PolicyError::OverlappingRates {
                    jurisdiction: *jurisdiction,
                    local: None,
                });
            }
        }

        Ok(TablePolicy {
            jurisdictions: jurisdiction_map,
            rates: rate_map,
            exemptions: exemption_map,
        })
    }

    pub fn jurisdiction_count(&self) -> usize {
        self.jurisdictions.len()
    }

    fn entry(&self, jurisdiction: Jurisdiction) -> Result<&JurisdictionEntry, PolicyError> {
        self.jurisdictions
            .get(&jurisdiction)
            .ok_or_else(|| PolicyError::UnknownJurisdiction(jurisdiction.to_string()))
    }
}

/// Entries must be sorted by start date; an earlier open-ended range, or one
/// whose end reaches the next start, overlaps.
fn has_overlap(mut ranges: impl Iterator<Item = (NaiveDate, Option<NaiveDate>)>) -> bool {
    let mut prev = match ranges.next() {
        Some(first) => first,
        None => return false,
    };
    for (from, to) in ranges {
        match prev.1 {
            None => return true,
            Some(prev_to) if prev_to >= from => return true,
            Some(_) => {}
        }
        prev = (from, to);
    }
    false
}

impl JurisdictionPolicy for TablePolicy {
    fn rate_for(
        &self,
        jurisdiction: Jurisdiction,
        local: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<RateQuote, PolicyError> {
        self.entry(jurisdiction)?;
        let base = self
            .rates
            .get(&(jurisdiction, None))
            .and_then(|entries| entries.iter().find(|e| e.covers(as_of)))
            .ok_or(PolicyError::NoRateForDate {
                jurisdiction,
                as_of,
            })?;

        let local_rate = match local {
            None => base.local_rate,
            Some(name) => {
                match self.rates.get(&(jurisdiction, Some(name.to_lowercase()))) {
                    None => {
                        // Unknown local jurisdiction: base rate only, by contract
                        log::debug!(
                            "no local rate for {jurisdiction}/{name}, falling back to base rate"
                        );
                        base.local_rate
                    }
                    Some(entries) => {
                        entries
                            .iter()
                            .find(|e| e.covers(as_of))
                            .ok_or(PolicyError::NoRateForDate {
                                jurisdiction,
                                as_of,
                            })?
                            .local_rate
                    }
                }
            }
        };

        Ok(RateQuote {
            base_rate: base.base_rate,
            local_rate,
        })
    }

    fn exemption_for(
        &self,
        jurisdiction: Jurisdiction,
        category: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<Decimal, PolicyError> {
        self.entry(jurisdiction)?;
        let tag = match category.and_then(ExemptionCategory::from_alias) {
            Some(tag) => tag,
            None => return Ok(Decimal::ZERO),
        };
        let fraction = self
            .exemptions
            .get(&(jurisdiction, tag))
            .and_then(|rules| rules.iter().find(|r| r.covers(as_of)))
            .map(|r| r.fraction)
            .unwrap_or(Decimal::ZERO);
        Ok(fraction)
    }

    fn threshold_for(
        &self,
        jurisdiction: Jurisdiction,
    ) -> Result<Option<NexusThreshold>, PolicyError> {
        Ok(self.entry(jurisdiction)?.threshold)
    }

    fn filing_band_for(
        &self,
        jurisdiction: Jurisdiction,
        annual_liability: Decimal,
    ) -> Result<FilingFrequency, PolicyError> {
        Ok(self
            .entry(jurisdiction)?
            .filing_bands
            .frequency_for(annual_liability))
    }

    fn sol_years_for(&self, jurisdiction: Jurisdiction) -> Result<u32, PolicyError> {
        Ok(self.entry(jurisdiction)?.sol_years)
    }

    fn due_day_for(&self, jurisdiction: Jurisdiction) -> Result<u32, PolicyError> {
        Ok(self.entry(jurisdiction)?.due_day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn j(code: &str) -> Jurisdiction {
        code.parse().unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn entry(code: &str) -> JurisdictionEntry {
        JurisdictionEntry {
            jurisdiction: j(code),
            threshold: Some(NexusThreshold {
                revenue: dec!(100000),
                transactions: Some(200),
            }),
            filing_bands: FilingBands::default(),
            sol_years: 3,
            due_day: 20,
        }
    }

    fn base_rate(code: &str, from: NaiveDate, to: Option<NaiveDate>, rate: Decimal) -> RateEntry {
        RateEntry {
            jurisdiction: j(code),
            local: None,
            effective_from: from,
            effective_to: to,
            base_rate: rate,
            local_rate: Decimal::ZERO,
        }
    }

    fn simple_policy() -> TablePolicy {
        TablePolicy::new(
            vec![entry("TX")],
            vec![
                base_rate("TX", d(2020, 1, 1), Some(d(2022, 12, 31)), dec!(0.06)),
                base_rate("TX", d(2023, 1, 1), None, dec!(0.0625)),
                RateEntry {
                    jurisdiction: j("TX"),
                    local: Some("Houston".to_string()),
                    effective_from: d(2020, 1, 1),
                    effective_to: None,
                    base_rate: dec!(0.0625),
                    local_rate: dec!(0.02),
                },
            ],
            vec![ExemptionRule {
                jurisdiction: j("TX"),
                category: ExemptionCategory::Grocery,
                effective_from: d(2020, 1, 1),
                effective_to: None,
                fraction: Decimal::ONE,
            }],
        )
        .unwrap()
    }

    #[test]
    fn picks_rate_entry_covering_as_of_date() {
        let policy = simple_policy();
        let old = policy.rate_for(j("TX"), None, d(2022, 6, 1)).unwrap();
        assert_eq!(old.base_rate, dec!(0.06));
        let current = policy.rate_for(j("TX"), None, d(2024, 6, 1)).unwrap();
        assert_eq!(current.base_rate, dec!(0.0625));
    }

    #[test]
    fn date_before_any_entry_fails() {
        let policy = simple_policy();
        let err = policy.rate_for(j("TX"), None, d(2019, 12, 31)).unwrap_err();
        assert_eq!(
            err,
            PolicyError::NoRateForDate {
                jurisdiction: j("TX"),
                as_of: d(2019, 12, 31),
            }
        );
    }

    #[test]
    fn local_lookup_is_case_insensitive() {
        let policy = simple_policy();
        let quote = policy
            .rate_for(j("TX"), Some("HOUSTON"), d(2024, 6, 1))
            .unwrap();
        assert_eq!(quote.local_rate, dec!(0.02));
        assert_eq!(quote.combined(), dec!(0.0825));
    }

    #[test]
    fn unknown_local_falls_back_to_base_only() {
        let policy = simple_policy();
        let quote = policy
            .rate_for(j("TX"), Some("Nowhereville"), d(2024, 6, 1))
            .unwrap();
        assert_eq!(quote.base_rate, dec!(0.0625));
        assert_eq!(quote.local_rate, Decimal::ZERO);
    }

    #[test]
    fn unknown_jurisdiction_fails() {
        let policy = simple_policy();
        let err = policy.rate_for(j("ZZ"), None, d(2024, 6, 1)).unwrap_err();
        assert_eq!(err, PolicyError::UnknownJurisdiction("ZZ".to_string()));
    }

    #[test]
    fn exemption_alias_and_fallback() {
        let policy = simple_policy();
        let as_of = d(2024, 6, 1);
        assert_eq!(
            policy.exemption_for(j("TX"), Some("Groceries"), as_of).unwrap(),
            Decimal::ONE
        );
        assert_eq!(
            policy.exemption_for(j("TX"), Some("food"), as_of).unwrap(),
            Decimal::ONE
        );
        // Clothing is not exempt in TX
        assert_eq!(
            policy.exemption_for(j("TX"), Some("clothing"), as_of).unwrap(),
            Decimal::ZERO
        );
        assert_eq!(policy.exemption_for(j("TX"), None, as_of).unwrap(), Decimal::ZERO);
        assert_eq!(
            policy
                .exemption_for(j("TX"), Some("unheard-of"), as_of)
                .unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn overlapping_ranges_rejected_at_load() {
        let err = TablePolicy::new(
            vec![entry("TX")],
            vec![
                base_rate("TX", d(2020, 1, 1), None, dec!(0.06)),
                base_rate("TX", d(2023, 1, 1), None, dec!(0.0625)),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(
            err,
            PolicyError::OverlappingRates {
                jurisdiction: j("TX"),
                local: None,
            }
        );
    }

    #[test]
    fn touching_range_boundaries_rejected() {
        let err = TablePolicy::new(
            vec![entry("TX")],
            vec![
                base_rate("TX", d(2020, 1, 1), Some(d(2023, 1, 1)), dec!(0.06)),
                base_rate("TX", d(2023, 1, 1), None, dec!(0.0625)),
            ],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::OverlappingRates { .. }));
    }

    #[test]
    fn out_of_range_rate_rejected_at_load() {
        let err = TablePolicy::new(
            vec![entry("TX")],
            vec![base_rate("TX", d(2020, 1, 1), None, dec!(1.5))],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRate { .. }));
    }

    #[test]
    fn out_of_range_fraction_rejected_at_load() {
        let err = TablePolicy::new(
            vec![entry("TX")],
            vec![base_rate("TX", d(2020, 1, 1), None, dec!(0.0625))],
            vec![ExemptionRule {
                jurisdiction: j("TX"),
                category: ExemptionCategory::Grocery,
                effective_from: d(2020, 1, 1),
                effective_to: None,
                fraction: dec!(1.01),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidFraction { .. }));
    }

    #[test]
    fn rate_for_unlisted_jurisdiction_rejected_at_load() {
        let err = TablePolicy::new(
            vec![entry("TX")],
            vec![base_rate("CA", d(2020, 1, 1), None, dec!(0.0725))],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::UnknownJurisdiction("CA".to_string()));
    }

    #[test]
    fn filing_bands_assign_longer_periods_to_lower_liability() {
        let bands = FilingBands::default();
        assert_eq!(bands.frequency_for(dec!(100)), FilingFrequency::Annual);
        assert_eq!(bands.frequency_for(dec!(1200)), FilingFrequency::Quarterly);
        assert_eq!(bands.frequency_for(dec!(4800)), FilingFrequency::Monthly);
        assert_eq!(bands.frequency_for(dec!(250000)), FilingFrequency::Monthly);
    }

    #[test]
    fn category_alias_table() {
        assert_eq!(
            ExemptionCategory::from_alias("RX"),
            Some(ExemptionCategory::PrescriptionDrug)
        );
        assert_eq!(
            ExemptionCategory::from_alias(" apparel "),
            Some(ExemptionCategory::Clothing)
        );
        assert_eq!(
            ExemptionCategory::from_alias("saas"),
            Some(ExemptionCategory::SoftwareSaas)
        );
        assert_eq!(ExemptionCategory::from_alias("furniture"), None);
    }
}
