//! Built-in US state + DC policy table.
//!
//! Base rates, local overlays and category exemptions current as of 2024
//! legislative sessions, economic nexus thresholds per post-Wayfair state
//! standards, refund statute-of-limitations and filing due days per state
//! revenue department publications. Effective from 2020-01-01, open-ended;
//! callers with older history should load their own [`TablePolicy`] with
//! the historical rate rows.

use super::{
    ExemptionCategory, FilingBands, JurisdictionEntry, NexusThreshold, PolicyError, RateEntry,
    ExemptionRule, TablePolicy,
};
use crate::transaction::Jurisdiction;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ExemptionCategory::{
    Clothing, Grocery, MedicalDevice, PrescriptionDrug,
};

fn effective_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date")
}

struct StateDef {
    code: &'static str,
    base_rate: Decimal,
    locals: Vec<(&'static str, Decimal)>,
    exempt: Vec<ExemptionCategory>,
    threshold: Option<NexusThreshold>,
    sol_years: u32,
    due_day: u32,
}

/// Most states: $100k revenue or 200 transactions, 3-year SOL, due on the 20th.
fn st(code: &'static str, base_rate: Decimal) -> StateDef {
    StateDef {
        code,
        base_rate,
        locals: Vec::new(),
        exempt: Vec::new(),
        threshold: Some(NexusThreshold {
            revenue: dec!(100000),
            transactions: Some(200),
        }),
        sol_years: 3,
        due_day: 20,
    }
}

impl StateDef {
    fn locals(mut self, locals: Vec<(&'static str, Decimal)>) -> Self {
        self.locals = locals;
        self
    }

    fn exempt(mut self, categories: &[ExemptionCategory]) -> Self {
        self.exempt = categories.to_vec();
        self
    }

    /// Revenue-only nexus threshold (no transaction-count test).
    fn revenue_only(mut self, revenue: Decimal) -> Self {
        self.threshold = Some(NexusThreshold {
            revenue,
            transactions: None,
        });
        self
    }

    fn threshold(mut self, revenue: Decimal, transactions: u32) -> Self {
        self.threshold = Some(NexusThreshold {
            revenue,
            transactions: Some(transactions),
        });
        self
    }

    /// No sales tax, no economic nexus regime.
    fn no_nexus(mut self) -> Self {
        self.threshold = None;
        self
    }

    fn sol(mut self, years: u32) -> Self {
        self.sol_years = years;
        self
    }

    fn due(mut self, day: u32) -> Self {
        self.due_day = day;
        self
    }
}

fn states() -> Vec<StateDef> {
    vec![
        st("AL", dec!(0.04))
            .locals(vec![
                ("Birmingham", dec!(0.04)),
                ("Montgomery", dec!(0.035)),
                ("Mobile", dec!(0.04)),
                ("Huntsville", dec!(0.03)),
            ])
            .exempt(&[PrescriptionDrug])
            .revenue_only(dec!(250000)),
        // No state sales tax, but localities impose their own
        st("AK", dec!(0.0)).locals(vec![("Juneau", dec!(0.05)), ("Kodiak", dec!(0.07))]),
        st("AZ", dec!(0.056))
            .locals(vec![
                ("Phoenix", dec!(0.023)),
                ("Tucson", dec!(0.026)),
                ("Scottsdale", dec!(0.0175)),
                ("Mesa", dec!(0.0175)),
            ])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000))
            .sol(4),
        st("AR", dec!(0.065))
            .locals(vec![("Little Rock", dec!(0.03)), ("Fort Smith", dec!(0.0275))])
            .exempt(&[PrescriptionDrug]),
        st("CA", dec!(0.0725))
            .locals(vec![
                ("Los Angeles", dec!(0.025)),
                ("San Francisco", dec!(0.0125)),
                ("San Diego", dec!(0.0075)),
                ("San Jose", dec!(0.0125)),
                ("Sacramento", dec!(0.0075)),
            ])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(500000))
            .due(25),
        st("CO", dec!(0.029))
            .locals(vec![
                ("Denver", dec!(0.0481)),
                ("Colorado Springs", dec!(0.031)),
                ("Aurora", dec!(0.0375)),
            ])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("CT", dec!(0.0635)).exempt(&[Grocery, Clothing, PrescriptionDrug]),
        st("DE", dec!(0.0)).no_nexus(),
        st("FL", dec!(0.06))
            .locals(vec![
                ("Miami", dec!(0.01)),
                ("Orlando", dec!(0.005)),
                ("Tampa", dec!(0.015)),
                ("Jacksonville", dec!(0.005)),
            ])
            .exempt(&[Grocery, PrescriptionDrug, MedicalDevice])
            .revenue_only(dec!(100000)),
        st("GA", dec!(0.04))
            .locals(vec![("Atlanta", dec!(0.0389)), ("Savannah", dec!(0.04))])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("HI", dec!(0.04))
            .locals(vec![("Honolulu", dec!(0.005))])
            .exempt(&[PrescriptionDrug]),
        st("ID", dec!(0.06))
            .locals(vec![("Sun Valley", dec!(0.03))])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("IL", dec!(0.0625))
            .locals(vec![
                ("Chicago", dec!(0.0475)),
                ("Springfield", dec!(0.0225)),
                ("Naperville", dec!(0.0175)),
            ])
            .exempt(&[Grocery, PrescriptionDrug, MedicalDevice])
            .sol(4),
        st("IN", dec!(0.07)).exempt(&[Grocery, PrescriptionDrug]),
        st("IA", dec!(0.06))
            .locals(vec![("Des Moines", dec!(0.01)), ("Cedar Rapids", dec!(0.01))])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("KS", dec!(0.065))
            .locals(vec![("Wichita", dec!(0.0225)), ("Topeka", dec!(0.0215))])
            .exempt(&[PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("KY", dec!(0.06)).exempt(&[Grocery, PrescriptionDrug]),
        st("LA", dec!(0.0445))
            .locals(vec![("New Orleans", dec!(0.05)), ("Baton Rouge", dec!(0.05))])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("ME", dec!(0.055)).exempt(&[Grocery, PrescriptionDrug]),
        st("MD", dec!(0.06)).exempt(&[Grocery, Clothing, PrescriptionDrug, MedicalDevice]),
        st("MA", dec!(0.0625))
            .exempt(&[Grocery, Clothing, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("MI", dec!(0.06)).exempt(&[Grocery, PrescriptionDrug]),
        st("MN", dec!(0.06875))
            .locals(vec![("Minneapolis", dec!(0.02)), ("St. Paul", dec!(0.0175))])
            .exempt(&[Grocery, Clothing, PrescriptionDrug])
            .threshold(dec!(100000), 10),
        st("MS", dec!(0.07))
            .locals(vec![("Jackson", dec!(0.01))])
            .exempt(&[PrescriptionDrug])
            .revenue_only(dec!(250000)),
        st("MO", dec!(0.04225))
            .locals(vec![
                ("St. Louis City", dec!(0.049)),
                ("Kansas City", dec!(0.04)),
                ("Springfield", dec!(0.0335)),
            ])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("MT", dec!(0.0)).no_nexus(),
        st("NE", dec!(0.055))
            .locals(vec![("Omaha", dec!(0.02)), ("Lincoln", dec!(0.0175))])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("NV", dec!(0.0685))
            .locals(vec![("Las Vegas", dec!(0.0138)), ("Reno", dec!(0.0098))])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("NH", dec!(0.0)).no_nexus(),
        st("NJ", dec!(0.06625))
            .exempt(&[Grocery, Clothing, PrescriptionDrug, MedicalDevice])
            .sol(4),
        st("NM", dec!(0.04875))
            .locals(vec![("Albuquerque", dec!(0.0281)), ("Santa Fe", dec!(0.0344))])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("NY", dec!(0.04))
            .locals(vec![
                ("New York City", dec!(0.045)),
                ("Buffalo", dec!(0.04)),
                ("Albany", dec!(0.04)),
                ("Syracuse", dec!(0.04)),
            ])
            .exempt(&[Grocery, Clothing, PrescriptionDrug])
            .threshold(dec!(500000), 100),
        st("NC", dec!(0.0475))
            .locals(vec![
                ("Charlotte", dec!(0.025)),
                ("Raleigh", dec!(0.0225)),
                ("Durham", dec!(0.025)),
            ])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("ND", dec!(0.05))
            .locals(vec![("Fargo", dec!(0.025)), ("Bismarck", dec!(0.02))])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("OH", dec!(0.0575))
            .locals(vec![
                ("Columbus", dec!(0.0175)),
                ("Cleveland", dec!(0.0225)),
                ("Cincinnati", dec!(0.02)),
            ])
            .exempt(&[Grocery, PrescriptionDrug])
            .sol(4)
            .due(23),
        st("OK", dec!(0.045))
            .locals(vec![("Oklahoma City", dec!(0.0413)), ("Tulsa", dec!(0.0467))])
            .exempt(&[PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("OR", dec!(0.0)).no_nexus(),
        st("PA", dec!(0.06))
            .locals(vec![("Philadelphia", dec!(0.02)), ("Pittsburgh", dec!(0.01))])
            .exempt(&[Grocery, Clothing, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("RI", dec!(0.07)).exempt(&[Grocery, Clothing, PrescriptionDrug]),
        st("SC", dec!(0.06))
            .locals(vec![("Charleston", dec!(0.025)), ("Columbia", dec!(0.02))])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("SD", dec!(0.042))
            .locals(vec![("Sioux Falls", dec!(0.02)), ("Rapid City", dec!(0.02))])
            .exempt(&[PrescriptionDrug]),
        st("TN", dec!(0.07))
            .locals(vec![
                ("Nashville", dec!(0.0225)),
                ("Memphis", dec!(0.0225)),
                ("Knoxville", dec!(0.0225)),
            ])
            .exempt(&[PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("TX", dec!(0.0625))
            .locals(vec![
                ("Houston", dec!(0.02)),
                ("Dallas", dec!(0.02)),
                ("Austin", dec!(0.02)),
                ("San Antonio", dec!(0.02)),
                ("Fort Worth", dec!(0.02)),
            ])
            .exempt(&[Grocery, PrescriptionDrug, MedicalDevice])
            .revenue_only(dec!(500000))
            .sol(4),
        st("UT", dec!(0.0485))
            .locals(vec![("Salt Lake City", dec!(0.0235)), ("Provo", dec!(0.0225))])
            .exempt(&[PrescriptionDrug]),
        st("VT", dec!(0.06))
            .locals(vec![("Burlington", dec!(0.01))])
            .exempt(&[Grocery, Clothing, PrescriptionDrug]),
        st("VA", dec!(0.043))
            .locals(vec![
                ("Virginia Beach", dec!(0.017)),
                ("Richmond", dec!(0.017)),
                ("Norfolk", dec!(0.017)),
            ])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("WA", dec!(0.065))
            .locals(vec![
                ("Seattle", dec!(0.0375)),
                ("Tacoma", dec!(0.028)),
                ("Spokane", dec!(0.024)),
            ])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000))
            .sol(4)
            .due(25),
        st("WV", dec!(0.06))
            .locals(vec![("Charleston", dec!(0.01))])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("WI", dec!(0.05))
            .locals(vec![("Milwaukee", dec!(0.0175)), ("Madison", dec!(0.005))])
            .exempt(&[Grocery, PrescriptionDrug])
            .revenue_only(dec!(100000)),
        st("WY", dec!(0.04))
            .locals(vec![("Cheyenne", dec!(0.01)), ("Casper", dec!(0.015))])
            .exempt(&[Grocery, PrescriptionDrug]),
        st("DC", dec!(0.06)).exempt(&[Grocery, PrescriptionDrug]),
    ]
}

/// Load the built-in US policy table.
pub fn policy() -> Result<TablePolicy, PolicyError> {
    let from = effective_from();
    let mut jurisdictions = Vec::new();
    let mut rates = Vec::new();
    let mut exemptions = Vec::new();

    for def in states() {
        let jurisdiction: Jurisdiction = def
            .code
            .parse()
            .expect("built-in state codes are two letters");
        jurisdictions.push(JurisdictionEntry {
            jurisdiction,
            threshold: def.threshold,
            filing_bands: FilingBands::default(),
            sol_years: def.sol_years,
            due_day: def.due_day,
        });
        rates.push(RateEntry {
            jurisdiction,
            local: None,
            effective_from: from,
            effective_to: None,
            base_rate: def.base_rate,
            local_rate: Decimal::ZERO,
        });
        for (name, local_rate) in def.locals {
            rates.push(RateEntry {
                jurisdiction,
                local: Some(name.to_string()),
                effective_from: from,
                effective_to: None,
                base_rate: def.base_rate,
                local_rate,
            });
        }
        for category in def.exempt {
            exemptions.push(ExemptionRule {
                jurisdiction,
                category,
                effective_from: from,
                effective_to: None,
                fraction: Decimal::ONE,
            });
        }
    }

    TablePolicy::new(jurisdictions, rates, exemptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::JurisdictionPolicy;

    fn j(code: &str) -> Jurisdiction {
        code.parse().unwrap()
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn table_loads_all_states_plus_dc() {
        let policy = policy().unwrap();
        assert_eq!(policy.jurisdiction_count(), 51);
    }

    #[test]
    fn texas_houston_combined_rate() {
        let policy = policy().unwrap();
        let quote = policy.rate_for(j("TX"), Some("Houston"), as_of()).unwrap();
        assert_eq!(quote.base_rate, dec!(0.0625));
        assert_eq!(quote.local_rate, dec!(0.02));
        assert_eq!(quote.combined(), dec!(0.0825));
    }

    #[test]
    fn alaska_is_local_option_only() {
        let policy = policy().unwrap();
        let juneau = policy.rate_for(j("AK"), Some("Juneau"), as_of()).unwrap();
        assert_eq!(juneau.base_rate, Decimal::ZERO);
        assert_eq!(juneau.local_rate, dec!(0.05));
        let statewide = policy.rate_for(j("AK"), None, as_of()).unwrap();
        assert_eq!(statewide.combined(), Decimal::ZERO);
    }

    #[test]
    fn no_tax_states_have_no_nexus_regime() {
        let policy = policy().unwrap();
        for code in ["DE", "MT", "NH", "OR"] {
            assert_eq!(policy.threshold_for(j(code)).unwrap(), None, "{code}");
            assert_eq!(
                policy.rate_for(j(code), None, as_of()).unwrap().combined(),
                Decimal::ZERO,
                "{code}"
            );
        }
    }

    #[test]
    fn wayfair_style_thresholds() {
        let policy = policy().unwrap();
        let sd = policy.threshold_for(j("SD")).unwrap().unwrap();
        assert_eq!(sd.revenue, dec!(100000));
        assert_eq!(sd.transactions, Some(200));
        let tx = policy.threshold_for(j("TX")).unwrap().unwrap();
        assert_eq!(tx.revenue, dec!(500000));
        assert_eq!(tx.transactions, None);
        let ny = policy.threshold_for(j("NY")).unwrap().unwrap();
        assert_eq!(ny.revenue, dec!(500000));
        assert_eq!(ny.transactions, Some(100));
    }

    #[test]
    fn statute_of_limitations_years() {
        let policy = policy().unwrap();
        assert_eq!(policy.sol_years_for(j("TX")).unwrap(), 4);
        assert_eq!(policy.sol_years_for(j("IL")).unwrap(), 4);
        assert_eq!(policy.sol_years_for(j("CA")).unwrap(), 3);
        assert_eq!(policy.sol_years_for(j("NY")).unwrap(), 3);
    }

    #[test]
    fn filing_due_days() {
        let policy = policy().unwrap();
        assert_eq!(policy.due_day_for(j("CA")).unwrap(), 25);
        assert_eq!(policy.due_day_for(j("OH")).unwrap(), 23);
        assert_eq!(policy.due_day_for(j("TX")).unwrap(), 20);
    }

    #[test]
    fn grocery_exemption_varies_by_state() {
        let policy = policy().unwrap();
        assert_eq!(
            policy.exemption_for(j("TX"), Some("grocery"), as_of()).unwrap(),
            Decimal::ONE
        );
        // MS taxes groceries at the full rate
        assert_eq!(
            policy.exemption_for(j("MS"), Some("grocery"), as_of()).unwrap(),
            Decimal::ZERO
        );
    }
}
