//! Overpayment detection and refund claim assembly.

use crate::calculator::{round_cents, CalcError, TaxCalculator};
use crate::config::EngineConfig;
use crate::policy::JurisdictionPolicy;
use crate::transaction::{Jurisdiction, Transaction};
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Why a transaction was overcharged. Ordered by diagnostic specificity;
/// classification picks the first that applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum OverpaymentReason {
    /// An exempt item was charged tax anyway
    ExemptItemTaxed,
    /// Tax collected in a jurisdiction that levies none
    NoTaxJurisdiction,
    /// Taxed at a higher rate than the jurisdiction's
    RateMismatch,
    Other,
}

/// One detected overpayment, with the recovery window it falls under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverpaymentRecord {
    pub transaction_id: String,
    pub date: NaiveDate,
    pub jurisdiction: Jurisdiction,
    pub local_jurisdiction: Option<String>,
    pub amount: Decimal,
    pub tax_paid: Decimal,
    pub tax_owed: Decimal,
    pub overpaid: Decimal,
    pub reason: OverpaymentReason,
    /// Last day a refund claim can still be filed
    pub sol_expires: NaiveDate,
}

/// A per-jurisdiction refund claim over the still-claimable records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundClaim {
    pub jurisdiction: Jurisdiction,
    pub records: Vec<OverpaymentRecord>,
    pub total: Decimal,
    pub estimated_recovery: Decimal,
    /// Earliest statute-of-limitations expiry among the records
    pub sol_deadline: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// Portfolio-level view of detected overpayments.
#[derive(Debug, Default, Serialize)]
pub struct RefundSummary {
    pub records: Vec<OverpaymentRecord>,
    /// Transactions with a reported tax that were analyzed
    pub reviewed: usize,
    /// Transactions without a reported tax, or that failed analysis
    pub skipped: usize,
    pub total_overpaid: Decimal,
    pub by_jurisdiction: BTreeMap<Jurisdiction, Decimal>,
    pub by_reason: BTreeMap<OverpaymentReason, Decimal>,
    /// Overpaid total still within the statute of limitations
    pub eligible_total: Decimal,
    pub estimated_recovery: Decimal,
}

/// Compares reported tax against what policy says was owed.
pub struct RefundAnalyzer<'a> {
    policy: &'a dyn JurisdictionPolicy,
    config: &'a EngineConfig,
}

impl<'a> RefundAnalyzer<'a> {
    pub fn new(policy: &'a dyn JurisdictionPolicy, config: &'a EngineConfig) -> Self {
        RefundAnalyzer { policy, config }
    }

    /// Check one transaction for overpayment.
    ///
    /// Returns `Ok(None)` when no tax was reported or the excess is within
    /// the rounding tolerance.
    pub fn analyze_transaction(
        &self,
        txn: &Transaction,
    ) -> Result<Option<OverpaymentRecord>, CalcError> {
        let tax_paid = match txn.tax_paid {
            Some(paid) => paid,
            None => return Ok(None),
        };
        txn.validate()?;

        let calculator = TaxCalculator::new(self.policy);
        let result = calculator.compute_single(txn)?;
        let overpaid = tax_paid - result.total_tax;
        if overpaid <= self.config.overpayment_tolerance {
            return Ok(None);
        }

        let fraction =
            self.policy
                .exemption_for(txn.jurisdiction, txn.category.as_deref(), txn.date)?;
        let quote =
            self.policy
                .rate_for(txn.jurisdiction, txn.local_jurisdiction.as_deref(), txn.date)?;
        let reason = if fraction == Decimal::ONE {
            OverpaymentReason::ExemptItemTaxed
        } else if quote.combined().is_zero() {
            OverpaymentReason::NoTaxJurisdiction
        } else if txn.amount > Decimal::ZERO {
            OverpaymentReason::RateMismatch
        } else {
            OverpaymentReason::Other
        };

        let sol_years = self.policy.sol_years_for(txn.jurisdiction)?;
        Ok(Some(OverpaymentRecord {
            transaction_id: txn.id.clone(),
            date: txn.date,
            jurisdiction: txn.jurisdiction,
            local_jurisdiction: txn.local_jurisdiction.clone(),
            amount: txn.amount,
            tax_paid,
            tax_owed: result.total_tax,
            overpaid,
            reason,
            sol_expires: add_years(txn.date, sol_years),
        }))
    }

    /// Analyze a portfolio of transactions as of `as_of`.
    ///
    /// Transactions without a reported tax are skipped; per-transaction
    /// failures are logged and counted, never fatal.
    pub fn analyze(&self, transactions: &[Transaction], as_of: NaiveDate) -> RefundSummary {
        let mut summary = RefundSummary::default();
        for txn in transactions {
            if txn.tax_paid.is_none() {
                summary.skipped += 1;
                continue;
            }
            match self.analyze_transaction(txn) {
                Ok(Some(record)) => {
                    summary.reviewed += 1;
                    summary.total_overpaid += record.overpaid;
                    *summary
                        .by_jurisdiction
                        .entry(record.jurisdiction)
                        .or_insert(Decimal::ZERO) += record.overpaid;
                    *summary
                        .by_reason
                        .entry(record.reason)
                        .or_insert(Decimal::ZERO) += record.overpaid;
                    if record.sol_expires >= as_of {
                        summary.eligible_total += record.overpaid;
                    }
                    summary.records.push(record);
                }
                Ok(None) => summary.reviewed += 1,
                Err(error) => {
                    log::warn!("excluding transaction {} from refund review: {error}", txn.id);
                    summary.skipped += 1;
                }
            }
        }
        summary.estimated_recovery = round_cents(summary.eligible_total * self.config.recovery_rate);
        summary
    }

    /// Group still-claimable records into per-jurisdiction claims, largest
    /// total first.
    pub fn claims(&self, records: &[OverpaymentRecord], as_of: NaiveDate) -> Vec<RefundClaim> {
        let mut grouped: BTreeMap<Jurisdiction, Vec<OverpaymentRecord>> = BTreeMap::new();
        for record in records {
            if record.sol_expires < as_of {
                continue;
            }
            grouped
                .entry(record.jurisdiction)
                .or_default()
                .push(record.clone());
        }

        let mut claims = Vec::with_capacity(grouped.len());
        for (jurisdiction, records) in grouped {
            let mut total = Decimal::ZERO;
            let mut sol_deadline = records[0].sol_expires;
            let mut period_start = records[0].date;
            let mut period_end = records[0].date;
            for record in &records {
                total += record.overpaid;
                sol_deadline = sol_deadline.min(record.sol_expires);
                period_start = period_start.min(record.date);
                period_end = period_end.max(record.date);
            }
            claims.push(RefundClaim {
                jurisdiction,
                records,
                estimated_recovery: round_cents(total * self.config.recovery_rate),
                total,
                sol_deadline,
                period_start,
                period_end,
            });
        }
        claims.sort_by(|a, b| b.total.cmp(&a.total));
        claims
    }
}

/// Statute-of-limitations expiry. Feb 29 anniversaries clamp to Feb 28.
fn add_years(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_add_months(Months::new(years * 12))
        .unwrap_or(NaiveDate::MAX)
}
