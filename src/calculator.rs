//! Sales and use tax calculation.

use crate::policy::{JurisdictionPolicy, PolicyError};
use crate::transaction::{Jurisdiction, Transaction, TransactionError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalcError {
    #[error(transparent)]
    Invalid(#[from] TransactionError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Round a monetary amount to cent precision, half-up.
///
/// Amounts in this engine are non-negative, so midpoint-away-from-zero is
/// exactly the half-up rule states publish for tax lines.
pub(crate) fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Tax determination for a single transaction.
///
/// State and local tax are rounded to cents independently, matching how
/// jurisdictions display the two lines separately; `total_tax` is their
/// post-rounding sum and is never rounded again, so
/// `total_tax == state_tax + local_tax` holds exactly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxResult {
    pub transaction_id: String,
    pub jurisdiction: Jurisdiction,
    pub local_jurisdiction: Option<String>,
    /// Post-exemption amount the rates were applied to, cent-rounded
    pub taxable_amount: Decimal,
    pub state_tax: Decimal,
    pub local_tax: Decimal,
    pub total_tax: Decimal,
    /// total_tax / taxable amount; 0 when nothing was taxable
    pub effective_rate: Decimal,
    /// Pre-tax amount plus total tax
    pub total_with_tax: Decimal,
}

/// Use tax determination: the gross computation plus the credit for tax
/// already paid to the origin jurisdiction. `owed` is clamped at zero;
/// excess payments are refund-analysis territory, not a credit balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseTaxResult {
    pub result: TaxResult,
    pub credit_applied: Decimal,
    pub owed: Decimal,
}

/// Per-transaction failure inside a batch. The batch itself never aborts.
#[derive(Debug)]
pub struct BatchFailure {
    pub transaction_id: String,
    pub error: CalcError,
}

/// Aggregated result for a batch of transactions.
///
/// All aggregates are plain sums, so the result is identical regardless of
/// input ordering.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub results: Vec<TaxResult>,
    pub failures: Vec<BatchFailure>,
    /// Number of transactions submitted, successes and failures together
    pub transaction_count: usize,
    pub total_taxable: Decimal,
    pub total_tax: Decimal,
    pub by_jurisdiction: BTreeMap<Jurisdiction, Decimal>,
}

/// Tax calculation engine over a policy snapshot.
pub struct TaxCalculator<'a> {
    policy: &'a dyn JurisdictionPolicy,
}

impl<'a> TaxCalculator<'a> {
    pub fn new(policy: &'a dyn JurisdictionPolicy) -> Self {
        TaxCalculator { policy }
    }

    /// Compute the tax determination for one transaction.
    pub fn compute_single(&self, txn: &Transaction) -> Result<TaxResult, CalcError> {
        txn.validate()?;

        let fraction =
            self.policy
                .exemption_for(txn.jurisdiction, txn.category.as_deref(), txn.date)?;
        // Taxable amount stays unrounded until the final tax amounts
        let taxable = txn.amount * (Decimal::ONE - fraction);

        let quote =
            self.policy
                .rate_for(txn.jurisdiction, txn.local_jurisdiction.as_deref(), txn.date)?;
        let state_tax = round_cents(taxable * quote.base_rate);
        let local_tax = round_cents(taxable * quote.local_rate);
        let total_tax = state_tax + local_tax;

        let effective_rate = if taxable.is_zero() {
            Decimal::ZERO
        } else {
            total_tax / taxable
        };

        log::debug!(
            "txn {}: {} {} taxable={} state={} local={}",
            txn.id,
            txn.jurisdiction,
            txn.date,
            taxable,
            state_tax,
            local_tax
        );

        Ok(TaxResult {
            transaction_id: txn.id.clone(),
            jurisdiction: txn.jurisdiction,
            local_jurisdiction: txn.local_jurisdiction.clone(),
            taxable_amount: round_cents(taxable),
            state_tax,
            local_tax,
            total_tax,
            effective_rate,
            // The pre-tax amount is already exact, so no re-rounding
            total_with_tax: txn.amount + total_tax,
        })
    }

    /// Compute every transaction in a batch, recording per-transaction
    /// failures alongside successes.
    pub fn compute_batch(&self, transactions: &[Transaction]) -> BatchResult {
        let mut batch = BatchResult {
            transaction_count: transactions.len(),
            ..BatchResult::default()
        };
        for txn in transactions {
            match self.compute_single(txn) {
                Ok(result) => {
                    batch.total_taxable += result.taxable_amount;
                    batch.total_tax += result.total_tax;
                    *batch
                        .by_jurisdiction
                        .entry(result.jurisdiction)
                        .or_insert(Decimal::ZERO) += result.total_tax;
                    batch.results.push(result);
                }
                Err(error) => {
                    log::warn!("excluding transaction {} from batch: {error}", txn.id);
                    batch.failures.push(BatchFailure {
                        transaction_id: txn.id.clone(),
                        error,
                    });
                }
            }
        }
        batch
    }

    /// Use tax owed on an out-of-state purchase, net of tax already paid at
    /// the point of sale. Never negative.
    pub fn compute_use_tax(
        &self,
        txn: &Transaction,
        tax_already_paid: Decimal,
    ) -> Result<UseTaxResult, CalcError> {
        if tax_already_paid.is_sign_negative() {
            return Err(TransactionError::NegativeTaxPaid {
                id: txn.id.clone(),
                tax_paid: tax_already_paid,
            }
            .into());
        }
        let result = self.compute_single(txn)?;
        let credit_applied = tax_already_paid.min(result.total_tax);
        let owed = result.total_tax - credit_applied;
        Ok(UseTaxResult {
            result,
            credit_applied,
            owed,
        })
    }
}
