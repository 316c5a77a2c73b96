use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("invalid jurisdiction code: '{0}' (expected two ASCII letters)")]
    InvalidJurisdiction(String),
    #[error("negative amount for transaction {id}: {amount}")]
    NegativeAmount { id: String, amount: Decimal },
    #[error("negative tax paid for transaction {id}: {tax_paid}")]
    NegativeTaxPaid { id: String, tax_paid: Decimal },
}

/// Two-letter jurisdiction code (US state or DC), always uppercase.
///
/// Parsing normalizes case, so "tx", "Tx" and "TX" are the same jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Jurisdiction([u8; 2]);

impl Jurisdiction {
    pub fn as_str(&self) -> &str {
        // Both bytes are ASCII uppercase letters, checked in FromStr
        std::str::from_utf8(&self.0).expect("jurisdiction bytes are ASCII")
    }
}

impl FromStr for Jurisdiction {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.trim().as_bytes();
        if bytes.len() == 2 && bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            Ok(Jurisdiction([
                bytes[0].to_ascii_uppercase(),
                bytes[1].to_ascii_uppercase(),
            ]))
        } else {
            Err(TransactionError::InvalidJurisdiction(s.to_string()))
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Jurisdiction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Jurisdiction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single sales transaction, immutable once constructed.
///
/// The engine consumes already-parsed records; ingestion from files or APIs
/// lives outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: String,
    /// Date of sale
    pub date: NaiveDate,
    /// Pre-tax sale amount
    pub amount: Decimal,
    /// Two-letter jurisdiction code
    pub jurisdiction: Jurisdiction,
    /// City or other local taxing jurisdiction, if known
    #[serde(default)]
    pub local_jurisdiction: Option<String>,
    /// Item category, used for exemption lookup
    #[serde(default)]
    pub category: Option<String>,
    /// Tax actually collected at point of sale, when recorded
    #[serde(default)]
    pub tax_paid: Option<Decimal>,
}

impl Transaction {
    /// Reject transactions the engine must not compute on.
    ///
    /// A failing transaction is excluded from whatever batch it arrived in;
    /// it never aborts the batch.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.amount.is_sign_negative() {
            return Err(TransactionError::NegativeAmount {
                id: self.id.clone(),
                amount: self.amount,
            });
        }
        if let Some(tax_paid) = self.tax_paid {
            if tax_paid.is_sign_negative() {
                return Err(TransactionError::NegativeTaxPaid {
                    id: self.id.clone(),
                    tax_paid,
                });
            }
        }
        Ok(())
    }
}
