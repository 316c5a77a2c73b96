//! Multi-jurisdiction sales and use tax engine.
//!
//! Four components share one policy abstraction
//! ([`policy::JurisdictionPolicy`]) and one configuration
//! ([`config::EngineConfig`]):
//!
//! * [`calculator::TaxCalculator`] determines sales and use tax for single
//!   transactions and batches
//! * [`nexus::NexusMonitor`] tracks economic nexus thresholds over a
//!   trailing activity window
//! * [`filing::FilingScheduler`] generates return deadlines and compliance
//!   alerts
//! * [`refund::RefundAnalyzer`] finds overpayments and assembles refund
//!   claims
//!
//! All money is [`rust_decimal::Decimal`]; nothing here ever touches
//! floating point.

pub mod calculator;
pub mod config;
pub mod filing;
pub mod nexus;
pub mod policy;
pub mod refund;
pub mod transaction;

pub use calculator::{BatchResult, CalcError, TaxCalculator, TaxResult, UseTaxResult};
pub use config::EngineConfig;
pub use filing::{
    compliance_alerts, AlertSeverity, ComplianceAlert, FilingDeadline, FilingFrequency,
    FilingScheduler, FilingStatus,
};
pub use nexus::{NexusMonitor, NexusState, NexusStatus};
pub use policy::{ExemptionCategory, JurisdictionPolicy, PolicyError, RateQuote, TablePolicy};
pub use refund::{OverpaymentReason, OverpaymentRecord, RefundAnalyzer, RefundClaim, RefundSummary};
pub use transaction::{Jurisdiction, Transaction, TransactionError};
