//! Filing schedules and compliance alerting.
//!
//! Deadlines are generated from policy filing bands and due days; the
//! scheduler holds no state of its own.

use crate::config::EngineConfig;
use crate::nexus::{NexusState, NexusStatus};
use crate::policy::{JurisdictionPolicy, PolicyError};
use crate::transaction::Jurisdiction;
use chrono::{Datelike, Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Days past due after which an overdue filing escalates to critical.
const LATE_CRITICAL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilingFrequency {
    Monthly,
    Quarterly,
    Annual,
}

impl fmt::Display for FilingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilingFrequency::Monthly => write!(f, "monthly"),
            FilingFrequency::Quarterly => write!(f, "quarterly"),
            FilingFrequency::Annual => write!(f, "annual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilingStatus {
    Upcoming,
    /// Due date within the configured warning horizon
    Due,
    Overdue,
    Filed,
}

/// One return filing obligation for a jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilingDeadline {
    pub jurisdiction: Jurisdiction,
    /// Period label: `2024-03`, `2024-Q1` or `2024`
    pub period: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub due_date: NaiveDate,
    pub frequency: FilingFrequency,
    pub status: FilingStatus,
}

/// Generates return deadlines for a jurisdiction across a date range.
pub struct FilingScheduler<'a> {
    policy: &'a dyn JurisdictionPolicy,
    config: &'a EngineConfig,
}

impl<'a> FilingScheduler<'a> {
    pub fn new(policy: &'a dyn JurisdictionPolicy, config: &'a EngineConfig) -> Self {
        FilingScheduler { policy, config }
    }

    /// Produce every deadline whose period ends within `[from, to]`.
    ///
    /// Filing frequency follows the jurisdiction's liability bands applied
    /// to `annual_liability`. Periods whose label appears in `filed` are
    /// marked [`FilingStatus::Filed`].
    pub fn schedule(
        &self,
        jurisdiction: Jurisdiction,
        annual_liability: Decimal,
        from: NaiveDate,
        to: NaiveDate,
        filed: &BTreeSet<String>,
        as_of: NaiveDate,
    ) -> Result<Vec<FilingDeadline>, PolicyError> {
        let frequency = self.policy.filing_band_for(jurisdiction, annual_liability)?;
        let due_day = self.policy.due_day_for(jurisdiction)?;

        let mut deadlines = Vec::new();
        for (label, start, end) in periods(frequency, from, to) {
            let due_date = due_on(end, due_day);
            let status = self.status_of(&label, due_date, filed, as_of);
            deadlines.push(FilingDeadline {
                jurisdiction,
                period: label,
                period_start: start,
                period_end: end,
                due_date,
                frequency,
                status,
            });
        }
        Ok(deadlines)
    }

    fn status_of(
        &self,
        label: &str,
        due_date: NaiveDate,
        filed: &BTreeSet<String>,
        as_of: NaiveDate,
    ) -> FilingStatus {
        if filed.contains(label) {
            FilingStatus::Filed
        } else if as_of > due_date {
            FilingStatus::Overdue
        } else if (due_date - as_of).num_days() <= self.config.due_warning_days {
            FilingStatus::Due
        } else {
            FilingStatus::Upcoming
        }
    }
}

/// Periods of the given frequency ending within `[from, to]`, as
/// `(label, start, end)` triples in chronological order.
fn periods(
    frequency: FilingFrequency,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<(String, NaiveDate, NaiveDate)> {
    let mut out = Vec::new();
    let step = match frequency {
        FilingFrequency::Monthly => 1,
        FilingFrequency::Quarterly => 3,
        FilingFrequency::Annual => 12,
    };
    let mut start = match period_start_containing(frequency, from) {
        Some(date) => date,
        None => return out,
    };
    loop {
        let end = match period_end(start, step) {
            Some(date) => date,
            None => return out,
        };
        if end > to {
            return out;
        }
        if end >= from {
            out.push((period_label(frequency, start), start, end));
        }
        start = match start.checked_add_months(Months::new(step)) {
            Some(date) => date,
            None => return out,
        };
    }
}

fn period_start_containing(frequency: FilingFrequency, date: NaiveDate) -> Option<NaiveDate> {
    let month = match frequency {
        FilingFrequency::Monthly => date.month(),
        FilingFrequency::Quarterly => (date.month() - 1) / 3 * 3 + 1,
        FilingFrequency::Annual => 1,
    };
    NaiveDate::from_ymd_opt(date.year(), month, 1)
}

fn period_end(start: NaiveDate, months: u32) -> Option<NaiveDate> {
    start
        .checked_add_months(Months::new(months))?
        .checked_sub_days(Days::new(1))
}

fn period_label(frequency: FilingFrequency, start: NaiveDate) -> String {
    match frequency {
        FilingFrequency::Monthly => format!("{}-{:02}", start.year(), start.month()),
        FilingFrequency::Quarterly => {
            format!("{}-Q{}", start.year(), (start.month() - 1) / 3 + 1)
        }
        FilingFrequency::Annual => start.year().to_string(),
    }
}

/// Return due date: the jurisdiction's due day in the month after the
/// period ends. Due days are validated to 1..=28 at policy load, so the
/// day always exists.
fn due_on(period_end: NaiveDate, due_day: u32) -> NaiveDate {
    let next_month = period_end + Days::new(1);
    next_month
        .with_day(due_day)
        .expect("due day validated to 1..=28 at policy load")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceAlert {
    pub severity: AlertSeverity,
    pub jurisdiction: Jurisdiction,
    pub message: String,
}

/// Roll nexus statuses and filing deadlines up into actionable alerts.
///
/// Unregistered established nexus and filings more than 30 days late are
/// critical; approaching nexus and freshly overdue filings are warnings.
pub fn compliance_alerts(
    statuses: &[NexusStatus],
    deadlines: &[FilingDeadline],
    as_of: NaiveDate,
) -> Vec<ComplianceAlert> {
    let mut alerts = Vec::new();
    for status in statuses {
        if status.action_needed {
            alerts.push(ComplianceAlert {
                severity: AlertSeverity::Critical,
                jurisdiction: status.jurisdiction,
                message: format!(
                    "economic nexus established in {} (revenue {}, {} transactions) but not registered",
                    status.jurisdiction, status.revenue, status.transaction_count
                ),
            });
        } else if status.state == NexusState::Approaching {
            alerts.push(ComplianceAlert {
                severity: AlertSeverity::Warning,
                jurisdiction: status.jurisdiction,
                message: format!(
                    "approaching economic nexus threshold in {} (revenue {}, {} transactions)",
                    status.jurisdiction, status.revenue, status.transaction_count
                ),
            });
        }
    }
    for deadline in deadlines {
        if deadline.status != FilingStatus::Overdue {
            continue;
        }
        let days_late = (as_of - deadline.due_date).num_days();
        let severity = if days_late > LATE_CRITICAL_DAYS {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(ComplianceAlert {
            severity,
            jurisdiction: deadline.jurisdiction,
            message: format!(
                "{} return for {} was due {} ({} days ago)",
                deadline.frequency, deadline.period, deadline.due_date, days_late
            ),
        });
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::us;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn tx_schedule(
        liability: Decimal,
        from: NaiveDate,
        to: NaiveDate,
        filed: &BTreeSet<String>,
        as_of: NaiveDate,
    ) -> Vec<FilingDeadline> {
        let policy = us::policy().unwrap();
        let config = EngineConfig::default();
        let scheduler = FilingScheduler::new(&policy, &config);
        scheduler
            .schedule("TX".parse().unwrap(), liability, from, to, filed, as_of)
            .unwrap()
    }

    #[test]
    fn monthly_schedule_for_high_liability() {
        let filed = BTreeSet::new();
        let deadlines = tx_schedule(dec!(10000), d(2024, 1, 1), d(2024, 3, 31), &filed, d(2024, 1, 1));
        assert_eq!(deadlines.len(), 3);
        assert_eq!(deadlines[0].period, "2024-01");
        assert_eq!(deadlines[0].period_start, d(2024, 1, 1));
        assert_eq!(deadlines[0].period_end, d(2024, 1, 31));
        assert_eq!(deadlines[0].due_date, d(2024, 2, 20));
        assert_eq!(deadlines[2].period, "2024-03");
        assert_eq!(deadlines[2].due_date, d(2024, 4, 20));
    }

    #[test]
    fn quarterly_schedule_for_mid_liability() {
        let filed = BTreeSet::new();
        let deadlines = tx_schedule(dec!(2000), d(2024, 1, 1), d(2024, 12, 31), &filed, d(2024, 1, 1));
        assert_eq!(deadlines.len(), 4);
        let labels: Vec<&str> = deadlines.iter().map(|dl| dl.period.as_str()).collect();
        assert_eq!(labels, vec!["2024-Q1", "2024-Q2", "2024-Q3", "2024-Q4"]);
        assert_eq!(deadlines[0].period_end, d(2024, 3, 31));
        assert_eq!(deadlines[0].due_date, d(2024, 4, 20));
    }

    #[test]
    fn annual_schedule_for_low_liability() {
        let filed = BTreeSet::new();
        let deadlines = tx_schedule(dec!(500), d(2024, 1, 1), d(2024, 12, 31), &filed, d(2024, 1, 1));
        assert_eq!(deadlines.len(), 1);
        assert_eq!(deadlines[0].period, "2024");
        assert_eq!(deadlines[0].frequency, FilingFrequency::Annual);
        assert_eq!(deadlines[0].due_date, d(2025, 1, 20));
    }

    #[test]
    fn partial_period_at_range_edge_excluded() {
        // Range ends mid-March; only January and February close inside it
        let filed = BTreeSet::new();
        let deadlines = tx_schedule(dec!(10000), d(2024, 1, 1), d(2024, 3, 15), &filed, d(2024, 1, 1));
        assert_eq!(deadlines.len(), 2);
        assert_eq!(deadlines[1].period, "2024-02");
    }

    #[test]
    fn filed_periods_marked() {
        let mut filed = BTreeSet::new();
        filed.insert("2024-01".to_string());
        let deadlines = tx_schedule(dec!(10000), d(2024, 1, 1), d(2024, 2, 29), &filed, d(2024, 6, 1));
        assert_eq!(deadlines[0].status, FilingStatus::Filed);
        assert_eq!(deadlines[1].status, FilingStatus::Overdue);
    }

    #[test]
    fn status_tracks_as_of_date() {
        let filed = BTreeSet::new();
        // January return due 2024-02-20
        let upcoming = tx_schedule(dec!(10000), d(2024, 1, 1), d(2024, 1, 31), &filed, d(2024, 1, 5));
        assert_eq!(upcoming[0].status, FilingStatus::Upcoming);
        let due = tx_schedule(dec!(10000), d(2024, 1, 1), d(2024, 1, 31), &filed, d(2024, 2, 1));
        assert_eq!(due[0].status, FilingStatus::Due);
        let overdue = tx_schedule(dec!(10000), d(2024, 1, 1), d(2024, 1, 31), &filed, d(2024, 2, 21));
        assert_eq!(overdue[0].status, FilingStatus::Overdue);
    }

    #[test]
    fn ca_due_day_applied() {
        let policy = us::policy().unwrap();
        let config = EngineConfig::default();
        let scheduler = FilingScheduler::new(&policy, &config);
        let filed = BTreeSet::new();
        let deadlines = scheduler
            .schedule(
                "CA".parse().unwrap(),
                dec!(10000),
                d(2024, 1, 1),
                d(2024, 1, 31),
                &filed,
                d(2024, 1, 1),
            )
            .unwrap();
        assert_eq!(deadlines[0].due_date, d(2024, 2, 25));
    }

    fn status(state: NexusState, action_needed: bool) -> NexusStatus {
        NexusStatus {
            jurisdiction: "SD".parse().unwrap(),
            revenue: dec!(90000),
            transaction_count: 150,
            revenue_threshold: Some(dec!(100000)),
            transaction_threshold: Some(200),
            state,
            registered: false,
            action_needed,
        }
    }

    #[test]
    fn unregistered_established_nexus_is_critical() {
        let alerts = compliance_alerts(&[status(NexusState::Established, true)], &[], d(2024, 9, 30));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert!(alerts[0].message.contains("not registered"));
    }

    #[test]
    fn approaching_nexus_is_warning() {
        let alerts = compliance_alerts(&[status(NexusState::Approaching, false)], &[], d(2024, 9, 30));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn overdue_filing_escalates_after_thirty_days() {
        let deadline = FilingDeadline {
            jurisdiction: "TX".parse().unwrap(),
            period: "2024-01".to_string(),
            period_start: d(2024, 1, 1),
            period_end: d(2024, 1, 31),
            due_date: d(2024, 2, 20),
            frequency: FilingFrequency::Monthly,
            status: FilingStatus::Overdue,
        };
        let fresh = compliance_alerts(&[], &[deadline.clone()], d(2024, 3, 1));
        assert_eq!(fresh[0].severity, AlertSeverity::Warning);
        let stale = compliance_alerts(&[], &[deadline], d(2024, 4, 15));
        assert_eq!(stale[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn filed_and_upcoming_produce_no_alerts() {
        let deadline = FilingDeadline {
            jurisdiction: "TX".parse().unwrap(),
            period: "2024-01".to_string(),
            period_start: d(2024, 1, 1),
            period_end: d(2024, 1, 31),
            due_date: d(2024, 2, 20),
            frequency: FilingFrequency::Monthly,
            status: FilingStatus::Filed,
        };
        let alerts = compliance_alerts(&[status(NexusState::Below, false)], &[deadline], d(2024, 3, 1));
        assert!(alerts.is_empty());
    }
}
