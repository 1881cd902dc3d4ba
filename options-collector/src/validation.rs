//! Sanity checks over normalized contract records.
//!
//! Checks count offending records and report them; nothing is dropped.
//!
//! - contract count (zero contracts is suspicious on a trading day)
//! - expiration on or after the observation date
//! - strike non-negative and finite
//! - contract symbol present
//! - bid not above ask when both are quoted

use tracing::warn;

use crate::data::{ContractRecord, ObservationDate};

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
        }
    }

    pub fn fail(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
        }
    }

    fn count(name: &str, violations: usize, what: &str) -> Self {
        if violations == 0 {
            Self::pass(name, "ok")
        } else {
            Self::fail(name, &format!("{} records with {}", violations, what))
        }
    }
}

/// Sanity report for one symbol on one date.
#[derive(Debug, Clone)]
pub struct SanityReport {
    pub symbol: String,
    pub date: ObservationDate,
    pub row_count: usize,
    pub checks: Vec<CheckResult>,
}

impl SanityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        format!(
            "{} {} ({} rows): {}/{} checks passed",
            self.symbol,
            self.date,
            self.row_count,
            passed,
            self.checks.len()
        )
    }

    /// Emit one warning per failed check.
    pub fn log_warnings(&self) {
        for check in self.failed_checks() {
            warn!(
                symbol = %self.symbol,
                date = %self.date,
                check = %check.name,
                "{}",
                check.message
            );
        }
    }
}

/// Run every check over `records` collected for `symbol` on `date`.
pub fn check_records(symbol: &str, date: ObservationDate, records: &[ContractRecord]) -> SanityReport {
    let mut checks = Vec::with_capacity(5);

    checks.push(if records.is_empty() {
        CheckResult::fail("contract_count", "no contracts returned")
    } else {
        CheckResult::pass("contract_count", &format!("{} contracts", records.len()))
    });

    let expired = records.iter().filter(|r| r.expiration < r.date).count();
    checks.push(CheckResult::count(
        "expiration_after_date",
        expired,
        "expiration before the observation date",
    ));

    let bad_strike = records
        .iter()
        .filter(|r| !r.strike.is_finite() || r.strike < 0.0)
        .count();
    checks.push(CheckResult::count("strike_non_negative", bad_strike, "negative or non-finite strike"));

    let unnamed = records.iter().filter(|r| r.symbol.trim().is_empty()).count();
    checks.push(CheckResult::count("contract_symbol", unnamed, "an empty contract symbol"));

    let crossed = records
        .iter()
        .filter(|r| matches!((r.bid, r.ask), (Some(bid), Some(ask)) if bid > ask))
        .count();
    checks.push(CheckResult::count("bid_ask_order", crossed, "bid above ask"));

    SanityReport {
        symbol: symbol.to_string(),
        date,
        row_count: records.len(),
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OptionType;
    use chrono::NaiveDate;

    fn date() -> ObservationDate {
        ObservationDate::parse("2024-06-01").unwrap()
    }

    fn record(expiration: (i32, u32, u32), strike: f64) -> ContractRecord {
        ContractRecord::new(
            date().date(),
            NaiveDate::from_ymd_opt(expiration.0, expiration.1, expiration.2).unwrap(),
            strike,
            OptionType::Call,
            "SPY_C",
        )
    }

    #[test]
    fn test_clean_records_pass() {
        let records = vec![record((2024, 6, 21), 500.0), record((2024, 6, 1), 0.0)];
        let report = check_records("SPY", date(), &records);
        assert!(report.all_passed(), "{}", report.summary());
        assert_eq!(report.summary(), "SPY 2024-06-01 (2 rows): 5/5 checks passed");
    }

    #[test]
    fn test_zero_contracts_flagged() {
        let report = check_records("ZZZZ", date(), &[]);
        let failed: Vec<&str> = report.failed_checks().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["contract_count"]);
    }

    #[test]
    fn test_violations_counted_not_dropped() {
        let mut crossed = record((2024, 6, 21), 10.0);
        crossed.bid = Some(2.0);
        crossed.ask = Some(1.5);

        let records = vec![
            record((2024, 5, 17), 100.0),
            record((2024, 6, 21), -5.0),
            record((2024, 6, 21), f64::NAN),
            crossed,
        ];
        let report = check_records("SPY", date(), &records);

        assert_eq!(report.row_count, 4);
        let failed: Vec<(&str, &str)> = report
            .failed_checks()
            .iter()
            .map(|c| (c.name.as_str(), c.message.as_str()))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("expiration_after_date", "1 records with expiration before the observation date"),
                ("strike_non_negative", "2 records with negative or non-finite strike"),
                ("bid_ask_order", "1 records with bid above ask"),
            ]
        );
    }
}
