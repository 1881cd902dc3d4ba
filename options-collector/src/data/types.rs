//! Core record types for collected options chains.
//!
//! Every provider shape is reduced to a sequence of [`ContractRecord`]s before
//! any table is built, so the rest of the pipeline never sees provider JSON.

use std::fmt;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Single-letter code stored in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "c",
            Self::Put => "p",
        }
    }
}

/// Observation date for one collection run.
///
/// Passed explicitly into every collector call; there is no process-wide
/// "today" to override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationDate(NaiveDate);

impl ObservationDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Current local calendar date.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// Parse a `YYYY-MM-DD` string.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for ObservationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Fields a provider may or may not report.
///
/// Order here is the canonical column order in written datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionalField {
    Delta,
    Gamma,
    Theta,
    Vega,
    Rho,
    ImpVol,
    TheoreticalVol,
}

impl OptionalField {
    pub const ALL: [OptionalField; 7] = [
        Self::Delta,
        Self::Gamma,
        Self::Theta,
        Self::Vega,
        Self::Rho,
        Self::ImpVol,
        Self::TheoreticalVol,
    ];

    /// Column name in written datasets.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Gamma => "gamma",
            Self::Theta => "theta",
            Self::Vega => "vega",
            Self::Rho => "rho",
            Self::ImpVol => "impvol",
            Self::TheoreticalVol => "theoretical_vol",
        }
    }
}

/// Greeks and volatilities, each absent unless the provider reported it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
    pub impvol: Option<f64>,
    pub theoretical_vol: Option<f64>,
}

impl Greeks {
    pub fn get(&self, field: OptionalField) -> Option<f64> {
        match field {
            OptionalField::Delta => self.delta,
            OptionalField::Gamma => self.gamma,
            OptionalField::Theta => self.theta,
            OptionalField::Vega => self.vega,
            OptionalField::Rho => self.rho,
            OptionalField::ImpVol => self.impvol,
            OptionalField::TheoreticalVol => self.theoretical_vol,
        }
    }
}

/// One option contract observed on one date.
///
/// Numeric fields stay `Option` until the table builder applies the fill
/// policy, so "not reported" and "reported as zero" remain distinguishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// Observation date shared by the whole run
    pub date: NaiveDate,

    /// Contract expiration date
    pub expiration: NaiveDate,

    /// Strike price
    pub strike: f64,

    /// Call or put
    pub option_type: OptionType,

    /// Contract identifier (e.g. OCC symbol)
    pub symbol: String,

    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub volume: Option<i64>,
    pub openint: Option<i64>,

    /// Last trade time, only reported by the finance-ticker provider
    pub last_trade: Option<NaiveDateTime>,

    pub greeks: Greeks,

    /// Irregular contract size or settlement
    pub non_standard: Option<bool>,
}

impl ContractRecord {
    /// Minimal record with every optional field absent.
    pub fn new(
        date: NaiveDate,
        expiration: NaiveDate,
        strike: f64,
        option_type: OptionType,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            date,
            expiration,
            strike,
            option_type,
            symbol: symbol.into(),
            bid: None,
            ask: None,
            last: None,
            volume: None,
            openint: None,
            last_trade: None,
            greeks: Greeks::default(),
            non_standard: None,
        }
    }
}

/// Encode a date as a dense `YYYYMMDD` integer.
pub fn date_to_yyyymmdd(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

/// Parse an expiration in any of the forms providers and legacy files use:
/// `20240621`, `240621`, or `2024-06-21`.
pub fn parse_expiration(s: &str) -> Option<NaiveDate> {
    let digits: String = s.trim().chars().filter(|c| *c != '-').collect();
    match digits.len() {
        8 => NaiveDate::parse_from_str(&digits, "%Y%m%d").ok(),
        6 => NaiveDate::parse_from_str(&format!("20{}", digits), "%Y%m%d").ok(),
        _ => None,
    }
}
