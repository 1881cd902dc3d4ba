//! Record table builder.
//!
//! Applies the canonical dtypes and fill policy to one (symbol, date) worth of
//! contract records. Output columns, in order:
//!
//! - date (Date), expiration (Int32 `YYYYMMDD`), strike (Float64 or Int16)
//! - type, symbol (String)
//! - bid, ask, last (Float32), volume, openint (Int32)
//! - last_trade (Datetime ms), only when some record carries it
//! - delta, gamma, theta, vega, rho, impvol, theoretical_vol (Float32), each
//!   only when some record reports it
//! - non_standard (Boolean)

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use thiserror::Error;

use crate::data::{date_to_yyyymmdd, ContractRecord, OptionType, OptionalField};

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Record dated {found} in a table for {expected}")]
    MixedDates { expected: NaiveDate, found: NaiveDate },

    #[error("Strike {strike} for {symbol} does not fit the legacy Int16 encoding")]
    StrikeOutOfRange { symbol: String, strike: f64 },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// On-disk strike representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrikeEncoding {
    /// Float64, fractional strikes preserved
    #[default]
    Exact,
    /// Int16, fractional part truncated (compatible with older datasets)
    LegacyInt16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    pub strike: StrikeEncoding,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrikeColumn {
    Float64(Vec<f64>),
    Int16(Vec<i16>),
}

/// A strike value after encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrikeValue {
    Float64(f64),
    Int16(i16),
}

impl std::fmt::Display for StrikeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float64(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
        }
    }
}

/// Typed, filled table for one symbol on one observation date.
#[derive(Debug, Clone)]
pub struct ChainTable {
    date: NaiveDate,
    expiration: Vec<i32>,
    strike: StrikeColumn,
    option_type: Vec<OptionType>,
    symbol: Vec<String>,
    bid: Vec<f32>,
    ask: Vec<f32>,
    last: Vec<f32>,
    volume: Vec<i32>,
    openint: Vec<i32>,
    last_trade: Option<Vec<Option<i64>>>,
    optional: Vec<(OptionalField, Vec<f32>)>,
    non_standard: Vec<bool>,
}

/// One row of a [`ChainTable`] with every value resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow<'a> {
    pub date: NaiveDate,
    pub expiration: i32,
    pub strike: StrikeValue,
    pub option_type: OptionType,
    pub symbol: &'a str,
    pub bid: f32,
    pub ask: f32,
    pub last: f32,
    pub volume: i32,
    pub openint: i32,
    /// Optional columns; 0.0 when the table has no such column
    pub delta: f32,
    pub gamma: f32,
    pub theta: f32,
    pub vega: f32,
    pub rho: f32,
    pub impvol: f32,
    pub theoretical_vol: f32,
    pub non_standard: bool,
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl ChainTable {
    /// Build a table from records that all share `date`.
    pub fn build(
        records: &[ContractRecord],
        date: NaiveDate,
        options: TableOptions,
    ) -> Result<Self, TableError> {
        let n = records.len();

        if let Some(stray) = records.iter().find(|r| r.date != date) {
            return Err(TableError::MixedDates {
                expected: date,
                found: stray.date,
            });
        }

        let strike = match options.strike {
            StrikeEncoding::Exact => StrikeColumn::Float64(records.iter().map(|r| r.strike).collect()),
            StrikeEncoding::LegacyInt16 => {
                let mut values = Vec::with_capacity(n);
                for r in records {
                    if !(i16::MIN as f64..=i16::MAX as f64).contains(&r.strike) {
                        return Err(TableError::StrikeOutOfRange {
                            symbol: r.symbol.clone(),
                            strike: r.strike,
                        });
                    }
                    values.push(r.strike.trunc() as i16);
                }
                StrikeColumn::Int16(values)
            }
        };

        let last_trade = records
            .iter()
            .any(|r| r.last_trade.is_some())
            .then(|| {
                records
                    .iter()
                    .map(|r| r.last_trade.map(|t| t.and_utc().timestamp_millis()))
                    .collect()
            });

        let optional = OptionalField::ALL
            .iter()
            .filter(|field| records.iter().any(|r| r.greeks.get(**field).is_some()))
            .map(|field| {
                let values = records
                    .iter()
                    .map(|r| r.greeks.get(*field).unwrap_or(0.0) as f32)
                    .collect();
                (*field, values)
            })
            .collect();

        Ok(Self {
            date,
            expiration: records.iter().map(|r| date_to_yyyymmdd(r.expiration)).collect(),
            strike,
            option_type: records.iter().map(|r| r.option_type).collect(),
            symbol: records.iter().map(|r| r.symbol.clone()).collect(),
            bid: records.iter().map(|r| r.bid.unwrap_or(0.0) as f32).collect(),
            ask: records.iter().map(|r| r.ask.unwrap_or(0.0) as f32).collect(),
            last: records.iter().map(|r| r.last.unwrap_or(0.0) as f32).collect(),
            volume: records.iter().map(|r| clamp_i32(r.volume.unwrap_or(0))).collect(),
            openint: records.iter().map(|r| clamp_i32(r.openint.unwrap_or(0))).collect(),
            last_trade,
            optional,
            non_standard: records.iter().map(|r| r.non_standard.unwrap_or(false)).collect(),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn len(&self) -> usize {
        self.symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbol.is_empty()
    }

    /// Optional columns present in this table, in canonical order.
    pub fn optional_fields(&self) -> Vec<OptionalField> {
        self.optional.iter().map(|(field, _)| *field).collect()
    }

    fn optional_value(&self, field: OptionalField, idx: usize) -> f32 {
        self.optional
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, values)| values[idx])
            .unwrap_or(0.0)
    }

    /// Resolved row at `idx`.
    pub fn row(&self, idx: usize) -> TableRow<'_> {
        let strike = match &self.strike {
            StrikeColumn::Float64(v) => StrikeValue::Float64(v[idx]),
            StrikeColumn::Int16(v) => StrikeValue::Int16(v[idx]),
        };
        TableRow {
            date: self.date,
            expiration: self.expiration[idx],
            strike,
            option_type: self.option_type[idx],
            symbol: &self.symbol[idx],
            bid: self.bid[idx],
            ask: self.ask[idx],
            last: self.last[idx],
            volume: self.volume[idx],
            openint: self.openint[idx],
            delta: self.optional_value(OptionalField::Delta, idx),
            gamma: self.optional_value(OptionalField::Gamma, idx),
            theta: self.optional_value(OptionalField::Theta, idx),
            vega: self.optional_value(OptionalField::Vega, idx),
            rho: self.optional_value(OptionalField::Rho, idx),
            impvol: self.optional_value(OptionalField::ImpVol, idx),
            theoretical_vol: self.optional_value(OptionalField::TheoreticalVol, idx),
            non_standard: self.non_standard[idx],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> + '_ {
        (0..self.len()).map(move |idx| self.row(idx))
    }

    /// Convert to a DataFrame for Parquet storage.
    pub fn to_dataframe(&self) -> Result<DataFrame, TableError> {
        let n = self.len();
        let days = self.date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE;
        let option_type: Vec<&str> = self.option_type.iter().map(|t| t.as_str()).collect();

        let strike: Series = match &self.strike {
            StrikeColumn::Float64(v) => Series::new("strike".into(), v.as_slice()),
            StrikeColumn::Int16(v) => Series::new("strike".into(), v.as_slice()),
        };

        let mut columns: Vec<Column> = vec![
            Series::new("date".into(), vec![days; n])
                .cast(&DataType::Date)?
                .into(),
            Series::new("expiration".into(), self.expiration.as_slice()).into(),
            strike.into(),
            Series::new("type".into(), option_type).into(),
            Series::new("symbol".into(), self.symbol.as_slice()).into(),
            Series::new("bid".into(), self.bid.as_slice()).into(),
            Series::new("ask".into(), self.ask.as_slice()).into(),
            Series::new("last".into(), self.last.as_slice()).into(),
            Series::new("volume".into(), self.volume.as_slice()).into(),
            Series::new("openint".into(), self.openint.as_slice()).into(),
        ];

        if let Some(last_trade) = &self.last_trade {
            columns.push(
                Series::new("last_trade".into(), last_trade.as_slice())
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
                    .into(),
            );
        }

        for (field, values) in &self.optional {
            columns.push(Series::new(field.column().into(), values.as_slice()).into());
        }

        columns.push(Series::new("non_standard".into(), self.non_standard.as_slice()).into());

        Ok(DataFrame::new(columns)?)
    }
}
