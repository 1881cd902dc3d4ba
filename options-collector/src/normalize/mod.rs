//! Schema normalization.
//!
//! Both provider shapes reduce to the same [`ContractRecord`] sequence. Fields
//! a provider does not report stay `None` here; zero-fill belongs to the
//! table builder.

pub mod flat;
pub mod nested;

use thiserror::Error;

use crate::data::{ContractRecord, ObservationDate};

pub use flat::FlatTableSource;
pub use nested::NestedMapSource;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Invalid expiration key: {0}")]
    InvalidExpiration(String),

    #[error("Invalid strike {strike} for {symbol}")]
    InvalidStrike { symbol: String, strike: String },
}

/// Converts one raw provider payload into contract records.
pub trait Normalizer {
    type Raw;

    fn normalize(
        &self,
        raw: Self::Raw,
        date: ObservationDate,
    ) -> Result<Vec<ContractRecord>, NormalizeError>;
}
