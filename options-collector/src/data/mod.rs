pub mod types;

pub use types::{
    date_to_yyyymmdd, parse_expiration, ContractRecord, Greeks, ObservationDate, OptionType,
    OptionalField,
};
