//! Nested-map normalizer (REST chain payloads).

use crate::data::{parse_expiration, ContractRecord, Greeks, ObservationDate, OptionType};
use crate::provider::{ChainResponse, ContractQuote, StrikeMap};

use super::{NormalizeError, Normalizer};

/// Flattens `putExpDateMap` / `callExpDateMap` into records: puts first, then
/// calls, each map in its own key order. A quote's own `putCall` sets its type;
/// the enclosing map is the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NestedMapSource;

impl Normalizer for NestedMapSource {
    type Raw = ChainResponse;

    fn normalize(
        &self,
        raw: ChainResponse,
        date: ObservationDate,
    ) -> Result<Vec<ContractRecord>, NormalizeError> {
        let mut records = Vec::with_capacity(raw.contract_count());
        flatten_map(&raw.put_exp_date_map, OptionType::Put, date, &mut records)?;
        flatten_map(&raw.call_exp_date_map, OptionType::Call, date, &mut records)?;
        Ok(records)
    }
}

fn flatten_map<'a>(
    map: impl IntoIterator<Item = (&'a String, &'a StrikeMap)>,
    option_type: OptionType,
    date: ObservationDate,
    out: &mut Vec<ContractRecord>,
) -> Result<(), NormalizeError> {
    for (exp_key, strikes) in map {
        let expiration = exp_key
            .split(':')
            .next()
            .and_then(parse_expiration)
            .ok_or_else(|| NormalizeError::InvalidExpiration(exp_key.clone()))?;

        for (strike_key, quotes) in strikes {
            for quote in quotes {
                let strike = match quote.strike_price {
                    Some(strike) => strike,
                    None => strike_key.trim().parse::<f64>().map_err(|_| {
                        NormalizeError::InvalidStrike {
                            symbol: quote.symbol.clone(),
                            strike: strike_key.clone(),
                        }
                    })?,
                };
                let quote_type = quote
                    .put_call
                    .as_deref()
                    .and_then(OptionType::from_str)
                    .unwrap_or(option_type);
                out.push(to_record(quote, date, expiration, strike, quote_type));
            }
        }
    }
    Ok(())
}

fn to_record(
    quote: &ContractQuote,
    date: ObservationDate,
    expiration: chrono::NaiveDate,
    strike: f64,
    option_type: OptionType,
) -> ContractRecord {
    ContractRecord {
        date: date.date(),
        expiration,
        strike,
        option_type,
        symbol: quote.symbol.clone(),
        bid: quote.bid,
        ask: quote.ask,
        last: quote.last,
        volume: quote.total_volume,
        openint: quote.open_interest,
        last_trade: None,
        greeks: Greeks {
            delta: quote.delta,
            gamma: quote.gamma,
            theta: quote.theta,
            vega: quote.vega,
            rho: quote.rho,
            impvol: quote.volatility,
            theoretical_vol: quote.theoretical_volatility,
        },
        non_standard: quote.non_standard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn observation() -> ObservationDate {
        ObservationDate::parse("2024-06-01").unwrap()
    }

    fn response(json: &str) -> ChainResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_single_put_short_expiration_key() {
        let raw = response(
            r#"{
                "status": "SUCCESS",
                "putExpDateMap": {"240621:20": {"150": [{
                    "symbol": "AAPL_062124P150",
                    "bid": 1.0, "ask": 1.2,
                    "totalVolume": 10, "openInterest": 100,
                    "nonStandard": "NO"
                }]}}
            }"#,
        );

        let records = NestedMapSource.normalize(raw, observation()).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(r.expiration, NaiveDate::from_ymd_opt(2024, 6, 21).unwrap());
        assert_eq!(r.strike, 150.0);
        assert_eq!(r.option_type, OptionType::Put);
        assert_eq!(r.volume, Some(10));
        assert_eq!(r.non_standard, Some(false));
        // Not reported stays absent
        assert_eq!(r.greeks.delta, None);
        assert_eq!(r.last, None);
    }

    #[test]
    fn test_puts_then_calls_with_multiple_quotes() {
        let raw = response(
            r#"{
                "status": "SUCCESS",
                "callExpDateMap": {
                    "2024-07-19:48": {
                        "100.0": [{"symbol": "C1"}, {"symbol": "C2"}],
                        "105.0": [{"symbol": "C3"}]
                    }
                },
                "putExpDateMap": {
                    "2024-07-19:48": {"100.0": [{"symbol": "P1"}]},
                    "2024-08-16:76": {"95.5": [{"symbol": "P2", "delta": -0.2}]}
                }
            }"#,
        );

        let records = NestedMapSource.normalize(raw, observation()).unwrap();
        assert_eq!(records.len(), 5);

        let types: Vec<&str> = records.iter().map(|r| r.option_type.as_str()).collect();
        assert_eq!(types, vec!["p", "p", "c", "c", "c"]);

        let fractional = records.iter().find(|r| r.symbol == "P2").unwrap();
        assert_eq!(fractional.strike, 95.5);
        assert_eq!(fractional.greeks.delta, Some(-0.2));
    }

    #[test]
    fn test_put_call_field_sets_type() {
        let raw = response(
            r#"{
                "status": "SUCCESS",
                "putExpDateMap": {"2024-06-21:20": {"150.0": [
                    {"symbol": "P1", "putCall": "PUT"},
                    {"symbol": "C1", "putCall": "CALL"},
                    {"symbol": "P2", "putCall": ""}
                ]}}
            }"#,
        );

        let records = NestedMapSource.normalize(raw, observation()).unwrap();
        let types: Vec<&str> = records.iter().map(|r| r.option_type.as_str()).collect();
        assert_eq!(types, vec!["p", "c", "p"]);
    }

    #[test]
    fn test_empty_maps_yield_no_records() {
        let raw = response(r#"{"status": "SUCCESS"}"#);
        let records = NestedMapSource.normalize(raw, observation()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_bad_expiration_key_is_error() {
        let raw = response(
            r#"{"status": "SUCCESS", "callExpDateMap": {"soon:3": {"1": [{"symbol": "X"}]}}}"#,
        );
        let err = NestedMapSource.normalize(raw, observation()).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidExpiration(_)));
    }
}
