//! Flat-table normalizer (finance-ticker payloads).
//!
//! Column mapping from provider names:
//!
//! | provider            | canonical      |
//! |---------------------|----------------|
//! | `contractSymbol`    | `symbol`       |
//! | `lastTradeDate`     | `last_trade`   |
//! | `lastPrice`         | `last`         |
//! | `openInterest`      | `openint`      |
//! | `impliedVolatility` | `impvol`       |
//! | `contractSize`      | `non_standard` |
//!
//! `change`, `percentChange`, `currency` and `inTheMoney` are dropped.

use chrono::{DateTime, NaiveDate};

use crate::data::{ContractRecord, Greeks, ObservationDate, OptionType};
use crate::provider::{FlatQuoteRow, TickerChain};

use super::{NormalizeError, Normalizer};

/// Contract size label for standard contracts.
const REGULAR_CONTRACT: &str = "REGULAR";

#[derive(Debug, Clone, Copy, Default)]
pub struct FlatTableSource;

impl Normalizer for FlatTableSource {
    type Raw = TickerChain;

    fn normalize(
        &self,
        raw: TickerChain,
        date: ObservationDate,
    ) -> Result<Vec<ContractRecord>, NormalizeError> {
        let mut records = Vec::with_capacity(raw.contract_count());

        for tables in raw.expirations {
            let expiration = NaiveDate::parse_from_str(&tables.expiration, "%Y-%m-%d")
                .map_err(|_| NormalizeError::InvalidExpiration(tables.expiration.clone()))?;

            for (rows, option_type) in [(tables.calls, OptionType::Call), (tables.puts, OptionType::Put)] {
                for row in rows {
                    records.push(to_record(row, date, expiration, option_type)?);
                }
            }
        }

        Ok(records)
    }
}

fn to_record(
    row: FlatQuoteRow,
    date: ObservationDate,
    expiration: NaiveDate,
    option_type: OptionType,
) -> Result<ContractRecord, NormalizeError> {
    let strike = row.strike.ok_or_else(|| NormalizeError::InvalidStrike {
        symbol: row.contract_symbol.clone(),
        strike: "missing".to_string(),
    })?;

    Ok(ContractRecord {
        date: date.date(),
        expiration,
        strike,
        option_type,
        symbol: row.contract_symbol,
        bid: row.bid,
        ask: row.ask,
        last: row.last_price,
        volume: row.volume,
        openint: row.open_interest,
        last_trade: row
            .last_trade_date
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.naive_utc()),
        greeks: Greeks {
            impvol: row.implied_volatility,
            ..Greeks::default()
        },
        non_standard: row.contract_size.as_deref().map(|size| size != REGULAR_CONTRACT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ExpirationTables;

    fn row(symbol: &str, strike: f64, size: &str) -> FlatQuoteRow {
        FlatQuoteRow {
            contract_symbol: symbol.to_string(),
            strike: Some(strike),
            bid: Some(1.0),
            ask: Some(1.1),
            last_price: Some(1.05),
            volume: None,
            open_interest: Some(40),
            implied_volatility: Some(0.25),
            contract_size: Some(size.to_string()),
            currency: Some("USD".to_string()),
            in_the_money: Some(false),
            change: Some(0.1),
            percent_change: Some(2.0),
            last_trade_date: Some(1717171200),
        }
    }

    fn chain() -> TickerChain {
        TickerChain {
            symbol: "SPY".to_string(),
            expirations: vec![
                ExpirationTables {
                    expiration: "2024-06-21".to_string(),
                    calls: vec![row("C1", 500.0, "REGULAR"), row("C2", 505.0, "REGULAR")],
                    puts: vec![row("P1", 495.0, "REGULAR")],
                },
                ExpirationTables {
                    expiration: "2024-07-19".to_string(),
                    calls: vec![],
                    puts: vec![row("P2", 480.0, "ADJUSTED")],
                },
            ],
        }
    }

    #[test]
    fn test_tags_types_and_expirations() {
        let date = ObservationDate::parse("2024-06-03").unwrap();
        let records = FlatTableSource.normalize(chain(), date).unwrap();
        assert_eq!(records.len(), 4);

        let summary: Vec<(&str, &str, i32)> = records
            .iter()
            .map(|r| {
                (
                    r.symbol.as_str(),
                    r.option_type.as_str(),
                    crate::data::date_to_yyyymmdd(r.expiration),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("C1", "c", 20240621),
                ("C2", "c", 20240621),
                ("P1", "p", 20240621),
                ("P2", "p", 20240719),
            ]
        );
    }

    #[test]
    fn test_renamed_fields_and_contract_size() {
        let date = ObservationDate::parse("2024-06-03").unwrap();
        let records = FlatTableSource.normalize(chain(), date).unwrap();

        let regular = &records[0];
        assert_eq!(regular.last, Some(1.05));
        assert_eq!(regular.openint, Some(40));
        assert_eq!(regular.greeks.impvol, Some(0.25));
        assert_eq!(regular.non_standard, Some(false));
        assert!(regular.last_trade.is_some());
        // Volume not reported, and no greeks from this provider
        assert_eq!(regular.volume, None);
        assert_eq!(regular.greeks.delta, None);

        let adjusted = &records[3];
        assert_eq!(adjusted.non_standard, Some(true));
    }

    #[test]
    fn test_zero_expirations() {
        let date = ObservationDate::parse("2024-06-03").unwrap();
        let empty = TickerChain {
            symbol: "NONE".to_string(),
            expirations: vec![],
        };
        assert!(FlatTableSource.normalize(empty, date).unwrap().is_empty());
    }
}
