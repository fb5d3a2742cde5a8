use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of a quantitative investment strategy swap - a total return swap on a
/// self-financing hypothetical portfolio.
///
/// NAV is `sum(holdings_i * price_i) + cash`; cash accrues financing daily and may be
/// negative under leverage. Rebalances are self-financing (NAV preserved, no external
/// flows); the maturity payoff `notional * (nav / initial_nav - 1)` is the only cash that
/// crosses the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QisState {
    pub notional: Decimal,
    pub initial_nav: Decimal,
    /// Annualised financing rate applied to the cash leg.
    pub funding_rate: Decimal,
    pub currency: UnitSymbol,
    pub payer_wallet: WalletId,
    pub receiver_wallet: WalletId,
    pub strategy: QisStrategy,
    /// Hypothetical asset holdings (phi).
    pub holdings: BTreeMap<UnitSymbol, Decimal>,
    /// Hypothetical cash leg, negative when leveraged.
    pub cash: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub inception_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_accrual_time: DateTime<Utc>,
    pub rebalance_dates: Vec<DateTime<Utc>>,
    pub next_rebalance_index: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub maturity_date: DateTime<Utc>,
    pub settled: bool,
}

/// Target-holdings rule of a [`QisState`].
///
/// A closed set of named strategies keeps unit state serializable and the engine
/// reproducible across runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QisStrategy {
    /// Hold `leverage * nav / price` units of a single asset, eg/ a 2x leveraged ETF.
    Leveraged { asset: UnitSymbol, leverage: Decimal },
    /// Hold fixed NAV weights across a basket.
    ConstantMix { weights: BTreeMap<UnitSymbol, Decimal> },
}
