use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// State of a delta-hedge strategy tracking a call option position.
///
/// The strategy wallet trades the underlying against the market wallet so that held
/// shares track `delta * num_options * option_multiplier`; at maturity the residual
/// position is liquidated at spot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeltaHedgeState {
    pub underlying: UnitSymbol,
    pub strike: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub maturity: DateTime<Utc>,
    /// Annualised volatility used for delta computation, eg/ 0.2 for 20%.
    pub volatility: Decimal,
    pub risk_free_rate: Decimal,
    pub num_options: Decimal,
    /// Shares per option contract, typically 100.
    pub option_multiplier: Decimal,
    pub currency: UnitSymbol,
    pub strategy_wallet: WalletId,
    pub market_wallet: WalletId,
    /// Minimum share delta required to trigger a rebalance trade.
    pub min_trade_size: Decimal,
    pub current_shares: Decimal,
    /// Net cash generated by all hedge trades so far (negative while long shares).
    pub cumulative_cash: Decimal,
    pub rebalance_count: u32,
    pub liquidated: bool,
}
