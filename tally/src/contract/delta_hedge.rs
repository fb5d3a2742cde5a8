use crate::{
    error::LedgerError,
    ledger::view::LedgerView,
    pricing::{PriceMap, bs},
    transaction::{Move, PendingTransaction},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tally_instrument::{
    unit::{
        STRATEGY_DECIMAL_PLACES, Unit, UnitSymbol,
        kind::UnitKind,
        state::{DeltaHedgeState, UnitState},
    },
    wallet::WalletId,
};

/// Default minimum share delta required to trigger a rebalance trade.
pub const DEFAULT_MIN_TRADE_SIZE: Decimal = dec!(0.0001);

/// Create a delta-hedge strategy unit with its full term sheet.
///
/// The strategy wallet dynamically holds `delta * num_options * option_multiplier`
/// shares of the underlying, trading against the market wallet, and liquidates at
/// maturity.
pub fn create_delta_hedge_unit<Symbol, Name>(
    symbol: Symbol,
    name: Name,
    underlying: UnitSymbol,
    strike: Decimal,
    maturity: DateTime<Utc>,
    volatility: Decimal,
    num_options: Decimal,
    option_multiplier: Decimal,
    currency: UnitSymbol,
    strategy_wallet: WalletId,
    market_wallet: WalletId,
    risk_free_rate: Decimal,
) -> Result<Unit, LedgerError>
where
    Symbol: Into<UnitSymbol>,
    Name: Into<SmolStr>,
{
    if strike <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "strike must be positive, got {strike}"
        )));
    }
    if volatility <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "volatility must be positive, got {volatility}"
        )));
    }

    Ok(Unit::new(
        symbol,
        name,
        UnitKind::DeltaHedgeStrategy,
        Some(Decimal::from(-100)),
        Some(Decimal::from(100)),
        Some(STRATEGY_DECIMAL_PLACES),
    )
    .with_state(UnitState::DeltaHedge(DeltaHedgeState {
        underlying,
        strike,
        maturity,
        volatility,
        risk_free_rate,
        num_options,
        option_multiplier,
        currency,
        strategy_wallet,
        market_wallet,
        min_trade_size: DEFAULT_MIN_TRADE_SIZE,
        current_shares: Decimal::ZERO,
        cumulative_cash: Decimal::ZERO,
        rebalance_count: 0,
        liquidated: false,
    })))
}

/// Time to maturity in trading days, using the 252/365 convention.
fn time_to_maturity_days(maturity: DateTime<Utc>, current_time: DateTime<Utc>) -> f64 {
    let days = (maturity - current_time).num_seconds() as f64 / 86_400.0;
    (days * (252.0 / 365.0)).max(0.0)
}

/// Compute the trades needed to bring held shares back to the Black-Scholes delta
/// target.
///
/// Empty when the strategy is liquidated, the option has expired, or the share delta is
/// below the strategy's minimum trade size.
pub fn compute_rebalance(
    view: &dyn LedgerView,
    strategy_symbol: &UnitSymbol,
    spot_price: Decimal,
) -> Result<PendingTransaction, LedgerError> {
    if spot_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "spot_price must be positive, got {spot_price}"
        )));
    }

    let state = delta_hedge_state(view, strategy_symbol)?;
    if state.liquidated {
        return Ok(PendingTransaction::empty());
    }

    let t_in_days = time_to_maturity_days(state.maturity, view.current_time());
    if t_in_days <= 0.0 {
        return Ok(PendingTransaction::empty());
    }

    let delta = bs::call_delta_decimal(
        spot_price,
        state.strike,
        Decimal::from_f64_retain(t_in_days).unwrap_or_default(),
        state.volatility,
    )
    .ok_or_else(|| {
        LedgerError::InvalidContractOperation("delta computation out of range".to_string())
    })?;

    let target_shares = delta * state.num_options * state.option_multiplier;
    let shares_to_trade = target_shares - state.current_shares;
    if shares_to_trade.abs() < state.min_trade_size {
        return Ok(PendingTransaction::empty());
    }

    let timestamp = view.current_time().to_rfc3339();
    let (moves, new_shares, new_cash) = if shares_to_trade > Decimal::ZERO {
        let cash_amount = shares_to_trade * spot_price;
        (
            vec![
                Move::new(
                    state.market_wallet.clone(),
                    state.strategy_wallet.clone(),
                    state.underlying.clone(),
                    shares_to_trade,
                    format!("hedge_{strategy_symbol}_{timestamp}_buy"),
                )?,
                Move::new(
                    state.strategy_wallet.clone(),
                    state.market_wallet.clone(),
                    state.currency.clone(),
                    cash_amount,
                    format!("hedge_{strategy_symbol}_{timestamp}_pay"),
                )?,
            ],
            state.current_shares + shares_to_trade,
            state.cumulative_cash - cash_amount,
        )
    } else {
        let sell_quantity = -shares_to_trade;
        let cash_amount = sell_quantity * spot_price;
        (
            vec![
                Move::new(
                    state.strategy_wallet.clone(),
                    state.market_wallet.clone(),
                    state.underlying.clone(),
                    sell_quantity,
                    format!("hedge_{strategy_symbol}_{timestamp}_sell"),
                )?,
                Move::new(
                    state.market_wallet.clone(),
                    state.strategy_wallet.clone(),
                    state.currency.clone(),
                    cash_amount,
                    format!("hedge_{strategy_symbol}_{timestamp}_recv"),
                )?,
            ],
            state.current_shares - sell_quantity,
            state.cumulative_cash + cash_amount,
        )
    };

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        strategy_symbol.clone(),
        UnitState::DeltaHedge(DeltaHedgeState {
            current_shares: new_shares,
            cumulative_cash: new_cash,
            rebalance_count: state.rebalance_count + 1,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// Liquidate all remaining hedge shares at spot and mark the strategy closed.
pub fn compute_liquidation(
    view: &dyn LedgerView,
    strategy_symbol: &UnitSymbol,
    spot_price: Decimal,
) -> Result<PendingTransaction, LedgerError> {
    if spot_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "spot_price must be positive, got {spot_price}"
        )));
    }

    let state = delta_hedge_state(view, strategy_symbol)?;
    if state.liquidated {
        return Ok(PendingTransaction::empty());
    }

    let mut moves = Vec::new();
    let mut final_cash = state.cumulative_cash;

    if state.current_shares.abs() >= state.min_trade_size {
        let cash_amount = state.current_shares * spot_price;
        moves.push(Move::new(
            state.strategy_wallet.clone(),
            state.market_wallet.clone(),
            state.underlying.clone(),
            state.current_shares,
            format!("liquidate_{strategy_symbol}_shares"),
        )?);
        moves.push(Move::new(
            state.market_wallet.clone(),
            state.strategy_wallet.clone(),
            state.currency.clone(),
            cash_amount,
            format!("liquidate_{strategy_symbol}_cash"),
        )?);
        final_cash += cash_amount;
    }

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        strategy_symbol.clone(),
        UnitState::DeltaHedge(DeltaHedgeState {
            current_shares: Decimal::ZERO,
            cumulative_cash: final_cash,
            liquidated: true,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// SmartContract: rebalance while the option lives, liquidate at maturity.
pub fn delta_hedge_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    prices: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let state = delta_hedge_state(view, symbol)?;
    if state.liquidated {
        return Ok(PendingTransaction::empty());
    }

    let Some(spot_price) = prices.get(&state.underlying).copied() else {
        return Ok(PendingTransaction::empty());
    };

    if timestamp >= state.maturity {
        compute_liquidation(view, symbol, spot_price)
    } else {
        compute_rebalance(view, symbol, spot_price)
    }
}

fn delta_hedge_state(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
) -> Result<DeltaHedgeState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::DeltaHedge(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::DeltaHedgeStrategy,
        }),
    }
}
