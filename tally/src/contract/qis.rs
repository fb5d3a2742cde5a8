use crate::{
    error::LedgerError,
    ledger::view::LedgerView,
    pricing::PriceMap,
    transaction::{Move, PendingTransaction},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tally_instrument::{
    is_dust,
    unit::{
        Unit, UnitSymbol,
        kind::UnitKind,
        state::{QisState, QisStrategy, UnitState},
    },
    wallet::WalletId,
};

const SECONDS_PER_YEAR: Decimal = dec!(31536000);

/// Create a quantitative investment strategy swap unit.
///
/// A QIS is a total return swap on a self-financing hypothetical portfolio: NAV tracking
/// plus a strategy rule plus financing costs plus settlement. The hypothetical holdings
/// and cash live entirely in unit state; the only ledger cash flow is the payoff
/// `notional * (nav / initial_nav - 1)` at maturity.
pub fn create_qis<Symbol, Name>(
    symbol: Symbol,
    name: Name,
    notional: Decimal,
    initial_nav: Decimal,
    funding_rate: Decimal,
    currency: UnitSymbol,
    payer_wallet: WalletId,
    receiver_wallet: WalletId,
    strategy: QisStrategy,
    rebalance_dates: Vec<DateTime<Utc>>,
    inception_date: DateTime<Utc>,
    maturity_date: DateTime<Utc>,
) -> Result<Unit, LedgerError>
where
    Symbol: Into<UnitSymbol>,
    Name: Into<SmolStr>,
{
    if notional <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "notional must be positive, got {notional}"
        )));
    }
    if initial_nav <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "initial_nav must be positive, got {initial_nav}"
        )));
    }
    if payer_wallet == receiver_wallet {
        return Err(LedgerError::InvalidContractOperation(
            "payer_wallet and receiver_wallet must be different".to_string(),
        ));
    }

    let mut rebalance_dates = rebalance_dates;
    rebalance_dates.sort_unstable();

    Ok(Unit::new(symbol, name, UnitKind::Qis, None, None, Some(6)).with_state(UnitState::Qis(
        QisState {
            notional,
            initial_nav,
            funding_rate,
            currency,
            payer_wallet,
            receiver_wallet,
            strategy,
            holdings: BTreeMap::new(),
            cash: initial_nav,
            inception_date,
            last_accrual_time: inception_date,
            rebalance_dates,
            next_rebalance_index: 0,
            maturity_date,
            settled: false,
        },
    )))
}

/// NAV of the hypothetical portfolio: `sum(holdings_i * price_i) + cash`.
///
/// `None` when a held asset has no price.
fn nav(state: &QisState, prices: &PriceMap) -> Option<Decimal> {
    let mut value = state.cash;
    for (asset, quantity) in &state.holdings {
        value += *quantity * *prices.get(asset)?;
    }
    Some(value)
}

/// Current NAV of a QIS unit at the provided prices.
pub fn get_qis_nav(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    prices: &PriceMap,
) -> Result<Option<Decimal>, LedgerError> {
    let state = qis_state(view, symbol)?;
    Ok(nav(&state, prices))
}

/// Total return of a QIS unit since inception: `nav / initial_nav - 1`.
pub fn get_qis_return(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    prices: &PriceMap,
) -> Result<Option<Decimal>, LedgerError> {
    let state = qis_state(view, symbol)?;
    Ok(nav(&state, prices).map(|value| value / state.initial_nav - Decimal::ONE))
}

/// Gross leverage of a QIS unit: `sum(|holdings_i * price_i|) / nav`.
pub fn get_qis_leverage(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    prices: &PriceMap,
) -> Result<Option<Decimal>, LedgerError> {
    let state = qis_state(view, symbol)?;
    let Some(value) = nav(&state, prices) else {
        return Ok(None);
    };
    if value.is_zero() {
        return Ok(None);
    }

    let mut gross = Decimal::ZERO;
    for (asset, quantity) in &state.holdings {
        let Some(price) = prices.get(asset) else {
            return Ok(None);
        };
        gross += (*quantity * *price).abs();
    }
    Ok(Some(gross / value))
}

fn target_holdings(
    strategy: &QisStrategy,
    nav: Decimal,
    prices: &PriceMap,
) -> Option<BTreeMap<UnitSymbol, Decimal>> {
    match strategy {
        QisStrategy::Leveraged { asset, leverage } => {
            let price = *prices.get(asset)?;
            if price.is_zero() {
                return None;
            }
            Some(BTreeMap::from([(asset.clone(), *leverage * nav / price)]))
        }
        QisStrategy::ConstantMix { weights } => {
            let mut holdings = BTreeMap::new();
            for (asset, weight) in weights {
                let price = *prices.get(asset)?;
                if price.is_zero() {
                    return None;
                }
                holdings.insert(asset.clone(), *weight * nav / price);
            }
            Some(holdings)
        }
    }
}

/// SmartContract: accrue financing daily, rebalance self-financed on scheduled dates,
/// and settle the payoff at maturity.
///
/// Rebalances preserve NAV exactly: after the strategy picks new holdings, the cash leg
/// absorbs the difference, so no external flows occur until settlement.
pub fn qis_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    prices: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let mut state = qis_state(view, symbol)?;
    if state.settled {
        return Ok(PendingTransaction::empty());
    }

    let mut changed = false;

    // Financing accrual on the cash leg: C <- C * exp(r * dt)
    if timestamp > state.last_accrual_time {
        let dt_years =
            Decimal::from((timestamp - state.last_accrual_time).num_seconds()) / SECONDS_PER_YEAR;
        if !state.cash.is_zero() && !state.funding_rate.is_zero() {
            state.cash *= (state.funding_rate * dt_years).exp();
        }
        state.last_accrual_time = timestamp;
        changed = true;
    }

    // Self-financing rebalances on every due date
    while state
        .rebalance_dates
        .get(state.next_rebalance_index)
        .is_some_and(|date| *date <= timestamp)
    {
        let Some(value) = nav(&state, prices) else {
            // Prices missing: wait for them before progressing the schedule
            break;
        };
        let Some(holdings) = target_holdings(&state.strategy, value, prices) else {
            break;
        };

        let invested: Decimal = holdings
            .iter()
            .filter_map(|(asset, quantity)| prices.get(asset).map(|price| *quantity * *price))
            .sum();
        state.cash = value - invested;
        state.holdings = holdings;
        state.next_rebalance_index += 1;
        changed = true;
    }

    // Maturity settlement: pay notional * (V_T / V_0 - 1)
    let mut moves = Vec::new();
    if timestamp >= state.maturity_date
        && let Some(value) = nav(&state, prices)
    {
        let payoff = state.notional * (value / state.initial_nav - Decimal::ONE);
        if !is_dust(payoff) {
            let (source, dest, amount) = if payoff > Decimal::ZERO {
                (state.payer_wallet.clone(), state.receiver_wallet.clone(), payoff)
            } else {
                (state.receiver_wallet.clone(), state.payer_wallet.clone(), -payoff)
            };
            moves.push(Move::new(
                source,
                dest,
                state.currency.clone(),
                amount,
                format!("qis_{symbol}_settlement"),
            )?);
        }
        state.settled = true;
        changed = true;
    }

    if !changed {
        return Ok(PendingTransaction::empty());
    }

    let mut state_updates = BTreeMap::new();
    state_updates.insert(symbol.clone(), UnitState::Qis(state));

    Ok(PendingTransaction::new(moves, state_updates))
}

fn qis_state(view: &dyn LedgerView, symbol: &UnitSymbol) -> Result<QisState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::Qis(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::Qis,
        }),
    }
}
