use crate::{
    error::LedgerError,
    ledger::view::LedgerView,
    pricing::PriceMap,
    transaction::{Move, PendingTransaction},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tally_instrument::{
    is_dust,
    unit::{
        CONTRACT_DECIMAL_PLACES, Unit, UnitSymbol,
        kind::UnitKind,
        state::{OptionKind, OptionState, UnitState},
        transfer::TransferRule,
    },
    wallet::WalletId,
};

/// Create a bilateral option unit with physical delivery.
///
/// The long wallet holds the right; the short wallet carries the obligation. Holdings
/// are restricted to this pair by the bilateral transfer rule.
pub fn create_option_unit<Symbol, Name>(
    symbol: Symbol,
    name: Name,
    underlying: UnitSymbol,
    strike: Decimal,
    maturity: DateTime<Utc>,
    kind: OptionKind,
    quantity_per_contract: Decimal,
    currency: UnitSymbol,
    long_wallet: WalletId,
    short_wallet: WalletId,
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
    if quantity_per_contract <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "quantity_per_contract must be positive, got {quantity_per_contract}"
        )));
    }

    Ok(Unit::new(
        symbol,
        name,
        UnitKind::BilateralOption,
        Some(Decimal::from(-10_000)),
        Some(Decimal::from(10_000)),
        Some(CONTRACT_DECIMAL_PLACES),
    )
    .with_transfer_rule(TransferRule::Bilateral)
    .with_state(UnitState::Option(OptionState {
        underlying,
        strike,
        maturity,
        kind,
        quantity_per_contract,
        currency,
        long_wallet,
        short_wallet,
        novation_from: None,
        settled: false,
        settlement_price: None,
        exercised: false,
    })))
}

/// Build the moves for an option trade: premium payment one way, option units the other.
pub fn build_option_trade(
    option_symbol: &UnitSymbol,
    num_contracts: Decimal,
    premium_per_contract: Decimal,
    buyer: &WalletId,
    seller: &WalletId,
    premium_currency: &UnitSymbol,
    trade_id: &str,
) -> Result<PendingTransaction, LedgerError> {
    let mut moves = Vec::with_capacity(2);

    let total_premium = num_contracts * premium_per_contract;
    if !is_dust(total_premium) {
        moves.push(Move::new(
            buyer.clone(),
            seller.clone(),
            premium_currency.clone(),
            total_premium,
            format!("{trade_id}_premium"),
        )?);
    }
    moves.push(Move::new(
        seller.clone(),
        buyer.clone(),
        option_symbol.clone(),
        num_contracts,
        format!("{trade_id}_option"),
    )?);

    Ok(PendingTransaction::new(moves, BTreeMap::new()))
}

/// Compute physical delivery settlement for a bilateral option.
///
/// Call ITM: long pays `position * quantity * strike` cash, short delivers the
/// underlying. Put ITM: deliveries reverse. OTM/ATM: positions just close. The long
/// position is always transferred back to the short to extinguish the contract.
///
/// Settles only at or after maturity unless `force_settlement` is set; empty when
/// already settled or the long holds no position.
pub fn compute_option_settlement(
    view: &dyn LedgerView,
    option_symbol: &UnitSymbol,
    settlement_price: Decimal,
    force_settlement: bool,
) -> Result<PendingTransaction, LedgerError> {
    if settlement_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "settlement_price must be positive, got {settlement_price}"
        )));
    }

    let state = option_state(view, option_symbol)?;

    if state.settled {
        return Ok(PendingTransaction::empty());
    }
    if view.current_time() < state.maturity && !force_settlement {
        return Ok(PendingTransaction::empty());
    }

    let long_position = view.get_balance(&state.long_wallet, option_symbol)?;
    if long_position <= Decimal::ZERO {
        return Ok(PendingTransaction::empty());
    }

    let is_itm = state.is_itm(settlement_price);
    let mut moves = Vec::with_capacity(3);

    if is_itm {
        let underlying_amount = long_position * state.quantity_per_contract;
        let cash_amount = underlying_amount * state.strike;

        let (cash_payer, cash_receiver) = match state.kind {
            OptionKind::Call => (&state.long_wallet, &state.short_wallet),
            OptionKind::Put => (&state.short_wallet, &state.long_wallet),
        };
        let (asset_deliverer, asset_receiver) = match state.kind {
            OptionKind::Call => (&state.short_wallet, &state.long_wallet),
            OptionKind::Put => (&state.long_wallet, &state.short_wallet),
        };

        moves.push(Move::new(
            cash_payer.clone(),
            cash_receiver.clone(),
            state.currency.clone(),
            cash_amount,
            format!("settle_{option_symbol}_cash"),
        )?);
        moves.push(Move::new(
            asset_deliverer.clone(),
            asset_receiver.clone(),
            state.underlying.clone(),
            underlying_amount,
            format!("settle_{option_symbol}_delivery"),
        )?);
    }

    // Close out the option position regardless of moneyness
    moves.push(Move::new(
        state.long_wallet.clone(),
        state.short_wallet.clone(),
        option_symbol.clone(),
        long_position,
        format!("close_{option_symbol}"),
    )?);

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        option_symbol.clone(),
        UnitState::Option(OptionState {
            settled: true,
            settlement_price: Some(settlement_price),
            exercised: is_itm,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// Compute early exercise of an option before maturity.
pub fn compute_option_exercise(
    view: &dyn LedgerView,
    option_symbol: &UnitSymbol,
    settlement_price: Decimal,
) -> Result<PendingTransaction, LedgerError> {
    compute_option_settlement(view, option_symbol, settlement_price, true)
}

/// Intrinsic value per contract at the provided spot.
pub fn get_option_intrinsic_value(
    view: &dyn LedgerView,
    option_symbol: &UnitSymbol,
    spot_price: Decimal,
) -> Result<Decimal, LedgerError> {
    let state = option_state(view, option_symbol)?;
    let intrinsic = match state.kind {
        OptionKind::Call => (spot_price - state.strike).max(Decimal::ZERO),
        OptionKind::Put => (state.strike - spot_price).max(Decimal::ZERO),
    };
    Ok(intrinsic * state.quantity_per_contract)
}

/// Moneyness status of an option at a spot price.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Moneyness {
    Itm,
    Atm,
    Otm,
}

/// Moneyness at the provided spot. ATM within a tolerance of 1% of strike.
pub fn get_option_moneyness(
    view: &dyn LedgerView,
    option_symbol: &UnitSymbol,
    spot_price: Decimal,
) -> Result<Moneyness, LedgerError> {
    let state = option_state(view, option_symbol)?;

    let atm_tolerance = state.strike * Decimal::new(1, 2);
    if (spot_price - state.strike).abs() <= atm_tolerance {
        return Ok(Moneyness::Atm);
    }

    Ok(if state.is_itm(spot_price) {
        Moneyness::Itm
    } else {
        Moneyness::Otm
    })
}

/// SmartContract: settle at maturity using the polled price of the underlying.
pub fn option_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    prices: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    // Stateless units of this kind (eg/ rebuilt by replay) have no lifecycle to run
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let state = option_state(view, symbol)?;

    if state.settled || timestamp < state.maturity {
        return Ok(PendingTransaction::empty());
    }

    let Some(settlement_price) = prices.get(&state.underlying) else {
        return Ok(PendingTransaction::empty());
    };

    compute_option_settlement(view, symbol, *settlement_price, false)
}

fn option_state(view: &dyn LedgerView, symbol: &UnitSymbol) -> Result<OptionState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::Option(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::BilateralOption,
        }),
    }
}
