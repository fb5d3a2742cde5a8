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
        state::{ForwardState, UnitState},
        transfer::TransferRule,
    },
    wallet::WalletId,
};

/// Create a bilateral forward contract unit.
///
/// An agreement to exchange the underlying for a predetermined price at the delivery
/// date. The long party buys, the short party sells; holdings are restricted to this
/// pair by the bilateral transfer rule.
pub fn create_forward_unit<Symbol, Name>(
    symbol: Symbol,
    name: Name,
    underlying: UnitSymbol,
    forward_price: Decimal,
    delivery_date: DateTime<Utc>,
    quantity_per_contract: Decimal,
    currency: UnitSymbol,
    long_wallet: WalletId,
    short_wallet: WalletId,
) -> Result<Unit, LedgerError>
where
    Symbol: Into<UnitSymbol>,
    Name: Into<SmolStr>,
{
    if forward_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "forward_price must be positive, got {forward_price}"
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
        UnitKind::BilateralForward,
        Some(Decimal::from(-10_000)),
        Some(Decimal::from(10_000)),
        Some(CONTRACT_DECIMAL_PLACES),
    )
    .with_transfer_rule(TransferRule::Bilateral)
    .with_state(UnitState::Forward(ForwardState {
        underlying,
        forward_price,
        delivery_date,
        quantity_per_contract,
        currency,
        long_wallet,
        short_wallet,
        novation_from: None,
        settled: false,
    })))
}

/// Compute physical delivery settlement for a bilateral forward.
///
/// Settlement is unconditional once the delivery date is reached: the long pays
/// `position * quantity * forward_price` cash, the short delivers the underlying, and
/// the position closes back to the short.
pub fn compute_forward_settlement(
    view: &dyn LedgerView,
    forward_symbol: &UnitSymbol,
    force_settlement: bool,
) -> Result<PendingTransaction, LedgerError> {
    let state = forward_state(view, forward_symbol)?;

    if state.settled {
        return Ok(PendingTransaction::empty());
    }
    if view.current_time() < state.delivery_date && !force_settlement {
        return Ok(PendingTransaction::empty());
    }

    let long_position = view.get_balance(&state.long_wallet, forward_symbol)?;
    if long_position <= Decimal::ZERO {
        return Ok(PendingTransaction::empty());
    }

    let total_underlying = long_position * state.quantity_per_contract;
    let total_cash = total_underlying * state.forward_price;

    let moves = vec![
        Move::new(
            state.long_wallet.clone(),
            state.short_wallet.clone(),
            state.currency.clone(),
            total_cash,
            format!("settle_{forward_symbol}_cash"),
        )?,
        Move::new(
            state.short_wallet.clone(),
            state.long_wallet.clone(),
            state.underlying.clone(),
            total_underlying,
            format!("settle_{forward_symbol}_delivery"),
        )?,
        Move::new(
            state.long_wallet.clone(),
            state.short_wallet.clone(),
            forward_symbol.clone(),
            long_position,
            format!("close_{forward_symbol}"),
        )?,
    ];

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        forward_symbol.clone(),
        UnitState::Forward(ForwardState {
            settled: true,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// Compute early termination of a forward before its delivery date.
pub fn compute_early_termination(
    view: &dyn LedgerView,
    forward_symbol: &UnitSymbol,
) -> Result<PendingTransaction, LedgerError> {
    compute_forward_settlement(view, forward_symbol, true)
}

/// Mark-to-market value of one contract to the long party at the provided spot.
pub fn get_forward_value(
    view: &dyn LedgerView,
    forward_symbol: &UnitSymbol,
    spot_price: Decimal,
) -> Result<Decimal, LedgerError> {
    let state = forward_state(view, forward_symbol)?;
    Ok((spot_price - state.forward_price) * state.quantity_per_contract)
}

/// Secondary market trade (novation/assignment) of a forward position.
///
/// `price` is the per-contract assignment value: positive means the buyer pays the
/// seller, negative the reverse. Both parties must belong to the contract's bilateral
/// set (long, short, or the recorded novation source).
pub fn transact(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    seller: &WalletId,
    buyer: &WalletId,
    quantity: Decimal,
    price: Decimal,
) -> Result<PendingTransaction, LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if seller == buyer {
        return Err(LedgerError::InvalidContractOperation(format!(
            "seller and buyer must be different, got {seller}"
        )));
    }

    let state = forward_state(view, symbol)?;
    if state.settled {
        return Err(LedgerError::InvalidContractOperation(format!(
            "forward contract {symbol} is already settled"
        )));
    }

    let authorized = |wallet: &WalletId| {
        wallet == &state.long_wallet
            || wallet == &state.short_wallet
            || state.novation_from.as_ref() == Some(wallet)
    };
    if !authorized(seller) {
        return Err(LedgerError::TransferRuleViolation(format!(
            "bilateral {symbol}: seller {seller} not authorized"
        )));
    }
    if !authorized(buyer) {
        return Err(LedgerError::TransferRuleViolation(format!(
            "bilateral {symbol}: buyer {buyer} not authorized"
        )));
    }

    let mut moves = vec![Move::new(
        seller.clone(),
        buyer.clone(),
        symbol.clone(),
        quantity,
        format!("forward_trade_{symbol}_contract"),
    )?];

    let total_value = quantity * price.abs();
    if !is_dust(total_value) {
        let (payer, receiver) = if price > Decimal::ZERO {
            (buyer, seller)
        } else {
            (seller, buyer)
        };
        moves.push(Move::new(
            payer.clone(),
            receiver.clone(),
            state.currency.clone(),
            total_value,
            format!("forward_trade_{symbol}_value"),
        )?);
    }

    Ok(PendingTransaction::new(moves, BTreeMap::new()))
}

/// SmartContract: settle automatically once the delivery date is reached.
pub fn forward_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let state = forward_state(view, symbol)?;

    if state.settled || timestamp < state.delivery_date {
        return Ok(PendingTransaction::empty());
    }

    compute_forward_settlement(view, symbol, false)
}

fn forward_state(view: &dyn LedgerView, symbol: &UnitSymbol) -> Result<ForwardState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::Forward(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::BilateralForward,
        }),
    }
}
