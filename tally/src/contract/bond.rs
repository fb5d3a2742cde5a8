use crate::{
    error::LedgerError,
    ledger::view::LedgerView,
    pricing::PriceMap,
    transaction::{Move, PendingTransaction},
};
use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tally_instrument::{
    is_dust,
    unit::{
        Unit, UnitSymbol,
        kind::UnitKind,
        state::{BondState, Coupon, UnitState},
    },
    wallet::WalletId,
};

const DAYS_PER_YEAR: Decimal = dec!(365);

/// Create a fixed-coupon bond unit.
pub fn create_bond_unit<Symbol, Name>(
    symbol: Symbol,
    name: Name,
    issuer: WalletId,
    currency: UnitSymbol,
    face_value: Decimal,
    coupon_rate: Decimal,
    coupon_schedule: Vec<Coupon>,
    maturity: DateTime<Utc>,
) -> Result<Unit, LedgerError>
where
    Symbol: Into<UnitSymbol>,
    Name: Into<SmolStr>,
{
    if face_value <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "face_value must be positive, got {face_value}"
        )));
    }
    if coupon_rate < Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "coupon_rate must be non-negative, got {coupon_rate}"
        )));
    }

    let mut coupon_schedule = coupon_schedule;
    coupon_schedule.sort_by_key(|coupon| coupon.payment_date);

    Ok(Unit::new(
        symbol,
        name,
        UnitKind::Bond,
        Some(Decimal::ZERO),
        None,
        Some(2),
    )
    .with_state(UnitState::Bond(BondState {
        issuer,
        currency,
        face_value,
        coupon_rate,
        coupon_schedule,
        next_coupon_index: 0,
        maturity,
        redeemed: false,
    })))
}

/// Generate a regular coupon schedule: `payments_per_year` equal coupons of
/// `face_value * coupon_rate / payments_per_year`, from `first_payment_date` up to and
/// including `maturity`.
pub fn generate_coupon_schedule(
    first_payment_date: DateTime<Utc>,
    maturity: DateTime<Utc>,
    payments_per_year: u32,
    coupon_rate: Decimal,
    face_value: Decimal,
) -> Vec<Coupon> {
    if payments_per_year == 0 || payments_per_year > 12 {
        return Vec::new();
    }

    let amount_per_unit = face_value * coupon_rate / Decimal::from(payments_per_year);
    let step = Months::new(12 / payments_per_year);

    let mut schedule = Vec::new();
    let mut payment_date = first_payment_date;
    while payment_date <= maturity {
        schedule.push(Coupon {
            payment_date,
            amount_per_unit,
        });
        payment_date = payment_date + step;
    }
    schedule
}

/// ACT/365 year fraction between two instants.
pub fn year_fraction(start: DateTime<Utc>, end: DateTime<Utc>) -> Decimal {
    Decimal::from((end - start).num_seconds()) / (DAYS_PER_YEAR * dec!(86400))
}

/// Interest accrued per unit since the last paid coupon, as of `as_of`.
///
/// Zero before the first coupon has been paid.
pub fn compute_accrued_interest(
    view: &dyn LedgerView,
    bond_symbol: &UnitSymbol,
    as_of: DateTime<Utc>,
) -> Result<Decimal, LedgerError> {
    let state = bond_state(view, bond_symbol)?;

    let Some(previous_index) = state.next_coupon_index.checked_sub(1) else {
        return Ok(Decimal::ZERO);
    };
    let Some(previous) = state.coupon_schedule.get(previous_index) else {
        return Ok(Decimal::ZERO);
    };
    if as_of <= previous.payment_date {
        return Ok(Decimal::ZERO);
    }

    Ok(state.face_value * state.coupon_rate * year_fraction(previous.payment_date, as_of))
}

/// Pay the next scheduled coupon to all holders if due.
///
/// Holders are the positive positions excluding the issuer, paid in sorted wallet order.
pub fn compute_coupon_payment(
    view: &dyn LedgerView,
    bond_symbol: &UnitSymbol,
    current_time: DateTime<Utc>,
) -> Result<PendingTransaction, LedgerError> {
    let state = bond_state(view, bond_symbol)?;

    let Some(coupon) = state.coupon_schedule.get(state.next_coupon_index) else {
        return Ok(PendingTransaction::empty());
    };
    if current_time < coupon.payment_date {
        return Ok(PendingTransaction::empty());
    }

    let mut moves = Vec::new();
    for (holder, units) in view.get_positions(bond_symbol) {
        if holder == state.issuer || units <= Decimal::ZERO {
            continue;
        }
        let payout = units * coupon.amount_per_unit;
        if is_dust(payout) {
            continue;
        }
        moves.push(Move::new(
            state.issuer.clone(),
            holder,
            state.currency.clone(),
            payout,
            format!("coupon_{bond_symbol}_{}", state.next_coupon_index),
        )?);
    }

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        bond_symbol.clone(),
        UnitState::Bond(BondState {
            next_coupon_index: state.next_coupon_index + 1,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// Redeem the bond at maturity: the issuer repays face value per unit and the units are
/// retired back to the issuer.
pub fn compute_redemption(
    view: &dyn LedgerView,
    bond_symbol: &UnitSymbol,
    current_time: DateTime<Utc>,
) -> Result<PendingTransaction, LedgerError> {
    let state = bond_state(view, bond_symbol)?;

    if state.redeemed || current_time < state.maturity {
        return Ok(PendingTransaction::empty());
    }

    let mut moves = Vec::new();
    for (holder, units) in view.get_positions(bond_symbol) {
        if holder == state.issuer || units <= Decimal::ZERO {
            continue;
        }
        moves.push(Move::new(
            state.issuer.clone(),
            holder.clone(),
            state.currency.clone(),
            units * state.face_value,
            format!("redeem_{bond_symbol}_cash"),
        )?);
        moves.push(Move::new(
            holder,
            state.issuer.clone(),
            bond_symbol.clone(),
            units,
            format!("redeem_{bond_symbol}_retire"),
        )?);
    }

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        bond_symbol.clone(),
        UnitState::Bond(BondState {
            redeemed: true,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// SmartContract: pay coupons as they fall due, then redeem at maturity.
pub fn bond_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let state = bond_state(view, symbol)?;
    if state.redeemed {
        return Ok(PendingTransaction::empty());
    }

    // Outstanding coupons settle before redemption; the engine's cascading passes pick
    // up the next stage within the same step
    let coupons = compute_coupon_payment(view, symbol, timestamp)?;
    if !coupons.is_empty() {
        return Ok(coupons);
    }

    if timestamp >= state.maturity {
        return compute_redemption(view, symbol, timestamp);
    }

    Ok(PendingTransaction::empty())
}

fn bond_state(view: &dyn LedgerView, symbol: &UnitSymbol) -> Result<BondState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::Bond(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::Bond,
        }),
    }
}
